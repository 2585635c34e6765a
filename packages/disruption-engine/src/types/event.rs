//! Event types - the structured disruption records produced by extraction.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::geo::{canonical_country, normalize_admin};
use crate::types::validation::MatchRef;

/// Top level of the disruption taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventCategory {
    /// Natural hazards, accidents, infrastructure failure
    Physical,
    /// Labour, unrest, conflict, trade policy
    SocioPolitical,
    /// Unmapped or failed
    Unknown,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::SocioPolitical => "socio-political",
            Self::Unknown => "unknown",
        }
    }
}

/// Canonical disruption subtype.
///
/// Serialized as `category/subtype` (e.g. `physical/port_disruption`).
/// Parsing also accepts the bare subtype and hyphenated spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventType {
    Flood,
    Drought,
    CycloneHurricane,
    ExtremeHeat,
    Landslide,
    Earthquake,
    Fire,
    MineCollapse,
    MineAccident,
    PowerOutage,
    PortDisruption,
    ShippingAccident,
    RoadClosure,
    RailDisruption,
    LabourStrike,
    Protest,
    Riot,
    ArmedConflict,
    MaritimeSecurity,
    TradeEmbargo,
    Tariffs,
    ExportRestriction,
    Unknown,
}

impl EventType {
    /// Every type a model may emit, `Unknown` last.
    pub const ALL: &'static [EventType] = &[
        Self::Flood,
        Self::Drought,
        Self::CycloneHurricane,
        Self::ExtremeHeat,
        Self::Landslide,
        Self::Earthquake,
        Self::Fire,
        Self::MineCollapse,
        Self::MineAccident,
        Self::PowerOutage,
        Self::PortDisruption,
        Self::ShippingAccident,
        Self::RoadClosure,
        Self::RailDisruption,
        Self::LabourStrike,
        Self::Protest,
        Self::Riot,
        Self::ArmedConflict,
        Self::MaritimeSecurity,
        Self::TradeEmbargo,
        Self::Tariffs,
        Self::ExportRestriction,
        Self::Unknown,
    ];

    pub fn category(&self) -> EventCategory {
        match self {
            Self::Flood
            | Self::Drought
            | Self::CycloneHurricane
            | Self::ExtremeHeat
            | Self::Landslide
            | Self::Earthquake
            | Self::Fire
            | Self::MineCollapse
            | Self::MineAccident
            | Self::PowerOutage
            | Self::PortDisruption
            | Self::ShippingAccident
            | Self::RoadClosure
            | Self::RailDisruption => EventCategory::Physical,
            Self::LabourStrike
            | Self::Protest
            | Self::Riot
            | Self::ArmedConflict
            | Self::MaritimeSecurity
            | Self::TradeEmbargo
            | Self::Tariffs
            | Self::ExportRestriction => EventCategory::SocioPolitical,
            Self::Unknown => EventCategory::Unknown,
        }
    }

    /// Subtype name without the category prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flood => "flood",
            Self::Drought => "drought",
            Self::CycloneHurricane => "cyclone_hurricane",
            Self::ExtremeHeat => "extreme_heat",
            Self::Landslide => "landslide",
            Self::Earthquake => "earthquake",
            Self::Fire => "fire",
            Self::MineCollapse => "mine_collapse",
            Self::MineAccident => "mine_accident",
            Self::PowerOutage => "power_outage",
            Self::PortDisruption => "port_disruption",
            Self::ShippingAccident => "shipping_accident",
            Self::RoadClosure => "road_closure",
            Self::RailDisruption => "rail_disruption",
            Self::LabourStrike => "labour_strike",
            Self::Protest => "protest",
            Self::Riot => "riot",
            Self::ArmedConflict => "armed_conflict",
            Self::MaritimeSecurity => "maritime_security",
            Self::TradeEmbargo => "trade_embargo",
            Self::Tariffs => "tariffs",
            Self::ExportRestriction => "export_restriction",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Whether two canonical types may be linked at all.
    ///
    /// Exact match only; `Unknown` is compatible with nothing, itself included.
    pub fn compatible_with(&self, other: &EventType) -> bool {
        !self.is_unknown() && self == other
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category().as_str(), self.as_str())
    }
}

/// Error for strings outside the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a canonical event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase().replace(['-', ' '], "_");
        let subtype = lowered.rsplit('/').next().unwrap_or(&lowered);

        let found = match subtype {
            "cyclone" | "hurricane" | "typhoon" => Some(Self::CycloneHurricane),
            "labor_strike" | "strike" => Some(Self::LabourStrike),
            "wildfire" => Some(Self::Fire),
            other => Self::ALL.iter().copied().find(|t| t.as_str() == other),
        };
        found.ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

impl TryFrom<String> for EventType {
    type Error = UnknownEventType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.to_string()
    }
}

/// Where an event happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// ISO3 country code (see [`crate::geo::canonical_country`])
    pub country: String,

    /// First-level administrative region
    #[serde(default)]
    pub admin1: Option<String>,

    #[serde(default)]
    pub lat: Option<f64>,

    #[serde(default)]
    pub lon: Option<f64>,
}

impl Location {
    /// Country-only location; the country is canonicalized.
    pub fn country(country: &str) -> Self {
        Self {
            country: canonical_country(country),
            admin1: None,
            lat: None,
            lon: None,
        }
    }

    pub fn with_admin1(mut self, admin1: impl Into<String>) -> Self {
        self.admin1 = Some(admin1.into());
        self
    }

    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    /// Both coordinates, if present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }

    /// Normalized admin1 for comparisons and id derivation.
    pub fn admin1_key(&self) -> Option<String> {
        self.admin1
            .as_deref()
            .map(normalize_admin)
            .filter(|a| !a.is_empty())
    }

    /// Key used for id derivation and deduplication.
    ///
    /// Coordinates are deliberately excluded: models report them with
    /// varying precision for the same place.
    pub fn identity_key(&self) -> String {
        match self.admin1_key() {
            Some(admin) => format!("{}|{}", self.country, admin),
            None => self.country.clone(),
        }
    }
}

/// Outcome of extracting an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// All required fields present
    Ok,
    /// Stored with fallbacks for missing fields, confidence penalized
    Partial,
    /// Retries exhausted; placeholder record explaining why
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

/// A supply-chain disruption event extracted from exactly one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub source_article_id: String,
    pub event_type: EventType,
    pub location: Location,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub actors: Vec<String>,
    pub description: String,
    pub confidence: f64,
    pub extraction_status: ExtractionStatus,

    /// Validation back references, one per dataset. Not part of content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<MatchRef>,
}

impl Event {
    /// Build an event, deriving its id from the identity fields.
    pub fn new(
        source_article_id: impl Into<String>,
        event_type: EventType,
        location: Location,
        start_date: NaiveDate,
    ) -> Self {
        let source_article_id = source_article_id.into();
        let event_id = derive_event_id(&source_article_id, event_type, &location, start_date);

        Self {
            event_id,
            source_article_id,
            event_type,
            location,
            start_date,
            end_date: None,
            actors: Vec::new(),
            description: String::new(),
            confidence: 0.0,
            extraction_status: ExtractionStatus::Ok,
            matches: Vec::new(),
        }
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_actors(mut self, actors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.actors = actors.into_iter().map(|a| a.into()).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_status(mut self, status: ExtractionStatus) -> Self {
        self.extraction_status = status;
        self
    }

    /// Last day covered by the event.
    pub fn last_date(&self) -> NaiveDate {
        self.end_date.unwrap_or(self.start_date).max(self.start_date)
    }

    /// SHA-256 over every content field except validation back references.
    ///
    /// Two upserts under the same id conflict exactly when these differ.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |value: &str| {
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        };

        field(&self.event_id);
        field(&self.source_article_id);
        field(&self.event_type.to_string());
        field(&self.location.country);
        field(self.location.admin1.as_deref().unwrap_or_default());
        field(&self.location.lat.map(|v| format!("{:.6}", v)).unwrap_or_default());
        field(&self.location.lon.map(|v| format!("{:.6}", v)).unwrap_or_default());
        field(&self.start_date.to_string());
        field(&self.end_date.map(|d| d.to_string()).unwrap_or_default());
        field(&self.actors.join("\u{1f}"));
        field(&self.description);
        field(&format!("{:.6}", self.confidence));
        field(self.extraction_status.as_str());

        format!("{:x}", hasher.finalize())
    }
}

/// Deterministic event id from `(article, type, location, start date)`.
pub fn derive_event_id(
    source_article_id: &str,
    event_type: EventType,
    location: &Location,
    start_date: NaiveDate,
) -> String {
    let location_key = location.identity_key();
    let date_key = start_date.to_string();

    let mut hasher = Sha256::new();
    for part in [
        source_article_id,
        event_type.as_str(),
        location_key.as_str(),
        date_key.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("evt_{}", &digest[..32])
}
