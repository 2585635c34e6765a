//! Geography canonicalization shared by extraction and adapters.
//!
//! External datasets encode countries as ISO3 codes, ISO2 codes, or English
//! names in varying spellings. Everything is folded to ISO3 before ids are
//! derived or records are compared.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Placeholder for a location the source could not pin to a country.
pub const UNKNOWN_COUNTRY: &str = "UNK";

/// (ISO3, ISO2, names) for countries that show up in supply-chain reporting.
const COUNTRIES: &[(&str, &str, &[&str])] = &[
    ("ARG", "AR", &["argentina"]),
    ("AUS", "AU", &["australia"]),
    ("BGD", "BD", &["bangladesh"]),
    ("BOL", "BO", &["bolivia", "plurinational state of bolivia"]),
    ("BRA", "BR", &["brazil", "brasil"]),
    ("CAN", "CA", &["canada"]),
    ("CHL", "CL", &["chile"]),
    ("CHN", "CN", &["china", "people's republic of china", "prc"]),
    ("COD", "CD", &["democratic republic of congo", "democratic republic of the congo", "dr congo", "drc", "congo-kinshasa"]),
    ("COG", "CG", &["republic of congo", "congo", "congo-brazzaville"]),
    ("COL", "CO", &["colombia"]),
    ("DEU", "DE", &["germany"]),
    ("EGY", "EG", &["egypt"]),
    ("ESP", "ES", &["spain"]),
    ("ETH", "ET", &["ethiopia"]),
    ("FRA", "FR", &["france"]),
    ("GBR", "GB", &["united kingdom", "uk", "great britain", "britain"]),
    ("GHA", "GH", &["ghana"]),
    ("GIN", "GN", &["guinea"]),
    ("IDN", "ID", &["indonesia"]),
    ("IND", "IN", &["india"]),
    ("IRN", "IR", &["iran", "islamic republic of iran"]),
    ("IRQ", "IQ", &["iraq"]),
    ("ISR", "IL", &["israel"]),
    ("JPN", "JP", &["japan"]),
    ("KAZ", "KZ", &["kazakhstan"]),
    ("KEN", "KE", &["kenya"]),
    ("KOR", "KR", &["south korea", "republic of korea", "korea"]),
    ("MAR", "MA", &["morocco"]),
    ("MDG", "MG", &["madagascar"]),
    ("MEX", "MX", &["mexico"]),
    ("MLI", "ML", &["mali"]),
    ("MMR", "MM", &["myanmar", "burma"]),
    ("MNG", "MN", &["mongolia"]),
    ("MOZ", "MZ", &["mozambique"]),
    ("MYS", "MY", &["malaysia"]),
    ("NAM", "NA", &["namibia"]),
    ("NER", "NE", &["niger"]),
    ("NGA", "NG", &["nigeria"]),
    ("NLD", "NL", &["netherlands", "the netherlands", "holland"]),
    ("NOR", "NO", &["norway"]),
    ("PAK", "PK", &["pakistan"]),
    ("PAN", "PA", &["panama"]),
    ("PER", "PE", &["peru"]),
    ("PHL", "PH", &["philippines", "the philippines"]),
    ("PNG", "PG", &["papua new guinea"]),
    ("POL", "PL", &["poland"]),
    ("RUS", "RU", &["russia", "russian federation"]),
    ("SAU", "SA", &["saudi arabia"]),
    ("SDN", "SD", &["sudan"]),
    ("SGP", "SG", &["singapore"]),
    ("SOM", "SO", &["somalia"]),
    ("SWE", "SE", &["sweden"]),
    ("THA", "TH", &["thailand"]),
    ("TUR", "TR", &["turkey", "turkiye", "türkiye"]),
    ("TWN", "TW", &["taiwan"]),
    ("TZA", "TZ", &["tanzania", "united republic of tanzania"]),
    ("UKR", "UA", &["ukraine"]),
    ("USA", "US", &["united states", "united states of america", "usa", "us", "america"]),
    ("VEN", "VE", &["venezuela"]),
    ("VNM", "VN", &["vietnam", "viet nam"]),
    ("YEM", "YE", &["yemen"]),
    ("ZAF", "ZA", &["south africa"]),
    ("ZMB", "ZM", &["zambia"]),
    ("ZWE", "ZW", &["zimbabwe"]),
];

static COUNTRY_INDEX: LazyLock<HashMap<String, &'static str>> = LazyLock::new(|| {
    let mut index = HashMap::new();
    for (iso3, iso2, names) in COUNTRIES {
        index.insert(iso3.to_lowercase(), *iso3);
        index.insert(iso2.to_lowercase(), *iso3);
        for name in *names {
            index.insert((*name).to_string(), *iso3);
        }
    }
    index
});

/// Fold a country encoding (ISO3, ISO2 or name) to its ISO3 code.
///
/// Names the table does not know are kept as an upper-cased, whitespace
/// normalized string so two datasets spelling them identically still agree.
pub fn canonical_country(raw: &str) -> String {
    let key = normalize_place(raw);
    if key.is_empty() || key == "unknown" || key == "unk" {
        return UNKNOWN_COUNTRY.to_string();
    }

    if let Some(iso3) = COUNTRY_INDEX.get(&key) {
        return (*iso3).to_string();
    }

    let without_article = key.strip_prefix("the ").unwrap_or(&key);
    COUNTRY_INDEX
        .get(without_article)
        .map(|iso3| (*iso3).to_string())
        .unwrap_or_else(|| key.to_uppercase())
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_place(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a first-level administrative region name for comparison.
///
/// Drops generic suffixes so "Katanga Province" and "Katanga" agree.
pub fn normalize_admin(raw: &str) -> String {
    const SUFFIXES: &[&str] = &[" province", " region", " state", " governorate", " district"];

    let mut name = normalize_place(raw);
    for suffix in SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_string();
            break;
        }
    }
    name
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Valid WGS84 coordinate pair.
pub fn valid_coordinates(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_encodings_fold_to_iso3() {
        assert_eq!(canonical_country("IDN"), "IDN");
        assert_eq!(canonical_country("id"), "IDN");
        assert_eq!(canonical_country("Indonesia"), "IDN");
        assert_eq!(canonical_country("  the Philippines "), "PHL");
        assert_eq!(canonical_country("Democratic Republic of the Congo"), "COD");
    }

    #[test]
    fn test_unknown_country_kept_verbatim() {
        assert_eq!(canonical_country("Country X"), "COUNTRY X");
        assert_eq!(canonical_country(""), UNKNOWN_COUNTRY);
    }

    #[test]
    fn test_admin_suffixes_dropped() {
        assert_eq!(normalize_admin("Katanga Province"), "katanga");
        assert_eq!(normalize_admin("katanga"), "katanga");
    }

    #[test]
    fn test_haversine() {
        // Jakarta to Surabaya is roughly 660 km
        let d = haversine_km(-6.2, 106.8, -7.25, 112.75);
        assert!((d - 665.0).abs() < 30.0, "got {}", d);
        assert!(haversine_km(1.0, 1.0, 1.0, 1.0) < 1e-9);
    }
}
