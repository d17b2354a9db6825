//! Coarse geographic regions.
//!
//! # Responsibilities
//! - Define the region tag that selects provider lists
//! - Map ISO 3166-1 alpha-2 country codes onto regions
//! - Hold the session's active region (`RegionRouter`)

pub mod router;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use router::RegionRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Eu,
    Us,
    Asia,
    Mena,
    Africa,
    Latam,
    Global,
}

const EU: &[&str] = &[
    "AT", "BE", "BG", "CH", "CY", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GB", "GR", "HR", "HU",
    "IE", "IS", "IT", "LI", "LT", "LU", "LV", "MT", "NL", "NO", "PL", "PT", "RO", "SE", "SI", "SK",
    "UA", "RS", "BA", "ME", "MK", "AL", "MD",
];
const US: &[&str] = &["US", "CA", "PR"];
const ASIA: &[&str] = &[
    "CN", "JP", "KR", "IN", "ID", "TH", "VN", "MY", "SG", "PH", "TW", "HK", "PK", "BD", "LK", "NP",
    "KZ", "UZ", "MN", "AU", "NZ",
];
const MENA: &[&str] = &[
    "AE", "SA", "QA", "KW", "BH", "OM", "JO", "LB", "IL", "IQ", "IR", "TR", "EG", "MA", "DZ", "TN",
    "LY", "YE", "SY",
];
const AFRICA: &[&str] = &[
    "ZA", "NG", "KE", "GH", "ET", "TZ", "UG", "SN", "CI", "CM", "AO", "ZW", "ZM", "MZ", "RW", "BW",
    "NA",
];
const LATAM: &[&str] = &[
    "MX", "BR", "AR", "CL", "CO", "PE", "VE", "EC", "BO", "PY", "UY", "CR", "PA", "GT", "DO", "CU",
];

impl Region {
    pub const ALL: [Region; 7] = [
        Region::Eu,
        Region::Us,
        Region::Asia,
        Region::Mena,
        Region::Africa,
        Region::Latam,
        Region::Global,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Eu => "EU",
            Region::Us => "US",
            Region::Asia => "ASIA",
            Region::Mena => "MENA",
            Region::Africa => "AFRICA",
            Region::Latam => "LATAM",
            Region::Global => "GLOBAL",
        }
    }

    /// Region for a country code; unknown codes map to `Global`.
    pub fn from_country_code(code: &str) -> Region {
        let code = code.trim().to_ascii_uppercase();
        let code = code.as_str();
        let table: [(&[&str], Region); 6] = [
            (EU, Region::Eu),
            (US, Region::Us),
            (ASIA, Region::Asia),
            (MENA, Region::Mena),
            (AFRICA, Region::Africa),
            (LATAM, Region::Latam),
        ];
        table
            .iter()
            .find(|(codes, _)| codes.contains(&code))
            .map(|(_, region)| *region)
            .unwrap_or(Region::Global)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown region '{}'", s))
    }
}
