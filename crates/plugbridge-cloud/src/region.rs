//! Vendor regions and their API hosts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// eWeLink data-center region. A session is pinned to exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Eu,
    Us,
    As,
    Cn,
}

impl Region {
    /// Region code as used by the vendor
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Eu => "eu",
            Region::Us => "us",
            Region::As => "as",
            Region::Cn => "cn",
        }
    }

    /// Public API host for this region
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Region::Eu => "https://eu-apia.coolkit.cc",
            Region::Us => "https://us-apia.coolkit.cc",
            Region::As => "https://as-apia.coolkit.cc",
            Region::Cn => "https://cn-apia.coolkit.cn",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown region code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown region: {0} (expected one of eu, us, as, cn)")]
pub struct UnknownRegion(pub String);

impl FromStr for Region {
    type Err = UnknownRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eu" => Ok(Region::Eu),
            "us" => Ok(Region::Us),
            "as" => Ok(Region::As),
            "cn" => Ok(Region::Cn),
            other => Err(UnknownRegion(other.to_string())),
        }
    }
}
