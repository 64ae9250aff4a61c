//! Falco event payload
//!
//! Outputs treat the payload as an opaque document: they serialize it and ship
//! it. The known Falco fields are typed for convenience, everything else is
//! kept in [`FalcoPayload::extra`] so that a decode/encode cycle loses nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Falco rule priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// No priority set
    #[default]
    Default,
    Debug,
    Informational,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Priority {
    /// Name as Falco writes it
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "",
            Self::Debug => "Debug",
            Self::Informational => "Informational",
            Self::Notice => "Notice",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Critical => "Critical",
            Self::Alert => "Alert",
            Self::Emergency => "Emergency",
        }
    }
}

impl FromStr for Priority {
    type Err = std::convert::Infallible;

    /// Case-insensitive; unknown names map to [`Priority::Default`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "emergency" => Self::Emergency,
            "alert" => Self::Alert,
            "critical" => Self::Critical,
            "error" => Self::Error,
            "warning" => Self::Warning,
            "notice" => Self::Notice,
            "informational" | "info" => Self::Informational,
            "debug" => Self::Debug,
            _ => Self::Default,
        })
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        // Infallible
        Ok(value.parse().unwrap_or_default())
    }
}

/// An event as emitted by Falco and received by sidekick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FalcoPayload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,

    #[serde(default)]
    pub output: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub rule: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub output_fields: serde_json::Map<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,

    /// Fields this type does not know about
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
