//! Shared domain types for discovery, export, and apply

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Project visibility on the source forge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Internal,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Internal => "internal",
            Self::Public => "public",
        }
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Private
    }
}

/// A discovered boolean fact that may not have been determinable.
///
/// Serialized as `true`, `false`, or the literal string `"unknown"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detection {
    Yes,
    No,
    Unknown,
}

impl Detection {
    pub fn is_yes(&self) -> bool {
        matches!(self, Self::Yes)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl Default for Detection {
    fn default() -> Self {
        Self::Unknown
    }
}

impl From<bool> for Detection {
    fn from(v: bool) -> Self {
        if v {
            Self::Yes
        } else {
            Self::No
        }
    }
}

impl Serialize for Detection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Yes => serializer.serialize_bool(true),
            Self::No => serializer.serialize_bool(false),
            Self::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for Detection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Bool(true) => Ok(Self::Yes),
            serde_json::Value::Bool(false) => Ok(Self::No),
            serde_json::Value::String(s) if s == "unknown" => Ok(Self::Unknown),
            other => Err(de::Error::custom(format!(
                "expected bool or \"unknown\", got {other}"
            ))),
        }
    }
}

/// A count that may be exact, truncated by a counting ceiling, or unknown.
///
/// Serialized as an integer, `">N"`, or `"unknown"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Count {
    Exact(u64),
    AtLeast(u64),
    Unknown,
}

impl Count {
    /// Exact value when known precisely.
    pub fn exact(&self) -> Option<u64> {
        match self {
            Self::Exact(n) => Some(*n),
            _ => None,
        }
    }

    /// Lower bound usable for scoring; unknown counts as zero.
    pub fn floor(&self) -> u64 {
        match self {
            Self::Exact(n) | Self::AtLeast(n) => *n,
            Self::Unknown => 0,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::AtLeast(_))
    }
}

impl Default for Count {
    fn default() -> Self {
        Self::Unknown
    }
}

impl Serialize for Count {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Exact(n) => serializer.serialize_u64(*n),
            Self::AtLeast(n) => serializer.serialize_str(&format!(">{n}")),
            Self::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for Count {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(Self::Exact)
                .ok_or_else(|| de::Error::custom("count must be a non-negative integer")),
            serde_json::Value::String(s) if s == "unknown" => Ok(Self::Unknown),
            serde_json::Value::String(s) => {
                if let Some(rest) = s.strip_prefix('>') {
                    rest.parse()
                        .map(Self::AtLeast)
                        .map_err(|_| de::Error::custom(format!("invalid count string: {s}")))
                } else {
                    Err(de::Error::custom(format!("invalid count string: {s}")))
                }
            }
            other => Err(de::Error::custom(format!(
                "expected integer or count string, got {other}"
            ))),
        }
    }
}

/// Merge request counts by state. The whole record may be unknown
/// when the forge refused the listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MrCounts {
    Known {
        open: Count,
        merged: Count,
        closed: Count,
        total: Count,
    },
    Unknown(UnknownToken),
}

impl MrCounts {
    pub fn unknown() -> Self {
        Self::Unknown(UnknownToken)
    }

    pub fn total_floor(&self) -> u64 {
        match self {
            Self::Known { total, .. } => total.floor(),
            Self::Unknown(_) => 0,
        }
    }

    pub fn open_floor(&self) -> u64 {
        match self {
            Self::Known { open, .. } => open.floor(),
            Self::Unknown(_) => 0,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Known { total, .. } if total.is_truncated())
    }
}

impl Default for MrCounts {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Issue counts by state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IssueCounts {
    Known {
        open: Count,
        closed: Count,
        total: Count,
    },
    Unknown(UnknownToken),
}

impl IssueCounts {
    pub fn unknown() -> Self {
        Self::Unknown(UnknownToken)
    }

    pub fn total_floor(&self) -> u64 {
        match self {
            Self::Known { total, .. } => total.floor(),
            Self::Unknown(_) => 0,
        }
    }

    pub fn open_floor(&self) -> u64 {
        match self {
            Self::Known { open, .. } => open.floor(),
            Self::Unknown(_) => 0,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Known { total, .. } if total.is_truncated())
    }
}

impl Default for IssueCounts {
    fn default() -> Self {
        Self::unknown()
    }
}

/// The literal `"unknown"` token used by count unions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownToken;

impl Serialize for UnknownToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("unknown")
    }
}

impl<'de> Deserialize<'de> for UnknownToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "unknown" {
            Ok(Self)
        } else {
            Err(de::Error::custom("expected \"unknown\""))
        }
    }
}

/// A per-step error attached to a project during discovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub step: String,
    pub status: Option<u16>,
    pub message: String,
}

impl StepError {
    pub fn new(step: impl Into<String>, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            step: step.into(),
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_round_trips() {
        for (value, json) in [
            (Detection::Yes, "true"),
            (Detection::No, "false"),
            (Detection::Unknown, "\"unknown\""),
        ] {
            assert_eq!(serde_json::to_string(&value).unwrap(), json);
            let back: Detection = serde_json::from_str(json).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn count_serializes_union_forms() {
        assert_eq!(serde_json::to_string(&Count::Exact(42)).unwrap(), "42");
        assert_eq!(
            serde_json::to_string(&Count::AtLeast(1000)).unwrap(),
            "\">1000\""
        );
        assert_eq!(
            serde_json::to_string(&Count::Unknown).unwrap(),
            "\"unknown\""
        );
        let back: Count = serde_json::from_str("\">1000\"").unwrap();
        assert_eq!(back, Count::AtLeast(1000));
    }

    #[test]
    fn mr_counts_unknown_is_the_literal_token() {
        let json = serde_json::to_string(&MrCounts::unknown()).unwrap();
        assert_eq!(json, "\"unknown\"");
        let known = MrCounts::Known {
            open: Count::Exact(1),
            merged: Count::Exact(2),
            closed: Count::Exact(3),
            total: Count::Exact(6),
        };
        let value = serde_json::to_value(&known).unwrap();
        assert_eq!(value["total"], 6);
    }

    #[test]
    fn count_floor_treats_unknown_as_zero() {
        assert_eq!(Count::Unknown.floor(), 0);
        assert_eq!(Count::AtLeast(1000).floor(), 1000);
        assert!(Count::AtLeast(5).is_truncated());
    }
}
