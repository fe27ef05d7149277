//! Severity table
//!
//! Fixed, ordered mapping from severity names to numeric ranks.
//! Lower rank = higher urgency.

use crate::error::{SinkError, SinkResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named severity, highest urgency first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Emerg,
    Alert,
    Crit,
    Error,
    #[default]
    Warning,
    Notice,
    Info,
    Debug,
}

impl Severity {
    /// All severities ordered by rank
    pub const ALL: [Severity; 8] = [
        Severity::Emerg,
        Severity::Alert,
        Severity::Crit,
        Severity::Error,
        Severity::Warning,
        Severity::Notice,
        Severity::Info,
        Severity::Debug,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Emerg => "emerg",
            Self::Alert => "alert",
            Self::Crit => "crit",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    pub fn from_rank(rank: u8) -> SinkResult<Self> {
        Self::ALL
            .get(rank as usize)
            .copied()
            .ok_or_else(|| SinkError::InvalidLevel(format!("no severity with rank {}", rank)))
    }

    /// Whether a record at this severity passes a `minimum` threshold
    pub fn passes(self, minimum: Severity) -> bool {
        self.rank() <= minimum.rank()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|severity| severity.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SinkError::InvalidLevel(format!("unknown severity '{}'", s)))
    }
}

/// Level as handed to the write path: a rank, a name, or an already resolved severity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelSpec {
    Rank(u8),
    Name(String),
    Severity(Severity),
}

impl LevelSpec {
    pub fn resolve(&self) -> SinkResult<Severity> {
        match self {
            Self::Rank(rank) => Severity::from_rank(*rank),
            Self::Name(name) => name.parse(),
            Self::Severity(severity) => Ok(*severity),
        }
    }
}

impl From<u8> for LevelSpec {
    fn from(rank: u8) -> Self {
        Self::Rank(rank)
    }
}

impl From<&str> for LevelSpec {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for LevelSpec {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Severity> for LevelSpec {
    fn from(severity: Severity) -> Self {
        Self::Severity(severity)
    }
}

impl FromStr for LevelSpec {
    type Err = std::convert::Infallible;

    /// Numeric input is a rank, anything else a name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<u8>() {
            Ok(rank) => Self::Rank(rank),
            Err(_) => Self::Name(s.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks_match_table() {
        let expected = [
            ("emerg", 0),
            ("alert", 1),
            ("crit", 2),
            ("error", 3),
            ("warning", 4),
            ("notice", 5),
            ("info", 6),
            ("debug", 7),
        ];

        for (name, rank) in expected {
            let severity: Severity = name.parse().unwrap();
            assert_eq!(severity.rank(), rank);
            assert_eq!(Severity::from_rank(rank).unwrap().name(), name);
        }
    }

    #[test]
    fn test_invalid_rank() {
        let err = Severity::from_rank(8).unwrap_err();
        assert!(matches!(err, SinkError::InvalidLevel(_)));
    }

    #[test]
    fn test_invalid_name() {
        assert!("verbose".parse::<Severity>().is_err());
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Warning);
    }

    #[test]
    fn test_passes_threshold() {
        assert!(Severity::Error.passes(Severity::Warning));
        assert!(Severity::Warning.passes(Severity::Warning));
        assert!(!Severity::Debug.passes(Severity::Warning));
    }

    #[test]
    fn test_level_spec_parsing() {
        assert_eq!("3".parse::<LevelSpec>().unwrap(), LevelSpec::Rank(3));
        assert_eq!(
            "error".parse::<LevelSpec>().unwrap(),
            LevelSpec::Name("error".to_string())
        );
        assert_eq!(LevelSpec::from(3u8).resolve().unwrap(), Severity::Error);
        assert!(LevelSpec::from(42u8).resolve().is_err());
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&Severity::Crit).unwrap();
        assert_eq!(json, "\"crit\"");
    }
}
