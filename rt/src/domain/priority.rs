//! Priority levels for request scheduling

use serde::{Deserialize, Serialize};

/// Dispatch priority of a queued request
///
/// Higher values are serviced first among requests that are waiting at the
/// same time. The numeric values are part of the public contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Priority {
    Background = 0,
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
}

impl Priority {
    /// All levels, highest first
    pub const ALL: [Priority; 4] = [Priority::High, Priority::Medium, Priority::Low, Priority::Background];

    /// Numeric level (HIGH=3 .. BACKGROUND=0)
    pub const fn value(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Background),
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            _ => Err(format!("Unknown priority level: {}", value)),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Background => write!(f, "background"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "background" | "bg" => Ok(Self::Background),
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(|n| Self::try_from(n).ok())
                .ok_or_else(|| format!("Unknown priority: {}", s)),
        }
    }
}
