//! Severity levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A severity level in `1..=3`.
///
/// Out-of-range input is clamped rather than rejected, so every value of
/// this type indexes a real word table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const MIN: Self = Self(1);
    pub const MAX: Self = Self(3);
    pub const ALL: [Self; 3] = [Self(1), Self(2), Self(3)];

    /// Clamps any integer into the valid range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn clamp(level: i64) -> Self {
        if level < 1 {
            Self::MIN
        } else if level > 3 {
            Self::MAX
        } else {
            Self(level as u8)
        }
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Human-readable level name used in replies.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self.0 {
            1 => "мягкий",
            2 => "средний",
            _ => "жесткий",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self(2)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.0
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=3).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!("severity must be 1, 2 or 3, got {value}"))
        }
    }
}

impl FromStr for Severity {
    type Err = ();

    /// Parses a numeric level (clamped) or a level name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i64>() {
            return Ok(Self::clamp(n));
        }

        // Digit strings too long for i64 still clamp by sign.
        let (negative, digits) = s
            .strip_prefix('-')
            .map_or_else(|| (false, s.strip_prefix('+').unwrap_or(s)), |rest| (true, rest));
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(if negative { Self::MIN } else { Self::MAX });
        }

        match s.to_lowercase().as_str() {
            "мягкий" | "легкий" | "лёгкий" | "mild" => Ok(Self(1)),
            "средний" | "moderate" => Ok(Self(2)),
            "жесткий" | "жёсткий" | "severe" | "hard" => Ok(Self(3)),
            _ => Err(()),
        }
    }
}
