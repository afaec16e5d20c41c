//! Member retrieval strategies and their ordering.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One way of learning who is in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Full member enumeration. Needs admin rights in large groups.
    Members,
    /// Administrators only. Works with reduced privileges.
    Administrators,
    /// Distinct senders among the last `limit` messages.
    History { limit: usize },
}

impl RetrievalStrategy {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Members => "members",
            Self::Administrators => "admins",
            Self::History { .. } => "history",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::History { limit } => write!(f, "history({limit})"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Unknown retrieval strategy: '{0}'")]
    UnknownStrategy(String),

    #[error("Retrieval strategy listed twice: '{0}'")]
    Duplicate(&'static str),

    #[error("Fallback order is empty")]
    Empty,
}

/// Ordered list of strategies tried until one yields members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackPolicy(Vec<RetrievalStrategy>);

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::standard(200)
    }
}

impl FallbackPolicy {
    /// Members, then administrators, then a history scan.
    #[must_use]
    pub fn standard(history_limit: usize) -> Self {
        Self(vec![
            RetrievalStrategy::Members,
            RetrievalStrategy::Administrators,
            RetrievalStrategy::History { limit: history_limit },
        ])
    }

    pub fn new(strategies: Vec<RetrievalStrategy>) -> Result<Self, PolicyError> {
        if strategies.is_empty() {
            return Err(PolicyError::Empty);
        }

        for (i, s) in strategies.iter().enumerate() {
            if strategies[..i].iter().any(|prev| prev.name() == s.name()) {
                return Err(PolicyError::Duplicate(s.name()));
            }
        }

        Ok(Self(strategies))
    }

    /// Parses a comma-separated order such as `members,history,admins`.
    pub fn parse(order: &str, history_limit: usize) -> Result<Self, PolicyError> {
        let strategies = order
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.to_lowercase().as_str() {
                "members" | "all" => Ok(RetrievalStrategy::Members),
                "admins" | "administrators" => Ok(RetrievalStrategy::Administrators),
                "history" | "messages" => Ok(RetrievalStrategy::History { limit: history_limit }),
                _ => Err(PolicyError::UnknownStrategy(s.to_owned())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(strategies)
    }

    #[must_use]
    pub fn strategies(&self) -> &[RetrievalStrategy] {
        &self.0
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&names.join(" -> "))
    }
}
