//! Turn status classification

use std::fmt;

/// A turn status as reported by the agent
///
/// Comparison ignores case and the separators `_`, `-` and spaces, so
/// `inProgress`, `in_progress` and `IN-PROGRESS` are the same status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnStatus {
    raw: String,
    key: String,
}

impl TurnStatus {
    /// Wrap a raw status string
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let key = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        Self {
            raw: raw.to_string(),
            key,
        }
    }

    /// Status exactly as the agent sent it
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Terminal iff not in progress
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.key != "inprogress"
    }

    /// Failed, interrupted or cancelled (either spelling)
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self.key.as_str(),
            "failed" | "interrupted" | "cancelled" | "canceled"
        )
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
