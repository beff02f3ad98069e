use std::fmt;
use thiserror::Error;

/// Failure reported by an [`OrganizationStore`](crate::store::OrganizationStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("organization {0} not found")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store request timed out")]
    Timeout,
}

/// One reason a render fell short of using every input it was asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    ProfileUnavailable(String),
    LogoUnavailable(String),
    /// Token names stripped by the cleanup pass.
    UnresolvedPlaceholders(Vec<String>),
    /// Loop blocks after the first; they are dropped from the output.
    DuplicateLoopBlock { count: usize },
    /// Markers without a partner; left as text and stripped by cleanup.
    UnbalancedMarkers { count: usize },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProfileUnavailable(reason) => write!(f, "company profile unavailable: {reason}"),
            Self::LogoUnavailable(reason) => write!(f, "logo unavailable: {reason}"),
            Self::UnresolvedPlaceholders(names) => {
                write!(f, "unresolved placeholders: {}", names.join(", "))
            }
            Self::DuplicateLoopBlock { count } => {
                write!(f, "{count} extra loop block(s) ignored")
            }
            Self::UnbalancedMarkers { count } => write!(f, "{count} unbalanced block marker(s)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RenderStatus {
    #[default]
    Complete,
    Degraded(Vec<Degradation>),
}

impl RenderStatus {
    pub fn from_degradations(degradations: Vec<Degradation>) -> Self {
        if degradations.is_empty() {
            Self::Complete
        } else {
            Self::Degraded(degradations)
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn degradations(&self) -> &[Degradation] {
        match self {
            Self::Complete => &[],
            Self::Degraded(degradations) => degradations,
        }
    }
}
