use serde::Serialize;
use std::fmt;

use super::domain::{Permit, ProcessingStatus};

/// Lifecycle bucket of a permit, derived once from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    /// Not issued yet; tracks where the opening process stands.
    Opening { processing: ProcessingStatus },
    Active,
    Renewing,
}

impl LifecycleState {
    pub fn of(permit: &Permit) -> Self {
        if permit.processing_status == ProcessingStatus::Renewal {
            return Self::Renewing;
        }

        match permit.issue_date {
            None => Self::Opening {
                processing: permit.processing_status,
            },
            Some(_) => Self::Active,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Opening { .. } => "Em abertura",
            Self::Active => "Em funcionamento",
            Self::Renewing => "Em renovação",
        }
    }

    pub const fn is_opening(self) -> bool {
        matches!(self, Self::Opening { .. })
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opening { .. } => f.write_str("opening"),
            Self::Active => f.write_str("active"),
            Self::Renewing => f.write_str("renewing"),
        }
    }
}
