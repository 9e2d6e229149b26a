use thiserror::Error;

use crate::{engine::GeofenceDecision, location::{GeoPoint, PositionError}};

/// Reasons a zone check didn't complete. None of them are fatal; the next
/// cycle may simply try again.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// No usable sample this cycle; nothing was changed.
    #[error(transparent)]
    PositionUnavailable(#[from] PositionError),

    /// No home location saved yet.
    #[error("home location is not configured")]
    HomeNotConfigured,

    /// Reading the settings the check depends on failed; nothing was changed.
    #[error("could not read automation settings")]
    SettingsUnavailable(#[source] anyhow::Error),

    #[error("could not store home location")]
    HomeNotSaved(#[source] anyhow::Error),

    /// The decision was made but the new zone membership wasn't stored.
    /// Retry the write with the carried decision instead of sampling again.
    #[error("could not store zone membership")]
    PersistenceFailure {
        sample: GeoPoint,
        decision: GeofenceDecision,
        #[source]
        source: anyhow::Error,
    },
}

impl AutomationError {
    /// What to ask the user to do, if there is anything they can do.
    pub fn user_prompt(&self) -> Option<&'static str> {
        match self {
            AutomationError::PositionUnavailable(_) => {
                Some("Location is unavailable. Enable location access and try again.")
            }
            AutomationError::HomeNotConfigured => {
                Some("Home location is not set. Save your current position as home first.")
            }
            _ => None,
        }
    }
}
