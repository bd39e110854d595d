//! Frame protocol error types.

use thiserror::Error;

/// Errors raised by the swapchain manager, the frame scheduler and backends.
///
/// An outdated surface is not an error: it is reported through
/// [`AcquireResult::NeedsRecreate`](crate::AcquireResult::NeedsRecreate) and
/// [`PresentOutcome::NeedsRecreate`](crate::PresentOutcome::NeedsRecreate).
#[derive(Error, Debug)]
pub enum FrameError {
    /// Instance, device, surface or swapchain could not be created.
    #[error("Graphics backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Command submission failed; slot/fence pairing is no longer known.
    #[error("Command submission failed: {0}")]
    SubmissionFailed(String),

    /// A bounded fence wait expired.
    #[error("Fence wait timed out after {timeout_ns} ns")]
    WaitTimeout { timeout_ns: u64 },

    /// A bounded image acquisition expired.
    #[error("Swapchain image acquisition timed out after {timeout_ns} ns")]
    AcquireTimeout { timeout_ns: u64 },

    /// Protocol misuse.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Any other backend failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl FrameError {
    /// Returns true for errors that leave the scheduler needing resynchronization.
    pub fn is_submission_failure(&self) -> bool {
        matches!(self, Self::SubmissionFailed(_))
    }

    /// Re-tag a backend failure as a construction failure.
    pub(crate) fn into_unavailable(self) -> Self {
        match self {
            Self::BackendUnavailable(_) | Self::InvalidState(_) => self,
            other => Self::BackendUnavailable(other.to_string()),
        }
    }

    /// Re-tag a backend failure as a submission failure.
    pub(crate) fn into_submission_failure(self) -> Self {
        match self {
            Self::SubmissionFailed(_) => self,
            other => Self::SubmissionFailed(other.to_string()),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, FrameError>;
