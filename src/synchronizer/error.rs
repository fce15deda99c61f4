use crate::source::SourceError;

/// Errors returned by synchronizer operations.
///
/// Fetch failures never come through here; they land in the `error` field
/// of the state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("No active patient")]
    NoPatient,
    #[error("Health twin update was rejected")]
    UpdateRejected,
    #[error(transparent)]
    Source(#[from] SourceError),
}
