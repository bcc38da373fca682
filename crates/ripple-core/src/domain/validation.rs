//! Ingress validation for change events.
//!
//! Runs before any graph lookup; an invalid event is never dispatched.

use super::error::ValidationError;
use super::event::ChangeEvent;

/// Validate a [`ChangeEvent`].
///
/// # Errors
///
/// - `ValidationError::EmptySourceRepo`: `source_repo` is blank.
/// - `ValidationError::EmptyCommitSha`: `commit_sha` is blank.
/// - `ValidationError::EmptyChangedFilePath`: a changed file has a blank path.
pub fn validate_change_event(event: &ChangeEvent) -> Result<(), ValidationError> {
    if event.source_repo.trim().is_empty() {
        return Err(ValidationError::EmptySourceRepo);
    }
    if event.commit_sha.trim().is_empty() {
        return Err(ValidationError::EmptyCommitSha);
    }
    if let Some(index) = event
        .changed_files
        .iter()
        .position(|f| f.path.trim().is_empty())
    {
        return Err(ValidationError::EmptyChangedFilePath { index });
    }
    Ok(())
}
