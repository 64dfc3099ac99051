/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, login and logout
/// - `users`: The signed-in user's own account
/// - `projects`: Project CRUD, API keys and members
/// - `telemetry`: SDK ingestion endpoints
/// - `analytics`: Event, device and metric queries

pub mod analytics;
pub mod auth;
pub mod health;
pub mod projects;
pub mod telemetry;
pub mod users;

use std::borrow::Cow;
use validator::ValidationError;

/// Rejects names that are empty once trimmed; names are stored trimmed
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some(Cow::Borrowed("Name must not be blank"));
        return Err(error);
    }
    Ok(())
}
