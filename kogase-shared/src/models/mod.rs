/// Database models
///
/// - `user`: dashboard accounts and system roles
/// - `project`: tenants and their API keys
/// - `project_user`: non-owner project membership
/// - `auth_token`: persisted, revocable session tokens
/// - `device`: client installations per project
/// - `event`: append-only telemetry events
/// - `metric`: pre-aggregated analytics (read-only here)
///
/// All tables except `project_users` are soft-deleted: a row with `deleted_at` set
/// is invisible to every query in this module and in `analytics`.

pub mod auth_token;
pub mod device;
pub mod event;
pub mod metric;
pub mod project;
pub mod project_user;
pub mod user;

/// A string that names no variant of a database enum
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
