//! Services that combine access decisions, repositories and the audited
//! mutation executor. Every write path goes through
//! [`AuditedExecutor::mutate`](crate::AuditedExecutor::mutate).

mod assignment;
mod audit;
mod institution;
mod invite;
mod resource;
mod user;
mod visibility;

pub use assignment::AssignmentService;
pub use audit::AuditTrailService;
pub use institution::InstitutionService;
pub use invite::InviteService;
pub use resource::ResourceService;
pub use user::UserService;
pub use visibility::VisibilityService;

use comply_core::error::{ComplyError, ComplyResult};

/// Trimmed, non-empty text input.
pub(crate) fn required_text(field: &str, value: &str) -> ComplyResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ComplyError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}
