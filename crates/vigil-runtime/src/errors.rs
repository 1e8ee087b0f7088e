//! Store-to-domain error translation.

use vigil_core::DomainError;
use vigil_store::StoreError;

/// Translate a persistence failure into the domain taxonomy.
///
/// Version misses become [`DomainError::Conflict`], missing rows become
/// [`DomainError::NotFound`], and everything else is infrastructure noise
/// surfaced as [`DomainError::Internal`].
pub(crate) fn store_to_domain(err: StoreError) -> DomainError {
    match err {
        StoreError::SessionNotFound(id) => DomainError::not_found("session", id),
        StoreError::AttemptNotFound(id) => DomainError::not_found("attempt", id),
        StoreError::Conflict { entity, id } => DomainError::Conflict { entity, id },
        other => DomainError::internal(other.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
