//! Domain error shared by the crates layered on `core`.

/// Failures raised by pure domain logic and request identity checks.
///
/// Engine and remote failures have their own enums; this one only covers
/// what the HTTP layer maps to a 4xx without consulting the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Caller-supplied input failed a domain rule.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}
