/// Router Module Index
///
/// Routes are split by who may call them, and access control is attached per module
/// as Axum layers in `create_router`, never left to individual handlers.

/// Routes open to anonymous callers.
pub mod public;

/// Routes behind `require_session`. Every handler receives a resolved `Principal`.
pub mod authenticated;

/// Routes behind `require_session` and then `require_admin`.
pub mod admin;
