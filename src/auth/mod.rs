//! Authentication gate.
//!
//! This module handles:
//! - Token extraction from the `Authorization` header or a cookie
//! - Validation through an injected [`TokenValidator`]
//! - The per-request admit/reject decision ([`Gate`])
//! - axum middleware applying the gate to routes
//! - Mock validator for testing

pub mod gate;
pub mod middleware;
pub mod mock;
pub mod token;
pub mod validator;

pub use gate::{Gate, GateDecision};
pub use middleware::require_identity;
pub use mock::MockValidator;
pub use token::{extract_token, AuthToken, Identity};
pub use validator::{TokenValidator, UserInfoValidator};
