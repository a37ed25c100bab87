//! Authentication system
//!
//! Checks USER/PASS against the configured user table.

pub mod validator;

pub use validator::{ANONYMOUS_USERS, is_anonymous, validate_password, validate_user};
