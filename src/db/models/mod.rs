//! Persisted records and request/response shapes.

pub mod notification;
pub mod user;

pub use notification::*;
pub use user::*;
