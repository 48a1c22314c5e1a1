//! CEL (Common Expression Language) backed permission types
//!
//! Lets hosts define permission types and the bypass check as expressions
//! instead of Rust closures, e.g. `permission in user.roles`.

pub mod engine;
pub mod error;
pub mod convert;
pub mod types;

pub use engine::Engine;
pub use error::{CelError, Result};
pub use types::{CelBypass, CelPermissionType};
