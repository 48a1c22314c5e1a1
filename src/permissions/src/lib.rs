//! # CretoAI Logical Permissions
//!
//! Embeddable access-control decisions over declarative permission trees.
//!
//! A permission tree nests boolean gates (`AND`, `NAND`, `OR`, `NOR`, `XOR`,
//! `NOT`) over named permission types whose meaning the host supplies as
//! callbacks. The engine interprets the tree's shape, consults an optional
//! global bypass, and produces one boolean.
//!
//! ## Example
//!
//! ```rust
//! use cretoai_permissions::{AccessChecker, Context};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> cretoai_permissions::Result<()> {
//! let checker = AccessChecker::new();
//! checker.add_type(
//!     "role",
//!     Arc::new(|role: &str, ctx: &Context| {
//!         ctx["user"]["roles"]
//!             .as_array()
//!             .map(|roles| roles.iter().any(|r| r == role))
//!             .unwrap_or(false)
//!     }),
//! )?;
//!
//! let tree = json!({"role": {"OR": ["editor", "writer"]}});
//! let context = json!({"user": {"id": 1, "roles": ["writer"]}});
//! assert!(checker.check_access(&tree, &context, true)?);
//! # Ok(())
//! # }
//! ```

pub mod types;
pub mod error;
pub mod callback;
pub mod registry;
pub mod bypass;
pub mod evaluator;
pub mod checker;
pub mod config;
pub mod cel;

// Re-export commonly used types
pub use types::{Context, LogicGate, PermissionNode, RESERVED_KEYS};
pub use error::{CallbackSource, PermissionError, Result};
pub use callback::{BypassCallback, BypassCheck, CallbackResult, TypeCallback, TypeCheck};
pub use registry::TypeRegistry;
pub use bypass::BypassResolver;
pub use evaluator::PermissionTreeEvaluator;
pub use checker::AccessChecker;
pub use config::{CheckerConfig, PermissionsConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
