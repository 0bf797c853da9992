//! KDL configuration parsing for SiteStack.
//!
//! This crate handles parsing of:
//! - Stack definitions (site.kdl)
//! - Variable interpolation

pub mod error;
pub mod stack;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use stack::{load_stack, parse_stack, parse_stack_with};
pub use variables::{StackContext, VariableContext, VariableContextBuilder};
