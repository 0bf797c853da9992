//! Core resource model for SiteStack.
//!
//! This crate contains:
//! - Logical identifiers and credential references
//! - Source, build, storage and distribution declarations
//! - Pipeline and stage definitions with the artifact contract
//! - Stack composition, state and plan types
//! - Validation of the resource graph and access policies
//! - Template synthesis, diffing and dependency ordering
//! - The provisioner trait and the built-in stack revisions

pub mod artifact;
pub mod build;
pub mod diff;
pub mod distribution;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod provisioner;
pub mod reachability;
pub mod revisions;
pub mod secret;
pub mod source;
pub mod stack;
pub mod storage;
pub mod synth;
pub mod validate;

pub use diff::diff;
pub use error::{Error, Result};
pub use id::LogicalId;
pub use provisioner::Provisioner;
pub use reachability::{Exposure, reachability};
pub use revisions::Revision;
pub use stack::SiteStack;
pub use synth::{Template, synthesize};
pub use validate::{Finding, Findings, Severity, validate};
