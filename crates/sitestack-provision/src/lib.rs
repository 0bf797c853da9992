//! Provisioners for SiteStack.
//!
//! Provides provisioner implementations:
//! - Local state file (dry runs, plan review, CI checks)

pub mod local;

pub use local::LocalProvisioner;
pub use sitestack_core::provisioner::{ApplyResult, DestroyResult, Provisioner};
