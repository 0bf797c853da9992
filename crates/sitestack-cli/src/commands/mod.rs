//! CLI command implementations.

pub mod deploy;
pub mod revisions;
pub mod synth;
pub mod validate;

use anyhow::{Context, Result, bail};
use sitestack_config::{VariableContext, load_stack};
use sitestack_core::{Findings, Revision, SiteStack};
use std::path::PathBuf;

/// Where the stack comes from.
pub enum StackSource {
    File(PathBuf),
    Revision(Revision),
}

impl StackSource {
    pub fn load(&self, vars: &[String]) -> Result<SiteStack> {
        match self {
            StackSource::File(path) => {
                let ctx = variable_context(vars)?;
                load_stack(path, &ctx)
                    .with_context(|| format!("Failed to load stack definition: {}", path.display()))
            }
            StackSource::Revision(revision) => revision
                .stack()
                .with_context(|| format!("Failed to build revision: {}", revision)),
        }
    }
}

fn variable_context(vars: &[String]) -> Result<VariableContext> {
    let mut ctx = VariableContext::new();
    ctx.populate_env();
    for var in vars {
        let Some((name, value)) = var.split_once('=') else {
            bail!("Invalid --var '{}': expected NAME=VALUE", var);
        };
        ctx.set(name, value);
    }
    Ok(ctx)
}

pub fn print_findings(findings: &Findings) {
    if findings.is_empty() {
        println!("No findings.");
        return;
    }
    for finding in findings.iter() {
        println!("{}", finding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_context_parses_pairs() {
        let ctx = variable_context(&["branch=release".to_string()]).unwrap();
        assert_eq!(ctx.interpolate("${branch}"), "release");
        assert!(variable_context(&["branch".to_string()]).is_err());
    }

    #[test]
    fn test_revision_source_loads() {
        let stack = StackSource::Revision(Revision::PublicWebsite).load(&[]).unwrap();
        assert!(stack.distribution.is_none());
    }
}
