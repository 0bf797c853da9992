//! Plan, deploy and destroy against local state.

use anyhow::{Context, Result};
use sitestack_core::synth::synthesize_checked;
use sitestack_core::{Provisioner, synthesize};
use sitestack_provision::LocalProvisioner;
use std::path::Path;
use tracing::info;

use super::{StackSource, print_findings};

pub async fn diff(source: &StackSource, vars: &[String], state_dir: &Path) -> Result<()> {
    let stack = source.load(vars)?;
    let template = synthesize(&stack)?;
    let provisioner = LocalProvisioner::new(state_dir, &stack.name);

    let plan = provisioner.plan(&template).await?;
    println!("{}", plan);
    Ok(())
}

pub async fn deploy(
    source: &StackSource,
    vars: &[String],
    state_dir: &Path,
    force: bool,
) -> Result<()> {
    let stack = source.load(vars)?;
    let (template, findings) = match synthesize_checked(&stack, force) {
        Ok(result) => result,
        Err(e) => {
            print_findings(&sitestack_core::validate(&stack));
            return Err(e).context("Refusing to deploy; pass --force to override");
        }
    };
    if findings.has_errors() {
        println!("Deploying despite {} error(s):", findings.errors().count());
        print_findings(&findings);
    }

    let provisioner = LocalProvisioner::new(state_dir, &stack.name);
    info!(stack = %stack.name, provisioner = provisioner.name(), "Deploying stack");
    let result = provisioner.apply(&template).await?;

    if !result.changed() {
        println!("No changes. Stack is up to date (serial {}).", result.serial);
    } else {
        println!("{}", result.plan);
        println!("Stack {} deployed (serial {}).", stack.name, result.serial);
    }
    if !result.outputs.is_empty() {
        println!();
        println!("Outputs:");
        for (name, value) in &result.outputs {
            println!("  {} = {}", name, value);
        }
    }
    Ok(())
}

pub async fn destroy(source: &StackSource, vars: &[String], state_dir: &Path) -> Result<()> {
    let stack = source.load(vars)?;
    let provisioner = LocalProvisioner::new(state_dir, &stack.name);

    let result = provisioner
        .destroy()
        .await
        .with_context(|| format!("Failed to destroy stack {}", stack.name))?;

    if result.destroyed.is_empty() && result.orphaned.is_empty() {
        println!("Nothing to destroy.");
        return Ok(());
    }
    for id in &result.destroyed {
        println!("  destroyed {}", id);
    }
    for id in &result.orphaned {
        println!("   retained {}", id);
    }
    println!(
        "Destroyed {} resource(s), retained {}.",
        result.destroyed.len(),
        result.orphaned.len()
    );
    Ok(())
}
