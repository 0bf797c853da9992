//! Template synthesis command.

use anyhow::{Context, Result};
use sitestack_core::Severity;
use sitestack_core::synth::synthesize_checked;
use std::path::Path;
use tracing::{info, warn};

use super::StackSource;

pub fn run(source: &StackSource, vars: &[String], out: Option<&Path>, force: bool) -> Result<()> {
    let stack = source.load(vars)?;
    let (template, findings) = synthesize_checked(&stack, force)
        .context("Refusing to synthesize; run `sitestack validate` for details or pass --force")?;

    for finding in findings.iter() {
        match finding.severity {
            Severity::Error => warn!(code = finding.code, subject = %finding.subject, "Forced past: {}", finding.message),
            Severity::Warning => warn!(code = finding.code, subject = %finding.subject, "{}", finding.message),
            Severity::Info => info!(code = finding.code, subject = %finding.subject, "{}", finding.message),
        }
    }

    let json = template.to_json_pretty()?;
    match out {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write template: {}", path.display()))?;
            info!(
                path = %path.display(),
                resources = template.resources().len(),
                digest = %template.digest(),
                "Wrote template"
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}
