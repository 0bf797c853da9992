//! Stack validation command.

use anyhow::{Result, bail};
use sitestack_core::{reachability, validate};

use super::{StackSource, print_findings};

pub fn run(source: &StackSource, vars: &[String]) -> Result<()> {
    let stack = source.load(vars)?;
    let findings = validate(&stack);

    println!("Stack: {}", stack.name);
    println!("Stages: {}", stack.pipeline.stage_names().join(" -> "));
    println!("Reachable through: {}", reachability(&stack));
    println!();
    print_findings(&findings);

    if findings.has_errors() {
        println!();
        bail!("Stack has {} error(s)", findings.errors().count());
    }
    println!();
    println!("Stack is valid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitestack_core::Revision;

    #[test]
    fn test_valid_revision_passes() {
        let source = StackSource::Revision(Revision::PrivateWithIdentity);
        assert!(run(&source, &[]).is_ok());
    }

    #[test]
    fn test_errors_fail_the_command() {
        let source = StackSource::Revision(Revision::LegacyAnyPrincipal);
        let err = run(&source, &[]).unwrap_err();
        assert!(err.to_string().contains("error(s)"));
    }
}
