//! Variable interpolation for stack definitions.
//!
//! Supports variables like:
//! - `${stack.name}` - Stack name
//! - `${stack.region}` - Target region
//! - `${stack.account}` - Target account
//! - `${env.VAR_NAME}` - Environment variable
//! - `${timestamp}` - Unix timestamp
//! - `${date}` - ISO date (YYYY-MM-DD)
//! - `${datetime}` - ISO datetime
//!
//! `${secrets.NAME}` is recognised only so definitions using it can be
//! rejected; secret values never enter a template.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub stack: StackContext,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Custom variables defined by user
    pub custom: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct StackContext {
    pub name: String,
    pub region: Option<String>,
    pub account: Option<String>,
}

static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    /// Add a custom variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.custom.insert(name.to_string(), value.into());
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["stack", "name"] if !self.stack.name.is_empty() => Some(self.stack.name.clone()),
            ["stack", "region"] => self.stack.region.clone(),
            ["stack", "account"] => self.stack.account.clone(),

            ["env", name] => self.env.get(*name).cloned(),

            ["timestamp"] => Some(chrono::Utc::now().timestamp().to_string()),
            ["date"] => Some(chrono::Utc::now().format("%Y-%m-%d").to_string()),
            ["datetime"] => Some(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),

            [name] => self.custom.get(*name).cloned(),

            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    /// Unknown variables are left as written.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Names of all `${secrets.*}` variables used in a string.
    pub fn find_secrets_in_string(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .filter_map(|caps| {
                let var_name = &caps[1];
                if var_name.starts_with("secrets.") {
                    Some(var_name.to_string())
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_stack_name(mut self, name: impl Into<String>) -> Self {
        self.ctx.stack.name = name.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.ctx.stack.region = Some(region.into());
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.ctx.stack.account = Some(account.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.env.insert(key.into(), value.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.custom.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_interpolation() {
        let ctx = VariableContextBuilder::new()
            .with_stack_name("InfraStack")
            .with_region("eu-west-1")
            .build();

        let result = ctx.interpolate("${stack.name} in ${stack.region}");
        assert_eq!(result, "InfraStack in eu-west-1");
    }

    #[test]
    fn test_unset_account_preserved() {
        let ctx = VariableContextBuilder::new().with_stack_name("InfraStack").build();
        assert_eq!(ctx.interpolate("${stack.account}"), "${stack.account}");
    }

    #[test]
    fn test_env_variables() {
        let ctx = VariableContextBuilder::new()
            .with_env("SITE_BRANCH", "master")
            .with_env("SITE_OWNER", "mactunechy")
            .build();

        let result = ctx.interpolate("${env.SITE_OWNER}@${env.SITE_BRANCH}");
        assert_eq!(result, "mactunechy@master");
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let ctx = VariableContext::new();
        let result = ctx.interpolate("Unknown: ${unknown.var}");
        assert_eq!(result, "Unknown: ${unknown.var}");
    }

    #[test]
    fn test_custom_variables() {
        let mut ctx = VariableContext::new();
        ctx.set("bucket", "ViteSiteBucket");

        assert_eq!(ctx.interpolate("id ${bucket}"), "id ViteSiteBucket");
    }

    #[test]
    fn test_date_variable() {
        let ctx = VariableContext::new();

        let result = ctx.interpolate("${date}");
        assert_eq!(result.len(), 10);
        assert!(result.contains('-'));
    }

    #[test]
    fn test_secrets_are_never_resolved() {
        let ctx = VariableContextBuilder::new()
            .with_custom("secrets", "nope")
            .build();
        let input = "token ${secrets.GITHUB_TOKEN}";
        assert_eq!(ctx.interpolate(input), input);
        assert_eq!(ctx.find_secrets_in_string(input), vec!["secrets.GITHUB_TOKEN"]);
    }

    #[test]
    fn test_nested_braces() {
        let ctx = VariableContextBuilder::new().with_stack_name("InfraStack").build();

        let result = ctx.interpolate(r#"{"stack": "${stack.name}"}"#);
        assert_eq!(result, r#"{"stack": "InfraStack"}"#);
    }
}
