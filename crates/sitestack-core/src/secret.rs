//! Credential references.
//!
//! Credentials are never part of a stack declaration. A [`SecretRef`] names
//! where the secret lives and renders as a dynamic reference that the
//! provisioning engine resolves at apply time.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Backend holding the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretStore {
    #[default]
    SecretsManager,
}

impl std::fmt::Display for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretStore::SecretsManager => write!(f, "secretsmanager"),
        }
    }
}

/// Reference to a stored secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub store: SecretStore,
    /// Secret name or ARN.
    pub name: String,
    /// JSON key inside the secret string, if the secret is a JSON object.
    pub json_field: Option<String>,
}

impl SecretRef {
    pub fn secrets_manager(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("secret name must not be empty".to_string()));
        }
        if name.contains("{{") || name.contains("}}") {
            return Err(Error::InvalidInput(format!(
                "secret name '{}' must not contain a dynamic reference",
                name
            )));
        }
        Ok(Self {
            store: SecretStore::SecretsManager,
            name,
            json_field: None,
        })
    }

    pub fn with_json_field(mut self, field: impl Into<String>) -> Self {
        self.json_field = Some(field.into());
        self
    }

    /// Render the dynamic reference string understood by the engine.
    pub fn dynamic_reference(&self) -> String {
        format!(
            "{{{{resolve:{}:{}:SecretString:{}::}}}}",
            self.store,
            self.name,
            self.json_field.as_deref().unwrap_or("")
        )
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dynamic_reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_reference() {
        let secret = SecretRef::secrets_manager("github_token2").unwrap();
        assert_eq!(
            secret.dynamic_reference(),
            "{{resolve:secretsmanager:github_token2:SecretString:::}}"
        );
    }

    #[test]
    fn test_dynamic_reference_with_field() {
        let secret = SecretRef::secrets_manager("ci/github")
            .unwrap()
            .with_json_field("token");
        assert_eq!(
            secret.to_string(),
            "{{resolve:secretsmanager:ci/github:SecretString:token::}}"
        );
    }

    #[test]
    fn test_rejects_empty_and_nested_reference() {
        assert!(SecretRef::secrets_manager("  ").is_err());
        assert!(SecretRef::secrets_manager("{{resolve:ssm:x}}").is_err());
    }
}
