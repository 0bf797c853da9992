//! Build projects and buildspecs.
//!
//! A [`BuildProject`] describes the managed build environment and the
//! [`BuildSpec`] that turns the source artifact into the deployable site.
//! The buildspec is usually derived from a [`Toolchain`], which records where the
//! external build tool writes its output so the artifact selection can be
//! checked against it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{Error, LogicalId, Result};

/// Buildspec schema version understood by the build service.
pub const BUILDSPEC_VERSION: &str = "0.2";

/// Language runtime installed in the build container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeLanguage {
    NodeJs,
    Python,
    Java,
    Golang,
    Ruby,
    Dotnet,
    Php,
}

impl RuntimeLanguage {
    /// Key used under `runtime-versions`.
    pub fn key(&self) -> &'static str {
        match self {
            RuntimeLanguage::NodeJs => "nodejs",
            RuntimeLanguage::Python => "python",
            RuntimeLanguage::Java => "java",
            RuntimeLanguage::Golang => "golang",
            RuntimeLanguage::Ruby => "ruby",
            RuntimeLanguage::Dotnet => "dotnet",
            RuntimeLanguage::Php => "php",
        }
    }
}

impl std::fmt::Display for RuntimeLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for RuntimeLanguage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nodejs" | "node" => Ok(RuntimeLanguage::NodeJs),
            "python" => Ok(RuntimeLanguage::Python),
            "java" => Ok(RuntimeLanguage::Java),
            "golang" | "go" => Ok(RuntimeLanguage::Golang),
            "ruby" => Ok(RuntimeLanguage::Ruby),
            "dotnet" => Ok(RuntimeLanguage::Dotnet),
            "php" => Ok(RuntimeLanguage::Php),
            other => Err(Error::InvalidInput(format!("unknown runtime: {}", other))),
        }
    }
}

/// An explicitly pinned runtime version.
///
/// There is deliberately no way to express "latest": builds must be
/// reproducible across time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuntimeVersion(String);

impl RuntimeVersion {
    pub fn parse(version: &str) -> Result<Self> {
        let version = version.trim();
        if version.is_empty() {
            return Err(Error::InvalidInput("runtime version must not be empty".to_string()));
        }
        if version.eq_ignore_ascii_case("latest") {
            return Err(Error::InvalidInput(
                "runtime version 'latest' is not reproducible; pin an explicit version".to_string(),
            ));
        }
        if !version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return Err(Error::InvalidInput(format!(
                "invalid runtime version '{}'",
                version
            )));
        }
        Ok(Self(version.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RuntimeVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RuntimeVersion> for String {
    fn from(v: RuntimeVersion) -> Self {
        v.0
    }
}

/// A language runtime pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runtime {
    pub language: RuntimeLanguage,
    pub version: RuntimeVersion,
}

impl Runtime {
    pub fn new(language: RuntimeLanguage, version: &str) -> Result<Self> {
        Ok(Self {
            language,
            version: RuntimeVersion::parse(version)?,
        })
    }
}

/// Managed build images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildImage {
    #[default]
    AmazonLinux2_5,
    AmazonLinux2023_5,
    Standard7,
}

impl BuildImage {
    pub fn image_id(&self) -> &'static str {
        match self {
            BuildImage::AmazonLinux2_5 => "aws/codebuild/amazonlinux2-x86_64-standard:5.0",
            BuildImage::AmazonLinux2023_5 => "aws/codebuild/amazonlinux-x86_64-standard:5.0",
            BuildImage::Standard7 => "aws/codebuild/standard:7.0",
        }
    }
}

impl std::str::FromStr for BuildImage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "amazon-linux-2-5" => Ok(BuildImage::AmazonLinux2_5),
            "amazon-linux-2023-5" => Ok(BuildImage::AmazonLinux2023_5),
            "standard-7" => Ok(BuildImage::Standard7),
            other => Err(Error::InvalidInput(format!("unknown build image: {}", other))),
        }
    }
}

/// Size of the build container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeType {
    #[default]
    Small,
    Medium,
    Large,
}

impl ComputeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeType::Small => "BUILD_GENERAL1_SMALL",
            ComputeType::Medium => "BUILD_GENERAL1_MEDIUM",
            ComputeType::Large => "BUILD_GENERAL1_LARGE",
        }
    }
}

impl std::str::FromStr for ComputeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "small" => Ok(ComputeType::Small),
            "medium" => Ok(ComputeType::Medium),
            "large" => Ok(ComputeType::Large),
            other => Err(Error::InvalidInput(format!("unknown compute type: {}", other))),
        }
    }
}

/// JavaScript package manager used by the site's toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    #[default]
    Pnpm,
    Yarn,
}

impl PackageManager {
    pub fn binary(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
        }
    }

    /// Commands installing the package manager itself and the dependencies.
    fn install_commands(&self) -> Vec<String> {
        match self {
            PackageManager::Npm => vec!["npm ci".to_string()],
            PackageManager::Pnpm | PackageManager::Yarn => vec![
                format!("npm install {} -g", self.binary()),
                format!("{} install", self.binary()),
            ],
        }
    }
}

impl std::str::FromStr for PackageManager {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "npm" => Ok(PackageManager::Npm),
            "pnpm" => Ok(PackageManager::Pnpm),
            "yarn" => Ok(PackageManager::Yarn),
            other => Err(Error::InvalidInput(format!("unknown package manager: {}", other))),
        }
    }
}

/// What the external build toolchain does: where the app lives and where
/// its build command writes output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    pub package_manager: PackageManager,
    /// Application folder relative to the repository root.
    pub app_dir: String,
    /// Output folder relative to `app_dir`.
    pub output_dir: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            package_manager: PackageManager::Pnpm,
            app_dir: "app".to_string(),
            output_dir: "dist".to_string(),
        }
    }
}

impl Toolchain {
    /// Repository-relative path of the build output.
    pub fn output_path(&self) -> String {
        join_path(&self.app_dir, &self.output_dir)
    }
}

fn join_path(base: &str, rel: &str) -> String {
    let base = base.trim_matches('/');
    let rel = rel.trim_matches('/');
    match (base.is_empty() || base == ".", rel.is_empty()) {
        (true, _) => rel.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, rel),
    }
}

/// One buildspec phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub runtime_versions: Vec<Runtime>,
    pub commands: Vec<String>,
}

impl Phase {
    pub fn commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            runtime_versions: Vec::new(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    fn to_json(&self) -> Value {
        let mut phase = Map::new();
        if !self.runtime_versions.is_empty() {
            let versions: Map<String, Value> = self
                .runtime_versions
                .iter()
                .map(|r| (r.language.key().to_string(), json!(r.version.as_str())))
                .collect();
            phase.insert("runtime-versions".to_string(), Value::Object(versions));
        }
        phase.insert("commands".to_string(), json!(self.commands));
        Value::Object(phase)
    }
}

/// Files selected from the build container as the output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSelection {
    pub base_directory: String,
    pub files: Vec<String>,
}

impl ArtifactSelection {
    /// Everything below `base_directory`.
    pub fn all_under(base_directory: impl Into<String>) -> Self {
        Self {
            base_directory: base_directory.into(),
            files: vec!["**/*".to_string()],
        }
    }
}

/// Typed buildspec document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub install: Phase,
    pub pre_build: Option<Phase>,
    pub build: Phase,
    pub post_build: Option<Phase>,
    pub artifacts: ArtifactSelection,
}

impl BuildSpec {
    /// Derive the install/build steps and output selection from a toolchain.
    pub fn for_toolchain(toolchain: &Toolchain, runtime: Runtime) -> Self {
        let pm = toolchain.package_manager;
        let mut install = Vec::new();
        let app_dir = toolchain.app_dir.trim_matches('/');
        if !app_dir.is_empty() && app_dir != "." {
            install.push(format!("cd {}", app_dir));
        }
        install.extend(pm.install_commands());

        Self {
            install: Phase {
                runtime_versions: vec![runtime],
                commands: install,
            },
            pre_build: None,
            build: Phase::commands([format!("{} run build", pm.binary())]),
            post_build: None,
            artifacts: ArtifactSelection::all_under(toolchain.output_path()),
        }
    }

    /// Render the buildspec document.
    pub fn to_json(&self) -> Value {
        let mut phases = Map::new();
        phases.insert("install".to_string(), self.install.to_json());
        if let Some(pre) = &self.pre_build {
            phases.insert("pre_build".to_string(), pre.to_json());
        }
        phases.insert("build".to_string(), self.build.to_json());
        if let Some(post) = &self.post_build {
            phases.insert("post_build".to_string(), post.to_json());
        }

        json!({
            "version": BUILDSPEC_VERSION,
            "phases": Value::Object(phases),
            "artifacts": {
                "files": self.artifacts.files,
                "base-directory": self.artifacts.base_directory,
            },
        })
    }

    /// Base directory with redundant slashes removed, for comparison.
    pub fn normalized_base_directory(&self) -> String {
        join_path(&self.artifacts.base_directory, "")
    }
}

/// Managed build environment plus the job it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildProject {
    pub id: LogicalId,
    pub image: BuildImage,
    pub compute: ComputeType,
    pub spec: BuildSpec,
    pub toolchain: Toolchain,
    /// `None` leaves the service default in place.
    pub timeout_minutes: Option<u16>,
}

impl BuildProject {
    pub const MIN_TIMEOUT_MINUTES: u16 = 5;
    pub const MAX_TIMEOUT_MINUTES: u16 = 480;

    pub fn new(id: LogicalId, toolchain: Toolchain, runtime: Runtime) -> Self {
        let spec = BuildSpec::for_toolchain(&toolchain, runtime);
        Self {
            id,
            image: BuildImage::default(),
            compute: ComputeType::default(),
            spec,
            toolchain,
            timeout_minutes: None,
        }
    }

    pub fn with_image(mut self, image: BuildImage) -> Self {
        self.image = image;
        self
    }

    pub fn with_timeout(mut self, minutes: u16) -> Result<Self> {
        if !(Self::MIN_TIMEOUT_MINUTES..=Self::MAX_TIMEOUT_MINUTES).contains(&minutes) {
            return Err(Error::InvalidInput(format!(
                "build timeout must be between {} and {} minutes, got {}",
                Self::MIN_TIMEOUT_MINUTES,
                Self::MAX_TIMEOUT_MINUTES,
                minutes
            )));
        }
        self.timeout_minutes = Some(minutes);
        Ok(self)
    }

    /// Whether the artifact selection points at what the toolchain emits.
    pub fn output_matches_toolchain(&self) -> bool {
        self.spec.normalized_base_directory() == self.toolchain.output_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(version: &str) -> Runtime {
        Runtime::new(RuntimeLanguage::NodeJs, version).unwrap()
    }

    #[test]
    fn test_latest_is_rejected() {
        assert!(RuntimeVersion::parse("latest").is_err());
        assert!(RuntimeVersion::parse("LATEST").is_err());
        assert!(RuntimeVersion::parse("").is_err());
        assert!(RuntimeVersion::parse("20 || latest").is_err());
        assert_eq!(RuntimeVersion::parse("20").unwrap().as_str(), "20");
        assert_eq!(RuntimeVersion::parse("18.x").unwrap().as_str(), "18.x");
    }

    #[test]
    fn test_pnpm_toolchain_spec() {
        let spec = BuildSpec::for_toolchain(&Toolchain::default(), node("20"));
        assert_eq!(
            spec.install.commands,
            vec!["cd app", "npm install pnpm -g", "pnpm install"]
        );
        assert_eq!(spec.build.commands, vec!["pnpm run build"]);
        assert_eq!(spec.artifacts.base_directory, "app/dist");
        assert_eq!(spec.artifacts.files, vec!["**/*"]);
    }

    #[test]
    fn test_npm_toolchain_at_repo_root() {
        let toolchain = Toolchain {
            package_manager: PackageManager::Npm,
            app_dir: ".".to_string(),
            output_dir: "build".to_string(),
        };
        let spec = BuildSpec::for_toolchain(&toolchain, node("18"));
        assert_eq!(spec.install.commands, vec!["npm ci"]);
        assert_eq!(spec.artifacts.base_directory, "build");
    }

    #[test]
    fn test_buildspec_json_shape() {
        let spec = BuildSpec::for_toolchain(&Toolchain::default(), node("20"));
        let doc = spec.to_json();
        assert_eq!(doc["version"], "0.2");
        assert_eq!(doc["phases"]["install"]["runtime-versions"]["nodejs"], "20");
        assert_eq!(doc["phases"]["build"]["commands"][0], "pnpm run build");
        assert_eq!(doc["artifacts"]["base-directory"], "app/dist");
        assert!(doc["phases"].get("pre_build").is_none());
        assert!(doc["phases"]["build"].get("runtime-versions").is_none());
    }

    #[test]
    fn test_output_mismatch_detected() {
        let id = LogicalId::new("ViteSiteBuildProject").unwrap();
        let mut project = BuildProject::new(id, Toolchain::default(), node("20"));
        assert!(project.output_matches_toolchain());

        project.spec.artifacts.base_directory = "/app/dist/".to_string();
        assert!(project.output_matches_toolchain());

        project.spec.artifacts.base_directory = "app/build".to_string();
        assert!(!project.output_matches_toolchain());
    }

    #[test]
    fn test_timeout_bounds() {
        let id = LogicalId::new("Project").unwrap();
        let project = BuildProject::new(id, Toolchain::default(), node("20"));
        assert!(project.clone().with_timeout(4).is_err());
        assert!(project.clone().with_timeout(481).is_err());
        assert_eq!(project.with_timeout(60).unwrap().timeout_minutes, Some(60));
    }
}
