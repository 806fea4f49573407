//! The role manifest data model.
//!
//! A role manifest is a YAML document with two top-level keys: `roles` and
//! `configuration`. Field names and nesting are a compatibility contract
//! shared with every other tool that reads or writes these documents, so the
//! serde attributes here are load-bearing.
//!
//! Parsing alone produces an unresolved model; [`crate::loader`] resolves job
//! references against a release index, merges configuration templates, and
//! runs the validation passes before handing the manifest to callers.

use crate::release::Job;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Requested role names that do not exist in the manifest.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("some roles are unknown: {}", names.join(", "))]
pub struct SelectError {
    pub names: Vec<String>,
}

/// The type of a role; anything else in the document is a validation finding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoleType {
    /// A role whose jobs run as long-lived deployment jobs.
    #[default]
    Bosh,
    /// A role whose jobs run as one-shot tasks.
    BoshTask,
    /// A raw image role; validated, then dropped from the final role list.
    Docker,
    /// An unrecognized value, preserved verbatim for error reporting.
    Other(String),
}

impl From<String> for RoleType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "" | "bosh" => RoleType::Bosh,
            "bosh-task" => RoleType::BoshTask,
            "docker" => RoleType::Docker,
            _ => RoleType::Other(s),
        }
    }
}

impl From<RoleType> for String {
    fn from(t: RoleType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleType::Bosh => f.write_str("bosh"),
            RoleType::BoshTask => f.write_str("bosh-task"),
            RoleType::Docker => f.write_str("docker"),
            RoleType::Other(s) => f.write_str(s),
        }
    }
}

/// When in the deployment lifecycle a role's jobs execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FlightStage {
    /// Runs before the main jobs start.
    PreFlight,
    /// A main job.
    Flight,
    /// Runs after the main jobs are up.
    PostFlight,
    /// Only runs via user intervention.
    Manual,
    /// An unrecognized value, preserved verbatim for error reporting.
    Other(String),
}

impl From<String> for FlightStage {
    fn from(s: String) -> Self {
        match s.as_str() {
            // An empty stage in the document means the default stage.
            "" | "flight" => FlightStage::Flight,
            "pre-flight" => FlightStage::PreFlight,
            "post-flight" => FlightStage::PostFlight,
            "manual" => FlightStage::Manual,
            _ => FlightStage::Other(s),
        }
    }
}

impl From<FlightStage> for String {
    fn from(s: FlightStage) -> Self {
        s.to_string()
    }
}

impl fmt::Display for FlightStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlightStage::PreFlight => f.write_str("pre-flight"),
            FlightStage::Flight => f.write_str("flight"),
            FlightStage::PostFlight => f.write_str("post-flight"),
            FlightStage::Manual => f.write_str("manual"),
            FlightStage::Other(s) => f.write_str(s),
        }
    }
}

/// A collection of roles plus the global configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleManifest {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub configuration: Configuration,

    /// Directory of the source document; relative script paths resolve here.
    #[serde(skip)]
    pub(crate) source_dir: PathBuf,
    #[serde(skip)]
    pub(crate) roles_by_name: BTreeMap<String, usize>,
}

/// A named grouping of jobs deployed and scaled as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Role {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: RoleType,
    #[serde(default, rename = "jobs")]
    pub job_refs: Vec<JobRef>,
    #[serde(default)]
    pub environment_scripts: Vec<String>,
    #[serde(default)]
    pub scripts: Vec<String>,
    #[serde(default)]
    pub post_config_scripts: Vec<String>,
    #[serde(default)]
    pub configuration: Configuration,
    pub run: Option<RoleRun>,
    #[serde(default)]
    pub tags: Vec<String>,

    /// Jobs resolved against the release index during loading.
    #[serde(skip)]
    pub jobs: Vec<Job>,
    /// Copied from the owning manifest during loading; read-only, used
    /// solely to resolve relative script paths.
    #[serde(skip)]
    pub(crate) source_dir: PathBuf,
}

/// A job reference as written in the document, prior to resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobRef {
    pub name: String,
    pub release_name: String,
}

/// How a role should behave at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RoleRun {
    pub scaling: Option<RoleRunScaling>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub persistent_volumes: Vec<RoleRunVolume>,
    #[serde(default)]
    pub shared_volumes: Vec<RoleRunVolume>,
    #[serde(default)]
    pub memory: i64,
    #[serde(default)]
    pub virtual_cpus: i64,
    #[serde(default)]
    pub exposed_ports: Vec<RoleRunExposedPort>,
    /// Absent means the default stage; normalized to `flight` during
    /// validation.
    pub flight_stage: Option<FlightStage>,
    #[serde(rename = "healthcheck")]
    pub health_check: Option<HealthCheck>,
    /// Environment variable names; semantics depend on the role type.
    #[serde(default, rename = "env")]
    pub environment: Vec<String>,
}

/// Replica count bounds for a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleRunScaling {
    #[serde(default)]
    pub min: i32,
    #[serde(default)]
    pub max: i32,
}

/// A volume to be attached at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleRunVolume {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub size: i64,
}

/// A port made available to other roles or the outside world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleRunExposedPort {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub external: String,
    #[serde(default)]
    pub internal: String,
    #[serde(default)]
    pub public: bool,
}

/// A non-standard health check endpoint. Exactly one of `url`, `command`,
/// or `port` may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheck {
    /// URL for an HTTP GET expected to return 200..=399.
    #[serde(default)]
    pub url: String,
    /// Custom headers; only used with `url`.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Custom command argument list.
    #[serde(default)]
    pub command: Vec<String>,
    /// Port for a TCP probe.
    #[serde(default)]
    pub port: i32,
}

/// Property templates plus declared variables. Role-level configurations
/// inherit and override the global one during loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    #[serde(default)]
    pub variables: Vec<ConfigurationVariable>,
}

/// A deployment-time variable declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigurationVariable {
    pub name: String,
    #[serde(default)]
    pub default: Option<VariableDefault>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub generator: Option<VariableGenerator>,
    /// Private variables are exempt from the must-be-used check; use this
    /// for variables consumed only by scripts, never by templates.
    #[serde(default)]
    pub private: bool,
}

/// The declaration format does not fix a variable's type ahead of time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableDefault {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<VariableDefault>),
}

/// How to automatically generate a value for a variable. Opaque to this
/// crate; consumed by the configuration store writer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableGenerator {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value_type: String,
}

impl RoleManifest {
    /// Find a role by name.
    pub fn lookup_role(&self, name: &str) -> Option<&Role> {
        self.roles_by_name
            .get(name)
            .and_then(|&idx| self.roles.get(idx))
    }

    /// Select roles by name. An empty selection means every role; any
    /// unknown name is a hard failure listing all unknown names.
    pub fn select_roles(&self, names: &[String]) -> Result<Vec<&Role>, SelectError> {
        if names.is_empty() {
            return Ok(self.roles.iter().collect());
        }

        let mut selected = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            match self.lookup_role(name) {
                Some(role) => selected.push(role),
                None => unknown.push(name.clone()),
            }
        }
        if !unknown.is_empty() {
            return Err(SelectError { names: unknown });
        }
        Ok(selected)
    }

    /// Directory of the source document.
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// All declared variables, global and role-level, keyed by name.
    pub fn declared_variables(&self) -> BTreeMap<&str, &ConfigurationVariable> {
        let mut declared = BTreeMap::new();
        for cv in &self.configuration.variables {
            declared.insert(cv.name.as_str(), cv);
        }
        for role in &self.roles {
            for cv in &role.configuration.variables {
                declared.insert(cv.name.as_str(), cv);
            }
        }
        declared
    }

    pub(crate) fn build_name_index(&mut self) {
        self.roles_by_name = self
            .roles
            .iter()
            .enumerate()
            .map(|(idx, role)| (role.name.clone(), idx))
            .collect();
    }
}

impl Role {
    /// True if the role carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// True iff the role is tagged `dev-only`.
    pub fn is_dev_role(&self) -> bool {
        self.has_tag("dev-only")
    }

    /// Map from declared script reference to resolved absolute path.
    ///
    /// Absolute entries point inside the eventual container and have no
    /// local file, so they are excluded.
    pub fn script_paths(&self) -> BTreeMap<String, PathBuf> {
        let mut paths = BTreeMap::new();
        for list in [
            &self.environment_scripts,
            &self.scripts,
            &self.post_config_scripts,
        ] {
            for script in list {
                if Path::new(script).is_absolute() {
                    continue;
                }
                paths.insert(script.clone(), self.source_dir.join(script));
            }
        }
        paths
    }

    /// Overlay the role's own templates onto the global ones; role entries
    /// win on key collision. The merged mapping is stored back on the role.
    pub(crate) fn merge_templates(&mut self, global: &BTreeMap<String, String>) {
        let mut merged = global.clone();
        merged.append(&mut self.configuration.templates);
        self.configuration.templates = merged;
    }
}
