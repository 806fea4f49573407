//! Role manifest resolution, validation, and dev-version hashing for smelter.
//!
//! This crate defines the model layer: YAML role-manifest parsing
//! (`RoleManifest` and friends), resolution against already-loaded releases
//! (`loader`), accumulated cross-reference validation (`validation`),
//! mustache-style template variable extraction (`template`), and the
//! deterministic role signatures used as build/cache keys (`identity`).

pub mod identity;
pub mod loader;
pub mod manifest;
pub mod release;
pub mod template;
pub mod types;
pub mod validation;

pub use identity::{role_set_version, VersionError};
pub use loader::{load_role_manifest, load_role_manifest_str, LoadError};
pub use manifest::{
    Configuration, ConfigurationVariable, FlightStage, HealthCheck, JobRef, Role, RoleManifest,
    RoleRun, RoleRunExposedPort, RoleRunScaling, RoleRunVolume, RoleType, SelectError,
    VariableDefault, VariableGenerator,
};
pub use release::{
    load_release_index, parse_release_index_str, Job, JobLookupError, JobProperty, Package,
    Release, ReleaseIndex, ReleaseIndexError,
};
pub use template::{extract_variables, TemplateError};
pub use types::{DevVersion, Fingerprint};
pub use validation::{Issue, IssueKind, IssueList};
