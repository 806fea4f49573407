//! Loading and resolution of role manifests.
//!
//! `load_role_manifest` takes the manifest document and the already-loaded
//! releases, resolves every job reference, merges role configuration over the
//! global one, and runs the validation passes. Validation findings from all
//! passes are aggregated into a single failure; a manifest with any finding
//! is never returned partially.

use crate::manifest::{RoleManifest, RoleType};
use crate::release::{JobLookupError, Release, ReleaseIndex, ReleaseIndexError};
use crate::validation::{self, Issue, IssueList};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read role manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse role manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    ReleaseIndex(#[from] ReleaseIndexError),
    #[error("role manifest validation failed:\n{0}")]
    Validation(IssueList),
}

/// Load a role manifest from disk and resolve it against the given releases.
pub fn load_role_manifest(
    path: impl AsRef<Path>,
    releases: &[Release],
) -> Result<RoleManifest, LoadError> {
    let path = path.as_ref();
    let document = fs::read_to_string(path)?;
    let source_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    load_role_manifest_str(&document, source_dir, releases)
}

/// Load a role manifest from an in-memory document. `source_dir` is the
/// directory relative script paths resolve against.
pub fn load_role_manifest_str(
    document: &str,
    source_dir: impl Into<PathBuf>,
    releases: &[Release],
) -> Result<RoleManifest, LoadError> {
    // Duplicate release names are a hard failure before any role processing.
    let index = ReleaseIndex::new(releases.iter().cloned())?;

    let mut manifest: RoleManifest = serde_yaml::from_str(document)?;
    manifest.source_dir = source_dir.into();

    // The docker env policy needs the declared names before any role is
    // filtered out, so declarations on soon-to-be-dropped roles count here.
    let declared: BTreeSet<String> = manifest
        .declared_variables()
        .keys()
        .map(|name| (*name).to_owned())
        .collect();

    let mut issues = IssueList::new();

    // Every role goes through run validation, including docker roles that
    // are dropped below and roles with an unrecognized type.
    let mut seen_names = BTreeSet::new();
    for role in &mut manifest.roles {
        if !seen_names.insert(role.name.clone()) {
            issues.push(Issue::invalid(
                format!("roles[{}].name", role.name),
                role.name.clone(),
                "role name is used more than once",
            ));
        }
        if let RoleType::Other(value) = &role.kind {
            issues.push(Issue::invalid(
                format!("roles[{}].type", role.name),
                value.clone(),
                "expected one of bosh, bosh-task, or docker",
            ));
        }
        issues.append(validation::validate_role_run(role, &declared));
    }

    // Only bosh and bosh-task roles survive into the final list.
    let roles = std::mem::take(&mut manifest.roles);
    manifest.roles = roles
        .into_iter()
        .filter(|role| !matches!(role.kind, RoleType::Docker))
        .collect();

    // Resolve job references and overlay role templates onto the global
    // ones. A reference that cannot be resolved is one finding; resolution
    // continues with the remaining jobs.
    let source_dir = manifest.source_dir.clone();
    let global_templates = manifest.configuration.templates.clone();
    for role in &mut manifest.roles {
        role.source_dir = source_dir.clone();

        let mut resolved = Vec::with_capacity(role.job_refs.len());
        for job_ref in &role.job_refs {
            let field = format!("roles[{}].jobs[{}]", role.name, job_ref.name);
            match index.lookup_job(&job_ref.release_name, &job_ref.name) {
                Ok(job) => resolved.push(job.clone()),
                Err(JobLookupError::UnknownRelease(_)) => {
                    issues.push(Issue::invalid(
                        field,
                        job_ref.release_name.clone(),
                        "referenced release is not loaded",
                    ));
                }
                Err(err) => {
                    issues.push(Issue::invalid(
                        field,
                        job_ref.release_name.clone(),
                        err.to_string(),
                    ));
                }
            }
        }
        role.jobs = resolved;

        role.merge_templates(&global_templates);
    }

    issues.append(validation::validate_variable_sorting(
        &manifest.configuration.variables,
    ));
    issues.append(validation::validate_variable_usage(&manifest));
    issues.append(validation::validate_template_usage(&manifest));
    issues.append(validation::validate_non_templates(&manifest));

    if !issues.is_empty() {
        return Err(LoadError::Validation(issues));
    }

    manifest.build_name_index();
    debug!(
        "loaded role manifest: {} roles resolved against {} releases",
        manifest.roles.len(),
        releases.len()
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FlightStage;
    use crate::release::{Job, JobProperty, Package};
    use crate::types::Fingerprint;
    use crate::validation::IssueKind;

    fn releases() -> Vec<Release> {
        vec![Release {
            name: "demo".to_owned(),
            jobs: vec![Job {
                name: "server".to_owned(),
                fingerprint: Fingerprint::new("job-fp"),
                properties: vec![JobProperty {
                    name: "port".to_owned(),
                }],
                packages: vec![Package {
                    name: "runtime".to_owned(),
                    fingerprint: Fingerprint::new("pkg-fp"),
                }],
            }],
        }]
    }

    fn load(document: &str) -> Result<RoleManifest, LoadError> {
        load_role_manifest_str(document, "/work/manifests", &releases())
    }

    fn validation_issues(result: Result<RoleManifest, LoadError>) -> IssueList {
        match result {
            Err(LoadError::Validation(issues)) => issues,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    const OK_MANIFEST: &str = r#"
roles:
  - name: web
    jobs:
      - name: server
        release_name: demo
    run:
      memory: 128
      virtual-cpus: 1
configuration:
  templates:
    properties.port: '{{HTTP_PORT}}'
  variables:
    - name: HTTP_PORT
      description: Port the web role listens on.
"#;

    #[test]
    fn loads_a_valid_manifest() {
        let manifest = load(OK_MANIFEST).expect("should load");

        let role = manifest.lookup_role("web").expect("role exists");
        assert_eq!(role.jobs.len(), 1);
        assert_eq!(role.jobs[0].fingerprint, "job-fp");
        assert_eq!(
            role.run.as_ref().unwrap().flight_stage,
            Some(FlightStage::Flight),
            "absent flight stage normalizes to flight"
        );
        assert_eq!(
            role.configuration.templates["properties.port"],
            "{{HTTP_PORT}}",
            "global templates are merged onto the role"
        );
        assert_eq!(manifest.source_dir(), Path::new("/work/manifests"));
    }

    #[test]
    fn duplicate_release_names_fail_before_any_validation() {
        let mut doubled = releases();
        doubled.extend(releases());
        let err = load_role_manifest_str(OK_MANIFEST, "/work", &doubled)
            .expect_err("duplicate releases must fail");
        assert!(matches!(
            err,
            LoadError::ReleaseIndex(ReleaseIndexError::DuplicateRelease(name)) if name == "demo"
        ));
    }

    #[test]
    fn unparseable_document_is_a_hard_failure() {
        assert!(matches!(
            load("roles: [not a role]"),
            Err(LoadError::Parse(_))
        ));
    }

    #[test]
    fn unsorted_variables_report_the_offending_pair() {
        let doc = r#"
roles:
  - name: web
    jobs:
      - name: server
        release_name: demo
    run: {}
configuration:
  templates:
    properties.port: '{{A}} {{B}}'
  variables:
    - name: B
    - name: A
"#;
        let issues = validation_issues(load(doc));
        assert_eq!(issues.len(), 1);
        let issue = issues.iter().next().unwrap();
        assert_eq!(issue.kind, IssueKind::Invalid);
        assert_eq!(issue.field, "configuration.variables");
        assert_eq!(issue.value, "B");
        assert!(issue.message.contains("does not sort before 'A'"));
    }

    #[test]
    fn unused_variable_is_reported_until_marked_private() {
        let doc = r#"
roles:
  - name: web
    jobs:
      - name: server
        release_name: demo
    run: {}
configuration:
  templates:
    properties.port: '{{A}}'
  variables:
    - name: A
    - name: B
"#;
        let issues = validation_issues(load(doc));
        assert_eq!(issues.len(), 1);
        let issue = issues.iter().next().unwrap();
        assert_eq!(issue.kind, IssueKind::NotFound);
        assert!(issue.message.contains("no templates using 'B'"));

        let private = doc.replace("- name: B", "- name: B\n      private: true");
        assert!(load(&private).is_ok(), "private variables are exempt");
    }

    #[test]
    fn undeclared_reference_is_reported_once_builtins_exempt() {
        let doc = r#"
roles:
  - name: web
    jobs:
      - name: server
        release_name: demo
    run: {}
configuration:
  templates:
    properties.port: '{{UNDECLARED}} {{IP_ADDRESS}}'
    properties.dns: '{{UNDECLARED}} {{DNS_RECORD_NAME}}'
"#;
        let issues = validation_issues(load(doc));
        assert_eq!(issues.len(), 1, "one report per undeclared name: {issues}");
        let issue = issues.iter().next().unwrap();
        assert_eq!(issue.kind, IssueKind::NotFound);
        assert!(issue.message.contains("'UNDECLARED'"));
    }

    #[test]
    fn health_check_requires_exactly_one_mechanism() {
        let base = r#"
roles:
  - name: web
    jobs:
      - name: server
        release_name: demo
    run:
      healthcheck:
        HEALTHCHECK
"#;
        let conflicting = base.replace(
            "HEALTHCHECK",
            "url: http://localhost/health\n        command: [curl, localhost]",
        );
        let issues = validation_issues(load(&conflicting));
        assert_eq!(issues.len(), 1);
        let issue = issues.iter().next().unwrap();
        assert_eq!(issue.field, "roles[web].run.healthcheck");
        assert_eq!(issue.value, "url, command");

        let empty = base.replace("HEALTHCHECK", "headers: {}");
        let issues = validation_issues(load(&empty));
        assert_eq!(issues.iter().next().unwrap().value, "");

        let port_only = base.replace("HEALTHCHECK", "port: 8080");
        assert!(load(&port_only).is_ok());
    }

    #[test]
    fn docker_role_env_must_resolve_to_declared_variables() {
        let doc = r#"
roles:
  - name: console
    type: docker
    run:
      env:
        - CONSOLE_PASSWORD
configuration:
  variables:
    - name: CONSOLE_PASSWORD
      private: true
"#;
        let manifest = load(doc).expect("declared env vars are fine");
        assert!(
            manifest.roles.is_empty(),
            "docker roles are dropped from the final list"
        );

        let undeclared = doc.replace("- name: CONSOLE_PASSWORD\n      private: true", "[]");
        let issues = validation_issues(load(&undeclared));
        assert_eq!(issues.len(), 1);
        let issue = issues.iter().next().unwrap();
        assert_eq!(issue.field, "roles[console].run.env");
        assert!(issue.message.contains("'CONSOLE_PASSWORD'"));
    }

    #[test]
    fn non_docker_role_must_not_declare_env() {
        let doc = r#"
roles:
  - name: web
    jobs:
      - name: server
        release_name: demo
    run:
      env:
        - HTTP_PORT
configuration:
  variables:
    - name: HTTP_PORT
      private: true
"#;
        let issues = validation_issues(load(doc));
        assert_eq!(issues.len(), 1);
        let issue = issues.iter().next().unwrap();
        assert_eq!(issue.kind, IssueKind::Forbidden);
        assert_eq!(issue.field, "roles[web].run.env");
    }

    #[test]
    fn docker_role_is_validated_before_being_dropped() {
        let doc = r"
roles:
  - name: console
    type: docker
";
        let issues = validation_issues(load(doc));
        assert_eq!(issues.len(), 1);
        let issue = issues.iter().next().unwrap();
        assert_eq!(issue.kind, IssueKind::Required);
        assert_eq!(issue.field, "roles[console].run");
    }

    #[test]
    fn unknown_role_type_is_reported() {
        let doc = r"
roles:
  - name: web
    type: vm
    run: {}
";
        let issues = validation_issues(load(doc));
        assert_eq!(issues.len(), 1);
        let issue = issues.iter().next().unwrap();
        assert_eq!(issue.field, "roles[web].type");
        assert_eq!(issue.value, "vm");
    }

    #[test]
    fn duplicate_role_names_are_reported() {
        let doc = r"
roles:
  - name: web
    run: {}
  - name: web
    run: {}
";
        let issues = validation_issues(load(doc));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues.iter().next().unwrap().field, "roles[web].name");
    }

    #[test]
    fn unresolvable_jobs_are_reported_per_occurrence() {
        let doc = r"
roles:
  - name: web
    jobs:
      - name: server
        release_name: nope
      - name: ghost
        release_name: demo
      - name: server
        release_name: demo
    run: {}
";
        let issues = validation_issues(load(doc));
        assert_eq!(issues.len(), 2, "resolution continues past failures");
        let messages: Vec<String> = issues.iter().map(ToString::to_string).collect();
        assert!(messages[0].contains("referenced release is not loaded"));
        assert!(messages[1].contains("job 'ghost' not found in release 'demo'"));
    }

    #[test]
    fn constant_global_template_is_reported() {
        let doc = r"
roles:
  - name: web
    jobs:
      - name: server
        release_name: demo
    run: {}
configuration:
  templates:
    properties.motd: welcome
";
        let issues = validation_issues(load(doc));
        assert_eq!(issues.len(), 1);
        let issue = issues.iter().next().unwrap();
        assert_eq!(issue.field, "configuration.templates");
        assert!(issue.message.contains("'properties.motd' as a constant"));
    }

    #[test]
    fn findings_from_independent_passes_accumulate() {
        let doc = r#"
roles:
  - name: web
    jobs:
      - name: server
        release_name: demo
    run:
      memory: -5
      flight-stage: hover
      exposed-ports:
        - protocol: icmp
          external: "80"
          internal: "8080"
configuration:
  templates:
    properties.motd: welcome
"#;
        let issues = validation_issues(load(doc));
        let rendered = issues.to_string();
        assert!(rendered.contains("roles[web].run.flight-stage"));
        assert!(rendered.contains("roles[web].run.memory"));
        assert!(rendered.contains("roles[web].run.exposed-ports.name"));
        assert!(rendered.contains("roles[web].run.exposed-ports[].protocol"));
        assert!(rendered.contains("'properties.motd' as a constant"));
        assert_eq!(issues.len(), 5);
    }

    #[test]
    fn malformed_templates_are_skipped_by_usage_analysis() {
        let doc = r#"
roles:
  - name: web
    jobs:
      - name: server
        release_name: demo
    run: {}
configuration:
  templates:
    properties.port: '{{BROKEN'
    properties.other: '{{A}}'
  variables:
    - name: A
"#;
        // The malformed template cannot be analyzed; the declared variable
        // is still satisfied by the well-formed one.
        assert!(load(doc).is_ok());
    }
}
