//! The validation engine.
//!
//! Every pass walks the loaded graph and returns its findings as an
//! [`IssueList`]; nothing stops at the first problem. The loader concatenates
//! the lists from all passes so a manifest author sees the complete set of
//! problems in one report. The only short-circuit is a role without a `run`
//! section, which suppresses the remaining run checks for that role.
//!
//! Templates that cannot be parsed are skipped by the usage and constant
//! passes: their variable references cannot be determined, and reporting
//! them here would duplicate what template rendering reports downstream.

use crate::manifest::{ConfigurationVariable, Role, RoleManifest, RoleRun, RoleType};
use crate::template::extract_variables;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Variables the container entrypoint injects at runtime. Templates may
/// reference these without a declaration in the manifest.
const IMPLICIT_VARIABLES: [&str; 2] = ["IP_ADDRESS", "DNS_RECORD_NAME"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Invalid,
    Required,
    NotFound,
    Forbidden,
}

/// A single structured finding: field path, offending value, message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub field: String,
    pub value: String,
    pub message: String,
}

impl Issue {
    pub fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: IssueKind::Invalid,
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn required(field: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Required,
            field: field.into(),
            value: String::new(),
            message: String::new(),
        }
    }

    pub fn not_found(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::NotFound,
            field: field.into(),
            value: String::new(),
            message: message.into(),
        }
    }

    pub fn forbidden(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Forbidden,
            field: field.into(),
            value: String::new(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IssueKind::Invalid => {
                write!(f, "{}: invalid value '{}': {}", self.field, self.value, self.message)
            }
            IssueKind::Required => write!(f, "{}: required value was not provided", self.field),
            IssueKind::NotFound => write!(f, "{}: {}", self.field, self.message),
            IssueKind::Forbidden => write!(f, "{}: forbidden: {}", self.field, self.message),
        }
    }
}

/// Accumulator threaded through the validation passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IssueList(Vec<Issue>);

impl IssueList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        self.0.push(issue);
    }

    pub fn append(&mut self, mut other: IssueList) {
        self.0.append(&mut other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Issue> {
        self.0.iter()
    }
}

impl From<Issue> for IssueList {
    fn from(issue: Issue) -> Self {
        Self(vec![issue])
    }
}

impl IntoIterator for IssueList {
    type Item = Issue;
    type IntoIter = std::vec::IntoIter<Issue>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a IssueList {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for IssueList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Report declared variables that are out of lexicographic order. Reports
/// every offending adjacent pair; nothing is reordered silently.
pub(crate) fn validate_variable_sorting(variables: &[ConfigurationVariable]) -> IssueList {
    let mut issues = IssueList::new();

    let mut previous = "";
    for cv in variables {
        if cv.name.as_str() < previous {
            issues.push(Issue::invalid(
                "configuration.variables",
                previous,
                format!("does not sort before '{}'", cv.name),
            ));
        }
        previous = &cv.name;
    }

    issues
}

/// Report declared variables no template uses. Private variables are
/// exempt; they exist for scripts, not templates.
pub(crate) fn validate_variable_usage(manifest: &RoleManifest) -> IssueList {
    let mut issues = IssueList::new();

    let mut unused = manifest.declared_variables();
    if unused.is_empty() {
        return issues;
    }

    // Scan every per-property template of every role, then the global
    // templates, dropping each referenced variable from the unused set.
    // Once the set drains there is nothing left to report.
    for role in &manifest.roles {
        for job in &role.jobs {
            for property in &job.properties {
                let key = format!("properties.{}", property.name);
                let Some(template) = role.configuration.templates.get(&key) else {
                    continue;
                };
                let Ok(vars) = extract_variables(template) else {
                    debug!("skipping malformed template '{key}' in role '{}'", role.name);
                    continue;
                };
                for name in vars {
                    unused.remove(name.as_str());
                    if unused.is_empty() {
                        return issues;
                    }
                }
            }
        }
    }

    for template in manifest.configuration.templates.values() {
        let Ok(vars) = extract_variables(template) else {
            continue;
        };
        for name in vars {
            unused.remove(name.as_str());
            if unused.is_empty() {
                return issues;
            }
        }
    }

    for (name, cv) in unused {
        if cv.private {
            continue;
        }
        issues.push(Issue::not_found(
            "configuration.variables",
            format!("no templates using '{name}'"),
        ));
    }

    issues
}

/// Report template references to undeclared variables. Each distinct name
/// is reported once per manifest, however many templates reference it.
pub(crate) fn validate_template_usage(manifest: &RoleManifest) -> IssueList {
    let mut issues = IssueList::new();

    let mut declared: BTreeSet<String> = manifest
        .declared_variables()
        .keys()
        .map(|name| (*name).to_owned())
        .collect();
    for name in IMPLICIT_VARIABLES {
        declared.insert(name.to_owned());
    }

    for role in &manifest.roles {
        for job in &role.jobs {
            for property in &job.properties {
                let key = format!("properties.{}", property.name);
                let Some(template) = role.configuration.templates.get(&key) else {
                    continue;
                };
                let Ok(vars) = extract_variables(template) else {
                    continue;
                };
                for name in vars {
                    if declared.contains(&name) {
                        continue;
                    }
                    issues.push(Issue::not_found(
                        "configuration.variables",
                        format!("no declaration of variable '{name}'"),
                    ));
                    // One report per name is enough.
                    declared.insert(name);
                }
            }
        }
    }

    for template in manifest.configuration.templates.values() {
        let Ok(vars) = extract_variables(template) else {
            continue;
        };
        for name in vars {
            if declared.contains(&name) {
                continue;
            }
            issues.push(Issue::not_found(
                "configuration.templates",
                format!("no variable declaration of '{name}'"),
            ));
            declared.insert(name);
        }
    }

    issues
}

/// Report global templates that reference no variable at all. Constants
/// belong in the opinions layer, not the manifest.
pub(crate) fn validate_non_templates(manifest: &RoleManifest) -> IssueList {
    let mut issues = IssueList::new();

    for (property, template) in &manifest.configuration.templates {
        let Ok(vars) = extract_variables(template) else {
            continue;
        };
        if vars.is_empty() {
            issues.push(Issue::invalid(
                "configuration.templates",
                template,
                format!("using '{property}' as a constant"),
            ));
        }
    }

    issues
}

/// Validate a role's `run` section and normalize its flight stage.
///
/// Runs for every role in the document, including roles that are filtered
/// out of the final list afterwards.
pub(crate) fn validate_role_run(role: &mut Role, declared: &BTreeSet<String>) -> IssueList {
    let mut issues = IssueList::new();

    let role_name = role.name.clone();
    let is_docker = role.kind == RoleType::Docker;

    let Some(run) = role.run.as_mut() else {
        issues.push(Issue::required(format!("roles[{role_name}].run")));
        return issues;
    };

    issues.append(normalize_flight_stage(run, &role_name));
    issues.append(validate_health_check(run, &role_name));
    issues.append(validate_non_negative(
        run.memory,
        format!("roles[{role_name}].run.memory"),
    ));
    issues.append(validate_non_negative(
        run.virtual_cpus,
        format!("roles[{role_name}].run.virtual-cpus"),
    ));

    for port in &run.exposed_ports {
        if port.name.is_empty() {
            issues.push(Issue::required(format!(
                "roles[{role_name}].run.exposed-ports.name"
            )));
        }
        issues.append(validate_port_range(
            &port.external,
            format!("roles[{role_name}].run.exposed-ports[{}].external", port.name),
        ));
        issues.append(validate_port_range(
            &port.internal,
            format!("roles[{role_name}].run.exposed-ports[{}].internal", port.name),
        ));
        issues.append(validate_protocol(
            &port.protocol,
            format!("roles[{role_name}].run.exposed-ports[{}].protocol", port.name),
        ));
    }

    if run.environment.is_empty() {
        return issues;
    }

    if is_docker {
        // Docker roles receive their environment directly; every name must
        // resolve to a declared variable.
        for var in &run.environment {
            if declared.contains(var) {
                continue;
            }
            issues.push(Issue::not_found(
                format!("roles[{role_name}].run.env"),
                format!("no declaration of variable '{var}'"),
            ));
        }
    } else {
        issues.push(Issue::forbidden(
            format!("roles[{role_name}].run.env"),
            "non-docker role must not declare environment variables",
        ));
    }

    issues
}

/// Absent stage becomes the default `flight`; unrecognized values are
/// reported and left untouched.
fn normalize_flight_stage(run: &mut RoleRun, role_name: &str) -> IssueList {
    use crate::manifest::FlightStage;

    match &run.flight_stage {
        None => {
            run.flight_stage = Some(FlightStage::Flight);
            IssueList::new()
        }
        Some(FlightStage::Other(value)) => Issue::invalid(
            format!("roles[{role_name}].run.flight-stage"),
            value,
            "expected one of flight, manual, post-flight, or pre-flight",
        )
        .into(),
        Some(_) => IssueList::new(),
    }
}

fn validate_health_check(run: &RoleRun, role_name: &str) -> IssueList {
    let Some(check) = &run.health_check else {
        return IssueList::new();
    };

    let mut mechanisms = Vec::with_capacity(3);
    if !check.url.is_empty() {
        mechanisms.push("url");
    }
    if !check.command.is_empty() {
        mechanisms.push("command");
    }
    if check.port != 0 {
        mechanisms.push("port");
    }

    if mechanisms.len() == 1 {
        IssueList::new()
    } else {
        Issue::invalid(
            format!("roles[{role_name}].run.healthcheck"),
            mechanisms.join(", "),
            "expected exactly one of url, command, or port",
        )
        .into()
    }
}

fn validate_non_negative(value: i64, field: String) -> IssueList {
    if value < 0 {
        Issue::invalid(field, value.to_string(), "must be greater than or equal to 0").into()
    } else {
        IssueList::new()
    }
}

/// Accepts a single port (`80`) or an ascending range (`8000-9000`), each
/// end within 1..=65535.
fn validate_port_range(value: &str, field: String) -> IssueList {
    fn parse_port(s: &str) -> Option<u32> {
        s.parse::<u32>().ok().filter(|p| (1..=65535).contains(p))
    }

    if value.is_empty() {
        return Issue::invalid(field, value, "port range must not be empty").into();
    }

    let (low, high) = value.split_once('-').unwrap_or((value, value));
    let (Some(low), Some(high)) = (parse_port(low), parse_port(high)) else {
        return Issue::invalid(field, value, "ports must be integers between 1 and 65535").into();
    };
    if low > high {
        return Issue::invalid(field, value, "port range must be ascending").into();
    }

    IssueList::new()
}

fn validate_protocol(value: &str, field: String) -> IssueList {
    match value {
        "tcp" | "udp" => IssueList::new(),
        _ => Issue::invalid(field, value, "expected one of tcp or udp").into(),
    }
}
