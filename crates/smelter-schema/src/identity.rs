//! Deterministic dev versions for roles, derived from everything that
//! affects their build output.
//!
//! A role's dev version feeds the build cache: identical inputs (same job
//! order, same script contents, same merged templates) must yield the same
//! signature on any machine, any run. Every place where iteration order is
//! not inherently fixed — package sets, template mappings, script paths,
//! role sets — is explicitly sorted before hashing.

use crate::manifest::Role;
use crate::release::Package;
use crate::types::DevVersion;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("failed to read script '{}': {source}", path.display())]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Role {
    /// Signature over the role's local script files: each resolved path's
    /// own text followed by its contents, in sorted path order. Absolute
    /// script entries live inside the eventual container and contribute
    /// nothing. A missing or unreadable file is a hard failure.
    pub fn script_signature(&self) -> Result<String, VersionError> {
        let mut paths: Vec<String> = self
            .script_paths()
            .into_values()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        paths.sort();

        let mut hasher = blake3::Hasher::new();
        for path in paths {
            hasher.update(path.as_bytes());
            let contents = fs::read(&path).map_err(|source| VersionError::ScriptRead {
                path: PathBuf::from(&path),
                source,
            })?;
            hasher.update(&contents);
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Signature over the role's merged template mapping: `"key: value"`
    /// lines in key order.
    pub fn template_signature(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (key, value) in &self.configuration.templates {
            hasher.update(format!("{key}: {value}").as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Aggregate signature of everything that affects the role's build
    /// output, suitable as a cache/rebuild key.
    ///
    /// Job fingerprints are taken in declared order — job order can be
    /// semantically significant (task execution order), so it is never
    /// sorted. Package fingerprints are sorted by package name so the
    /// result is independent of job iteration order. The template
    /// signature only participates when the role has any templates.
    pub fn dev_version(&self) -> Result<DevVersion, VersionError> {
        let mut signature = String::new();
        let mut packages: Vec<&Package> = Vec::new();

        for job in &self.jobs {
            signature.push('\n');
            signature.push_str(job.fingerprint.as_str());
            packages.extend(&job.packages);
        }

        packages.sort_by(|a, b| a.name.cmp(&b.name));
        for package in packages {
            signature.push('\n');
            signature.push_str(package.fingerprint.as_str());
        }

        signature.push('\n');
        signature.push_str(&self.script_signature()?);

        if !self.configuration.templates.is_empty() {
            signature.push('\n');
            signature.push_str(&self.template_signature());
        }

        Ok(DevVersion::new(
            blake3::hash(signature.as_bytes()).to_hex().to_string(),
        ))
    }
}

/// Fingerprint a whole set of roles with one value: the salt, then each
/// role's dev version, with roles sorted by name so the caller's selection
/// order does not leak into the result.
pub fn role_set_version(roles: &[&Role], salt: &str) -> Result<DevVersion, VersionError> {
    let mut sorted = roles.to_vec();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    for role in sorted {
        hasher.update(role.dev_version()?.as_bytes());
    }
    Ok(DevVersion::new(hasher.finalize().to_hex().to_string()))
}
