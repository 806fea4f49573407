//! Read-only view of already-loaded releases.
//!
//! Release archive parsing happens upstream; this module only models the
//! resolved result the loader needs: release name to job lookup, with content
//! fingerprints for jobs and their package dependencies. The types are
//! serde-serializable so an externally resolved index can be handed over as a
//! YAML document.

use crate::types::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReleaseIndexError {
    #[error("failed to read release index: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse release index: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("release '{0}' has been loaded more than once")]
    DuplicateRelease(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobLookupError {
    #[error("release '{0}' is not loaded")]
    UnknownRelease(String),
    #[error("job '{job}' not found in release '{release}'")]
    UnknownJob { release: String, job: String },
}

/// A build artifact a job depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub fingerprint: Fingerprint,
}

/// A configurable property exposed by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProperty {
    pub name: String,
}

/// A unit of software behavior from a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub properties: Vec<JobProperty>,
    #[serde(default)]
    pub packages: Vec<Package>,
}

/// A named collection of jobs, resolved upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl Release {
    pub fn lookup_job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

/// Release name to release lookup, with duplicate names rejected up front.
#[derive(Debug, Clone, Default)]
pub struct ReleaseIndex {
    releases: BTreeMap<String, Release>,
}

impl ReleaseIndex {
    pub fn new(releases: impl IntoIterator<Item = Release>) -> Result<Self, ReleaseIndexError> {
        let mut map = BTreeMap::new();
        for release in releases {
            if map.contains_key(&release.name) {
                return Err(ReleaseIndexError::DuplicateRelease(release.name));
            }
            map.insert(release.name.clone(), release);
        }
        Ok(Self { releases: map })
    }

    pub fn get(&self, name: &str) -> Option<&Release> {
        self.releases.get(name)
    }

    pub fn lookup_job(&self, release_name: &str, job_name: &str) -> Result<&Job, JobLookupError> {
        let release = self
            .get(release_name)
            .ok_or_else(|| JobLookupError::UnknownRelease(release_name.to_owned()))?;
        release
            .lookup_job(job_name)
            .ok_or_else(|| JobLookupError::UnknownJob {
                release: release_name.to_owned(),
                job: job_name.to_owned(),
            })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ReleaseIndexDocument {
    releases: Vec<Release>,
}

/// Parse a resolved release index document.
pub fn parse_release_index_str(input: &str) -> Result<Vec<Release>, ReleaseIndexError> {
    let doc: ReleaseIndexDocument = serde_yaml::from_str(input)?;
    Ok(doc.releases)
}

/// Read and parse a resolved release index document from disk.
pub fn load_release_index(path: impl AsRef<Path>) -> Result<Vec<Release>, ReleaseIndexError> {
    let content = fs::read_to_string(path)?;
    parse_release_index_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_release(name: &str) -> Release {
        Release {
            name: name.to_owned(),
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
        }
    }

    #[test]
    fn duplicate_release_names_are_rejected() {
        let err = ReleaseIndex::new(vec![demo_release("demo"), demo_release("demo")])
            .expect_err("duplicate must fail");
        assert!(matches!(err, ReleaseIndexError::DuplicateRelease(name) if name == "demo"));
    }

    #[test]
    fn lookup_job_resolves_through_the_index() {
        let index = ReleaseIndex::new(vec![demo_release("demo")]).unwrap();
        let job = index.lookup_job("demo", "server").unwrap();
        assert_eq!(job.fingerprint, "job-fp");
        assert_eq!(job.packages[0].name, "runtime");
    }

    #[test]
    fn unknown_release_and_job_are_distinct_errors() {
        let index = ReleaseIndex::new(vec![demo_release("demo")]).unwrap();
        assert_eq!(
            index.lookup_job("missing", "server"),
            Err(JobLookupError::UnknownRelease("missing".to_owned())),
        );
        assert_eq!(
            index.lookup_job("demo", "missing"),
            Err(JobLookupError::UnknownJob {
                release: "demo".to_owned(),
                job: "missing".to_owned(),
            }),
        );
    }

    #[test]
    fn parses_release_index_document() {
        let input = r#"
releases:
  - name: demo
    jobs:
      - name: server
        fingerprint: aa11
        properties:
          - name: port
        packages:
          - name: runtime
            fingerprint: bb22
"#;
        let releases = parse_release_index_str(input).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].jobs[0].fingerprint, "aa11");
        assert_eq!(releases[0].jobs[0].properties[0].name, "port");
    }
}
