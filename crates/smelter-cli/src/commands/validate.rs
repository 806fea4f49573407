use super::{json_pretty, load, EXIT_MANIFEST_ERROR, EXIT_SUCCESS};
use smelter_schema::LoadError;
use std::path::Path;

pub fn run(manifest: &Path, release_index: &Path, json: bool) -> Result<u8, String> {
    match load(manifest, release_index) {
        Ok(loaded) => {
            if json {
                let summary = serde_json::json!({
                    "ok": true,
                    "roles": loaded.roles.len(),
                });
                println!("{}", json_pretty(&summary)?);
            } else {
                println!("manifest OK: {} roles", loaded.roles.len());
            }
            Ok(EXIT_SUCCESS)
        }
        // Findings are a report of their own, not a usage error; print the
        // full list so the author can fix everything in one pass.
        Err(LoadError::Validation(issues)) => {
            if json {
                println!("{}", json_pretty(&issues)?);
            } else {
                for issue in &issues {
                    println!("{issue}");
                }
                println!("{} problems found", issues.len());
            }
            Ok(EXIT_MANIFEST_ERROR)
        }
        Err(other) => Err(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r"
releases:
  - name: demo
    jobs:
      - name: server
        fingerprint: aa11
";

    const OK_MANIFEST: &str = r"
roles:
  - name: web
    jobs:
      - name: server
        release_name: demo
    run: {}
";

    fn write_fixtures(manifest: &str) -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf)
    {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("roles.yml");
        let index_path = dir.path().join("index.yml");
        std::fs::write(&manifest_path, manifest).unwrap();
        std::fs::write(&index_path, INDEX).unwrap();
        (dir, manifest_path, index_path)
    }

    #[test]
    fn valid_manifest_exits_zero() {
        let (_dir, manifest, index) = write_fixtures(OK_MANIFEST);
        assert_eq!(run(&manifest, &index, false), Ok(EXIT_SUCCESS));
    }

    #[test]
    fn validation_findings_exit_with_manifest_error() {
        let broken = OK_MANIFEST.replace("run: {}", "run:\n      memory: -1");
        let (_dir, manifest, index) = write_fixtures(&broken);
        assert_eq!(run(&manifest, &index, false), Ok(EXIT_MANIFEST_ERROR));
    }

    #[test]
    fn missing_manifest_file_is_an_error() {
        let (_dir, manifest, index) = write_fixtures(OK_MANIFEST);
        let missing = manifest.with_file_name("nope.yml");
        let err = run(&missing, &index, false).expect_err("missing file must fail");
        assert!(err.starts_with("failed to read role manifest"));
    }
}
