pub mod list_roles;
pub mod validate;
pub mod versions;

use smelter_schema::{load_release_index, load_role_manifest, LoadError, RoleManifest};
use std::path::Path;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Load the release index, then the manifest resolved against it.
pub fn load(manifest: &Path, release_index: &Path) -> Result<RoleManifest, LoadError> {
    let releases = load_release_index(release_index)?;
    load_role_manifest(manifest, &releases)
}
