use super::{json_pretty, load, EXIT_SUCCESS};
use serde::Serialize;
use smelter_schema::role_set_version;
use std::path::Path;

#[derive(Debug, Serialize)]
struct VersionReport {
    roles: Vec<RoleVersion>,
    role_set_version: String,
}

#[derive(Debug, Serialize)]
struct RoleVersion {
    name: String,
    dev_version: String,
}

pub fn run(
    manifest: &Path,
    release_index: &Path,
    roles: &[String],
    salt: &str,
    json: bool,
) -> Result<u8, String> {
    let loaded = load(manifest, release_index).map_err(|e| e.to_string())?;
    let selected = loaded.select_roles(roles).map_err(|e| e.to_string())?;

    let mut report = VersionReport {
        roles: Vec::with_capacity(selected.len()),
        role_set_version: String::new(),
    };
    for role in &selected {
        let version = role.dev_version().map_err(|e| e.to_string())?;
        report.roles.push(RoleVersion {
            name: role.name.clone(),
            dev_version: version.into_inner(),
        });
    }
    report.role_set_version = role_set_version(&selected, salt)
        .map_err(|e| e.to_string())?
        .into_inner();

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for role in &report.roles {
            println!("{:<20} {}", role.name, role.dev_version);
        }
        println!("{:<20} {}", "role-set", report.role_set_version);
    }

    Ok(EXIT_SUCCESS)
}
