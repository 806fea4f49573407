use super::{json_pretty, load, EXIT_SUCCESS};
use serde::Serialize;
use smelter_schema::Role;
use std::path::Path;

#[derive(Debug, Serialize)]
struct RoleRow {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    stage: String,
    jobs: usize,
    tags: Vec<String>,
}

impl RoleRow {
    fn from_role(role: &Role) -> Self {
        let stage = role
            .run
            .as_ref()
            .and_then(|run| run.flight_stage.clone())
            .map(|stage| stage.to_string())
            .unwrap_or_default();
        Self {
            name: role.name.clone(),
            kind: role.kind.to_string(),
            stage,
            jobs: role.jobs.len(),
            tags: role.tags.clone(),
        }
    }
}

pub fn run(manifest: &Path, release_index: &Path, dev_only: bool, json: bool) -> Result<u8, String> {
    let loaded = load(manifest, release_index).map_err(|e| e.to_string())?;

    let rows: Vec<RoleRow> = loaded
        .roles
        .iter()
        .filter(|role| !dev_only || role.is_dev_role())
        .map(RoleRow::from_role)
        .collect();

    if json {
        println!("{}", json_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("no roles found");
    } else {
        println!("{:<20} {:<10} {:<12} {:>4} TAGS", "NAME", "TYPE", "STAGE", "JOBS");
        for row in &rows {
            println!(
                "{:<20} {:<10} {:<12} {:>4} {}",
                row.name,
                row.kind,
                row.stage,
                row.jobs,
                row.tags.join(",")
            );
        }
    }

    Ok(EXIT_SUCCESS)
}
