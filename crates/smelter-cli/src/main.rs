mod commands;

use clap::{Parser, Subcommand};
use commands::{EXIT_FAILURE, EXIT_MANIFEST_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "smelter",
    version,
    about = "Role manifest validation and deterministic versioning for release-based images"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load and validate a role manifest against a release index.
    Validate {
        /// Path to the role manifest YAML file.
        manifest: PathBuf,
        /// Path to the resolved release index YAML file.
        #[arg(long)]
        release_index: PathBuf,
    },
    /// List the roles of a validated manifest.
    ListRoles {
        /// Path to the role manifest YAML file.
        manifest: PathBuf,
        /// Path to the resolved release index YAML file.
        #[arg(long)]
        release_index: PathBuf,
        /// Only list roles tagged dev-only.
        #[arg(long, default_value_t = false)]
        dev_only: bool,
    },
    /// Print per-role dev versions and the role-set version.
    Versions {
        /// Path to the role manifest YAML file.
        manifest: PathBuf,
        /// Path to the resolved release index YAML file.
        #[arg(long)]
        release_index: PathBuf,
        /// Roles to select; empty selects every role.
        roles: Vec<String>,
        /// Extra salt mixed into the role-set version.
        #[arg(long, default_value = "")]
        salt: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SMELTER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Validate {
            manifest,
            release_index,
        } => commands::validate::run(&manifest, &release_index, json_output),
        Commands::ListRoles {
            manifest,
            release_index,
            dev_only,
        } => commands::list_roles::run(&manifest, &release_index, dev_only, json_output),
        Commands::Versions {
            manifest,
            release_index,
            roles,
            salt,
        } => commands::versions::run(&manifest, &release_index, &roles, &salt, json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("failed to read role manifest")
                || msg.starts_with("failed to parse role manifest")
                || msg.starts_with("role manifest validation failed")
                || msg.starts_with("failed to read release index")
                || msg.starts_with("failed to parse release index")
            {
                EXIT_MANIFEST_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
