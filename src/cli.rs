//! Command-line argument parsing (§6, §10.4).
//!
//! Deep design investment here is explicitly out of scope (§1c) — this is a thin flat parser,
//! not a subcommand tree, matching the flags the original Python entrypoint exposed. It is
//! structured so a future subcommand could be added without reshaping `Cli` itself.

use std::path::PathBuf;

use clap::Parser;

use crate::config::ConfigFile;

#[derive(Parser, Debug, Clone)]
#[command(name = "cableclub", about = "Pokemon cable club matchmaking server")]
pub struct Cli {
    /// Optional configuration file (JSON or TOML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// The host IP address the core server listens on.
    #[arg(long)]
    pub host: Option<String>,

    /// The port the core server listens on.
    #[arg(long)]
    pub port: Option<u16>,

    /// The host IP address the gift HTTP service listens on.
    #[arg(long)]
    pub api_host: Option<String>,

    /// The port the gift HTTP service listens on.
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Directory containing the species PBS files.
    #[arg(long = "pbs-dir")]
    pub pbs_dir: Option<PathBuf>,

    /// Directory containing the hot-reloadable rule files.
    #[arg(long = "rules-dir")]
    pub rules_dir: Option<PathBuf>,

    /// Directory containing gift files served by the HTTP endpoint.
    #[arg(long = "gifts-dir")]
    pub gifts_dir: Option<PathBuf>,

    /// Logging level: error, warn, info, debug, or trace.
    #[arg(long, default_value = None)]
    pub log: Option<String>,
}

impl Cli {
    /// Overlay whichever flags the caller actually supplied on top of a loaded config.
    pub fn apply_overrides(&self, config: &mut ConfigFile) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(api_host) = &self.api_host {
            config.api_host = api_host.clone();
        }
        if let Some(api_port) = self.api_port {
            config.api_port = api_port;
        }
        if let Some(pbs_dir) = &self.pbs_dir {
            config.pbs_dir = pbs_dir.clone();
        }
        if let Some(rules_dir) = &self.rules_dir {
            config.rules_dir = rules_dir.clone();
        }
        if let Some(gifts_dir) = &self.gifts_dir {
            config.gifts_dir = gifts_dir.clone();
        }
        if let Some(log) = &self.log {
            config.log_level = log.clone();
        }
    }
}
