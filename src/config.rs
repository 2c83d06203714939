use std::net::SocketAddr;
use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::CableClubError;

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9999
}
fn default_api_host() -> String {
    "0.0.0.0".to_string()
}
fn default_api_port() -> u16 {
    8080
}
fn default_pbs_dir() -> PathBuf {
    PathBuf::from("./PBS")
}
fn default_rules_dir() -> PathBuf {
    PathBuf::from("./OnlinePresets")
}
fn default_gifts_dir() -> PathBuf {
    PathBuf::from("./Gifts")
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Process-wide feature negotiation for the party validator (§4.3 extension fields).
///
/// Both peers of a match must agree on these out of band; the wire format does not carry
/// them. Constant for the lifetime of the process.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub essentials_deluxe_installed: bool,
    pub mui_mementos_installed: bool,
    pub zud_dynamax_installed: bool,
    pub pla_installed: bool,
    pub tera_installed: bool,
    pub focus_installed: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            essentials_deluxe_installed: false,
            mui_mementos_installed: false,
            zud_dynamax_installed: false,
            pla_installed: false,
            tera_installed: false,
            focus_installed: false,
        }
    }
}

/// Numeric limits enforced by the party validator, broken out so they can be tuned without
/// recompiling (§4.3, §10.1).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub player_max_name_size: usize,
    pub pokemon_max_name_size: usize,
    pub maximum_level: i64,
    pub iv_stat_limit: i64,
    pub ev_limit: i64,
    pub ev_stat_limit: i64,
    pub sketch_move_ids: Vec<String>,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            player_max_name_size: 10,
            pokemon_max_name_size: 10,
            maximum_level: 100,
            iv_stat_limit: 31,
            ev_limit: 510,
            ev_stat_limit: 252,
            sketch_move_ids: vec!["SKETCH".to_string()],
        }
    }
}

/// The resolved, read-only configuration for one run of the server.
///
/// Built once at startup from an optional config file, environment variables (`CABLECLUB_*`)
/// and CLI flags, in that order of increasing precedence, then handed by value into every
/// subsystem that needs it. Nothing reads configuration from a global.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_pbs_dir")]
    pub pbs_dir: PathBuf,
    #[serde(default = "default_rules_dir")]
    pub rules_dir: PathBuf,
    #[serde(default = "default_gifts_dir")]
    pub gifts_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub features: FeatureFlags,
    pub validation: ValidationLimits,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_host: default_api_host(),
            api_port: default_api_port(),
            pbs_dir: default_pbs_dir(),
            rules_dir: default_rules_dir(),
            gifts_dir: default_gifts_dir(),
            log_level: default_log_level(),
            features: FeatureFlags::default(),
            validation: ValidationLimits::default(),
        }
    }
}

impl ConfigFile {
    /// Load the base config file (if one is given), overlay environment variables, then
    /// overlay whichever CLI flags were actually set by the caller.
    pub fn load(cli: &Cli) -> Result<Self, CableClubError> {
        let mut builder = Config::builder();
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(&path.to_string_lossy()));
        }
        builder = builder.add_source(Environment::with_prefix("CABLECLUB").separator("__"));
        let raw = builder.build()?;
        let mut config: ConfigFile = raw.try_deserialize().unwrap_or_default();
        cli.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn dns_listener_address(&self) -> Result<SocketAddr, CableClubError> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn api_listener_address(&self) -> Result<SocketAddr, CableClubError> {
        Ok(format!("{}:{}", self.api_host, self.api_port).parse()?)
    }

    pub fn as_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_canonical_values() {
        let config = ConfigFile::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9999);
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.pbs_dir, PathBuf::from("./PBS"));
        assert_eq!(config.rules_dir, PathBuf::from("./OnlinePresets"));
        assert!(!config.features.pla_installed);
        assert_eq!(config.validation.maximum_level, 100);
    }

    #[test]
    fn listener_address_parses() {
        let config = ConfigFile::default();
        let addr = config.dns_listener_address().unwrap();
        assert_eq!(addr.port(), 9999);
    }
}
