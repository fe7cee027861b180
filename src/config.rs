//! Provides the CLI option parser
//!
//! Used to parse the argv/config file into a struct that the agent can
//! consume and use as configuration data.

use clap::{App, Arg};
use constants;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::process;
use toml;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    constants::DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_zone_refresh() -> u64 {
    constants::DEFAULT_ZONE_REFRESH_SECS
}

fn default_cache_sweep() -> u64 {
    constants::DEFAULT_CACHE_SWEEP_SECS
}

fn default_http_workers() -> usize {
    constants::DEFAULT_HTTP_WORKERS
}

fn default_version() -> String {
    VERSION.unwrap_or("unknown").to_string()
}

/// Agent configuration, merged from the TOML file and argv.
#[derive(Clone, Debug, Deserialize)]
pub struct Args {
    /// Address the HTTP surface binds.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the HTTP surface binds.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level name; `-v` occurrences raise it.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Administrative account owning core zones. Core-zone detection is
    /// disabled when unset.
    #[serde(default)]
    pub ufds_admin_uuid: String,
    /// Directory of global-zone plugin scripts.
    #[serde(default)]
    pub plugin_gz_dir: Option<PathBuf>,
    /// Directory of per-zone plugin scripts.
    #[serde(default)]
    pub plugin_vm_dir: Option<PathBuf>,
    /// Require plugin directories to be owned by the superuser.
    #[serde(default = "default_true")]
    pub plugin_root_only: bool,
    /// Seconds between periodic zone registry refreshes.
    #[serde(default = "default_zone_refresh")]
    pub zone_refresh_secs: u64,
    /// Seconds between cache sweeps.
    #[serde(default = "default_cache_sweep")]
    pub cache_sweep_secs: u64,
    /// HTTP worker threads.
    #[serde(default = "default_http_workers")]
    pub http_workers: usize,
    /// Verbosity from `-v` occurrences.
    #[serde(skip)]
    pub verbose: u64,
    /// Agent version string.
    #[serde(skip_deserializing, default = "default_version")]
    pub version: String,
}

impl Default for Args {
    fn default() -> Args {
        Args {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            ufds_admin_uuid: String::new(),
            plugin_gz_dir: None,
            plugin_vm_dir: None,
            plugin_root_only: true,
            zone_refresh_secs: default_zone_refresh(),
            cache_sweep_secs: default_cache_sweep(),
            http_workers: default_http_workers(),
            verbose: 0,
            version: default_version(),
        }
    }
}

/// Parse argv, then the configuration file argv points at.
pub fn parse_args() -> Args {
    let args = App::new("zmond")
        .version(VERSION.unwrap_or("unknown"))
        .about("per-zone telemetry collection agent")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .help("The path to the zmond config file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output"),
        )
        .get_matches();

    let verbosity = args.occurrences_of("verbose");

    let mut parsed = match args.value_of("config-file") {
        None => Args::default(),
        Some(path) => {
            let mut buffer = String::new();
            let mut file = match File::open(path) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("unable to open config {}: {}", path, e);
                    process::exit(1);
                }
            };
            if let Err(e) = file.read_to_string(&mut buffer) {
                eprintln!("unable to read config {}: {}", path, e);
                process::exit(1);
            }
            match toml::from_str(&buffer) {
                Ok(parsed) => parsed,
                Err(e) => {
                    eprintln!("unable to parse config {}: {}", path, e);
                    process::exit(1);
                }
            }
        }
    };
    parsed.verbose = verbosity;
    parsed.version = default_version();
    parsed
}
