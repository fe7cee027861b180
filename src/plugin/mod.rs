//! Plugin discovery.
//!
//! Operators drop executable scripts into a directory per origin (one
//! for the global zone, one for zones). Each executable becomes a
//! plugin named after its basename minus extension; an optional
//! `plugin.json` in the directory overrides the default timeout and
//! cache TTL per file. Listings are reused for a reload interval so a
//! busy poller does not re-stat the directory on every request.

pub mod exec;

use constants;
use glob;
use metric;
use serde_json;
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Mutex;
use time;

/// One runnable plugin.
#[derive(Clone, Debug, PartialEq)]
pub struct Plugin {
    /// Basename minus extension; unique within the directory.
    pub name: String,
    /// Absolute path of the executable.
    pub path: PathBuf,
    /// Wall-clock bound on one execution, milliseconds.
    pub timeout_millis: u64,
    /// Cache TTL of the plugin's output, seconds.
    pub ttl_secs: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct Overrides {
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    ttl: Option<u64>,
}

struct State {
    loaded_at: Option<u64>,
    plugins: Vec<Plugin>,
}

/// A plugin directory and its cached listing.
pub struct Dir {
    path: PathBuf,
    root_only: bool,
    state: Mutex<State>,
}

impl Dir {
    /// Describe a plugin directory. Nothing is read until `plugins` or
    /// `load` runs.
    ///
    /// With `root_only` set (production) a directory not owned by the
    /// superuser is rejected, since its contents run with the agent's
    /// privileges.
    pub fn new(path: PathBuf, root_only: bool) -> Dir {
        Dir {
            path: path,
            root_only: root_only,
            state: Mutex::new(State {
                loaded_at: None,
                plugins: Vec::new(),
            }),
        }
    }

    /// The directory being served.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// The current plugin listing, re-enumerated at most once per
    /// reload interval. Failed loads are never cached.
    pub fn plugins(&self) -> Result<Vec<Plugin>, metric::Error> {
        let mut state = self.state.lock().unwrap();
        let now = time::monotonic_millis();
        if let Some(at) = state.loaded_at {
            if now.saturating_sub(at) < constants::PLUGIN_RELOAD_INTERVAL_MILLIS {
                return Ok(state.plugins.clone());
            }
        }
        let plugins = self.load()?;
        state.loaded_at = Some(now);
        state.plugins = plugins.clone();
        Ok(plugins)
    }

    /// Enumerate the directory right now.
    pub fn load(&self) -> Result<Vec<Plugin>, metric::Error> {
        let meta = fs::metadata(&self.path).map_err(|e| {
            metric::Error::NotAvailable(format!(
                "plugin directory {:?}: {}",
                self.path, e
            ))
        })?;
        if !meta.is_dir() {
            return Err(metric::Error::NotAvailable(
                format!("{:?} is not a directory", self.path),
            ));
        }
        if self.root_only && meta.uid() != 0 {
            return Err(metric::Error::NotAvailable(format!(
                "plugin directory {:?} is not owned by root",
                self.path
            )));
        }
        let overrides = self.read_overrides()?;

        let pattern = format!("{}/*", self.path.to_string_lossy());
        let paths = glob::glob(&pattern).map_err(|e| {
            metric::Error::NotAvailable(format!("bad plugin glob: {}", e))
        })?;
        let mut plugins: Vec<Plugin> = Vec::new();
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("unreadable plugin directory entry: {}", e);
                    continue;
                }
            };
            let file_name = match path.file_name().and_then(|f| f.to_str()) {
                Some(f) => f.to_string(),
                None => continue,
            };
            if file_name == "plugin.json" {
                continue;
            }
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("unable to stat plugin {:?}: {}", path, e);
                    continue;
                }
            };
            if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
                continue;
            }
            let name = match plugin_name(&file_name) {
                Some(name) => name,
                None => {
                    warn!(
                        "plugin file {:?} does not yield a usable metric \
                         name, skipping",
                        file_name
                    );
                    continue;
                }
            };
            if plugins.iter().any(|p| p.name == name) {
                warn!("duplicate plugin name {:?}, keeping the first", name);
                continue;
            }
            let tuned = overrides.get(&file_name).cloned().unwrap_or_default();
            plugins.push(Plugin {
                name: name,
                path: path,
                timeout_millis: tuned
                    .timeout
                    .unwrap_or(constants::PLUGIN_DEFAULT_TIMEOUT_MILLIS),
                ttl_secs: tuned.ttl.unwrap_or(constants::PLUGIN_DEFAULT_TTL_SECS),
            });
        }
        Ok(plugins)
    }

    fn read_overrides(&self) -> Result<HashMap<String, Overrides>, metric::Error> {
        let path = self.path.join("plugin.json");
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Ok(HashMap::new()),
        };
        serde_json::from_str(&raw).map_err(|e| {
            metric::Error::Malformed(format!("{:?}: {}", path, e))
        })
    }
}

/// Basename minus extension, checked against the metric-name alphabet
/// since it lands inside `plugin_<name>_` families.
fn plugin_name(file_name: &str) -> Option<String> {
    let base = match file_name.find('.') {
        Some(0) => return None,
        Some(idx) => &file_name[..idx],
        None => file_name,
    };
    if base.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !base.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true)
    {
        Some(base.to_string())
    } else {
        None
    }
}
