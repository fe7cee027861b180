//! The per-request pipeline.
//!
//! For one target the agent resolves the zone, walks the applicable
//! collector domains in order, consults the TTL cache per collector,
//! separates in-band option records from data, serializes, caches, and
//! finally re-verifies the target so a zone restart mid-collection
//! cannot hand the poller counters stitched together from two zone
//! incarnations.
//!
//! Collector failures are absorbed here: an unavailable or malformed
//! collector is logged and skipped, never cached, and the request goes
//! on. Only a missing target, a violated invariant, or a registry that
//! failed to load fail the request itself.

use cache;
use collector::{self, Collector, Domain, Options};
use collectors::plugin::PluginCollector;
use metric::{self, Metric, MetricKind};
use std::fmt;
use std::sync::Arc;
use zones::{self, ZoneInfo};

/// Why a request failed.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// The collector registry never loaded; nothing can be served.
    NotRunning,
    /// The target is unknown, stopped, restarted mid-collection, or its
    /// data is presently unavailable.
    NotFound(String),
    /// An invariant was violated.
    Fatal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::NotRunning => write!(f, "collectors are not running"),
            Error::NotFound(ref msg) => write!(f, "{}", msg),
            Error::Fatal(ref msg) => write!(f, "{}", msg),
        }
    }
}

/// The agent: registry, zone registry and cache behind one handle.
pub struct Agent {
    registry: Option<collector::Registry>,
    zones: Arc<zones::Registry>,
    cache: cache::Cache,
}

impl Agent {
    /// Assemble the agent. A registry that fails to load is reported
    /// once and leaves the agent answering `NotRunning` forever, which
    /// the poller sees as a hard 500 rather than silent gaps.
    pub fn new(opts: &Options, zones: Arc<zones::Registry>) -> Agent {
        let registry = match collector::Registry::new(opts) {
            Ok(registry) => Some(registry),
            Err(e) => {
                error!("unable to load collectors: {}", e);
                None
            }
        };
        Agent {
            registry: registry,
            zones: zones,
            cache: opts.cache.clone(),
        }
    }

    /// Whether the collector registry loaded.
    pub fn running(&self) -> bool {
        self.registry.is_some()
    }

    /// Refresh the zone registry on demand.
    pub fn refresh(&self) -> Result<(), metric::Error> {
        self.zones.refresh()
    }

    /// Serve one `/v1/<target>/metrics` request body.
    pub fn metrics(&self, target: &str) -> Result<String, Error> {
        let registry = match self.registry {
            Some(ref registry) => registry,
            None => return Err(Error::NotRunning),
        };
        let zone = match self.zones.lookup(target) {
            Ok(zone) => zone,
            Err(e) => return Err(Error::NotFound(e.to_string())),
        };
        let domains: [Domain; 2] = if zone.is_global() {
            [Domain::Common, Domain::Gz]
        } else {
            [Domain::Common, Domain::Vm]
        };

        let mut body = String::with_capacity(8_192);
        for domain in &domains {
            if let Some(builtins) = registry.builtins(*domain) {
                for (name, collector) in builtins {
                    self.run_collector(
                        *domain,
                        name,
                        collector.as_ref(),
                        &zone,
                        &mut body,
                    )?;
                }
            }
            if let Some(dir) = registry.plugin_dir(*domain) {
                match dir.plugins() {
                    Err(e) => warn!("unable to list plugins: {}", e),
                    Ok(plugins) => for plugin in plugins {
                        let name = format!("plugin_{}", plugin.name);
                        let collector = PluginCollector::new(plugin);
                        self.run_collector(
                            *domain,
                            &name,
                            &collector,
                            &zone,
                            &mut body,
                        )?;
                    },
                }
            }
        }

        match self.zones.verify(&zone) {
            Ok(true) => Ok(body),
            Ok(false) => Err(Error::NotFound(format!(
                "zone {} changed while metrics were being collected",
                zone.zonename
            ))),
            Err(e) => Err(Error::Fatal(e.to_string())),
        }
    }

    fn run_collector(
        &self,
        domain: Domain,
        name: &str,
        collector: &Collector,
        zone: &ZoneInfo,
        body: &mut String,
    ) -> Result<(), Error> {
        if !collector.should_run(zone) {
            return Ok(());
        }
        if collector.core_zone_only() && !zone.is_core() {
            return Ok(());
        }
        let cache_key =
            format!("{}/{}/{}", domain.as_str(), name, zone.zonename);
        if let Some(text) = self.cache.get(&cache_key) {
            body.push_str(&text);
            return Ok(());
        }
        let raw = match collector.get_metrics(zone) {
            Ok(raw) => raw,
            Err(metric::Error::Fatal(msg)) => return Err(Error::Fatal(msg)),
            Err(metric::Error::NotFound(msg)) => {
                return Err(Error::NotFound(msg))
            }
            Err(e) => {
                // NotAvailable / Malformed: skip the collector, never
                // cache the failure
                warn!("collector {} skipped for {}: {}", name, zone.zonename, e);
                return Ok(());
            }
        };
        let (options, data): (Vec<Metric>, Vec<Metric>) =
            raw.into_iter().partition(|m| m.is_option());
        if data.is_empty() && !collector.empty_ok() {
            return Err(Error::NotFound(format!(
                "metrics for {} are not currently available",
                zone.zonename
            )));
        }
        let ttl = ttl_override(&options).unwrap_or_else(|| collector.cache_ttl());
        let text = match metric::emit(&data) {
            Ok(text) => text,
            Err(e) => return Err(Error::Fatal(e.to_string())),
        };
        if ttl > 0 {
            if let Err(e) = self.cache.insert(&cache_key, text.clone(), ttl) {
                warn!("unable to cache {}: {}", cache_key, e);
            }
        }
        body.push_str(&text);
        Ok(())
    }
}

fn ttl_override(options: &[Metric]) -> Option<i64> {
    options
        .iter()
        .find(|m| m.kind == MetricKind::Option && m.name == "ttl")
        .and_then(|m| m.value.parse().ok())
}
