//! Execution of one plugin as a collector.
//!
//! Each discovered plugin behaves like its own collector: its own cache
//! entry, its own TTL (overridable in-band via a `ttl` option record),
//! its own timeout. Output is sniffed -- a leading `#` means prometheus
//! text, anything else the tab-separated native format -- and the
//! parsed tuples ride under the `plugin_<name>_` prefix. Whatever
//! happens, the plugin contributes a
//! `plugin_<name>_metrics_available_boolean` family so operators can
//! alarm on scripts that stop producing.

use collector::Collector;
use constants;
use metric::{self, Metric, MetricKind};
use plugin::{self, exec};
use protocols::{native, prometheus};
use zones::ZoneInfo;

pub struct PluginCollector {
    plugin: plugin::Plugin,
}

impl PluginCollector {
    pub fn new(plugin: plugin::Plugin) -> PluginCollector {
        PluginCollector { plugin: plugin }
    }
}

fn availability(name: &str, available: bool) -> Metric {
    Metric::new(
        format!("plugin_{}_metrics_available_boolean", name),
        MetricKind::Gauge,
        if available { "1" } else { "0" },
        format!("Whether plugin {} produced metrics", name),
    )
}

fn looks_like_prometheus(stdout: &str) -> bool {
    stdout
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().starts_with('#'))
        .unwrap_or(false)
}

impl Collector for PluginCollector {
    fn get_metrics(&self, zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let stdout = match exec::run(
            &self.plugin.path,
            &zone.zonename,
            self.plugin.timeout_millis,
            constants::PLUGIN_MAX_OUTPUT_BYTES,
        ) {
            Ok(stdout) => stdout,
            Err(e) => {
                warn!("plugin {} failed: {}", self.plugin.name, e);
                return Ok(vec![availability(&self.plugin.name, false)]);
            }
        };
        let prefix = format!("plugin_{}_", self.plugin.name);
        let mut res = Vec::new();
        let parsed = if looks_like_prometheus(&stdout) {
            prometheus::parse(&stdout, &prefix, &mut res)
        } else {
            native::parse(&stdout, &prefix, &mut res)
        };
        match parsed {
            Ok(()) => {
                res.push(availability(&self.plugin.name, true));
                Ok(res)
            }
            Err(e) => {
                warn!("plugin {} produced bad output: {}", self.plugin.name, e);
                Ok(vec![availability(&self.plugin.name, false)])
            }
        }
    }

    fn cache_ttl(&self) -> i64 {
        self.plugin.ttl_secs as i64
    }

    // a plugin emitting nothing but its availability family is fine
    fn empty_ok(&self) -> bool {
        true
    }
}
