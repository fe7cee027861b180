//! Per-vNIC network counters for a zone, from the `link` kstats.
//!
//! Every datalink on the host publishes one kstat named
//! `z<instance>_<linkname>`; the owning zone is carried in the record's
//! `zonename` statistic, which is what the collector filters on. The
//! interface label is normalized from the zone-side link name, `netN`
//! becoming `vnicN`.

use collector::{Collector, Options};
use kstat::{self, Kstat, Translation};
use metric::{self, Metric, MetricKind};
use std::sync::Arc;
use zones::ZoneInfo;

const TRANSLATIONS: &'static [Translation] = &[
    Translation {
        stat: "ipackets64",
        name: "net_agg_packets_in",
        kind: MetricKind::Counter,
        help: "Aggregate inbound packets",
        modifier: None,
    },
    Translation {
        stat: "rbytes64",
        name: "net_agg_bytes_in",
        kind: MetricKind::Counter,
        help: "Aggregate inbound bytes",
        modifier: None,
    },
    Translation {
        stat: "opackets64",
        name: "net_agg_packets_out",
        kind: MetricKind::Counter,
        help: "Aggregate outbound packets",
        modifier: None,
    },
    Translation {
        stat: "obytes64",
        name: "net_agg_bytes_out",
        kind: MetricKind::Counter,
        help: "Aggregate outbound bytes",
        modifier: None,
    },
];

pub struct Link {
    kstat: Arc<kstat::Reader>,
}

impl Link {
    pub fn new(opts: &Options) -> Link {
        Link {
            kstat: Arc::clone(&opts.kstat),
        }
    }
}

/// `z26_net0` -> `vnic0`; an unrecognized link name is used as-is.
fn interface_name(kstat_name: &str) -> String {
    let link = match kstat_name.find('_') {
        Some(idx) => &kstat_name[idx + 1..],
        None => kstat_name,
    };
    if link.starts_with("net") && link[3..].chars().all(|c| c.is_ascii_digit()) {
        format!("vnic{}", &link[3..])
    } else {
        link.to_string()
    }
}

fn label(record: &Kstat) -> String {
    format!("{{interface=\"{}\"}}", interface_name(&record.name))
}

impl Collector for Link {
    fn get_metrics(&self, zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let query = kstat::Query {
            class: Some("net".to_string()),
            module: Some("link".to_string()),
            name: None,
            instance: None,
        };
        let records = self.kstat.read(&query)?;
        let mine: Vec<Kstat> = records
            .into_iter()
            .filter(|r| {
                r.data.get("zonename").and_then(|v| v.as_text())
                    == Some(zone.zonename.as_str())
            })
            .collect();
        if mine.is_empty() {
            return Ok(Vec::new());
        }
        kstat::project(&mine, TRANSLATIONS, Some(&label))
    }

    fn cache_ttl(&self) -> i64 {
        10
    }
}
