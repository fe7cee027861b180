//! TCP MIB counters for a zone, from its `tcp` kstat instance.

use collector::{Collector, Options};
use kstat::{self, Translation};
use metric::{self, Metric, MetricKind};
use std::sync::Arc;
use zones::ZoneInfo;

const TRANSLATIONS: &'static [Translation] = &[
    Translation {
        stat: "activeOpens",
        name: "tcp_active_opens_total",
        kind: MetricKind::Counter,
        help: "Outgoing connections opened",
        modifier: None,
    },
    Translation {
        stat: "passiveOpens",
        name: "tcp_passive_opens_total",
        kind: MetricKind::Counter,
        help: "Incoming connections accepted",
        modifier: None,
    },
    Translation {
        stat: "attemptFails",
        name: "tcp_failed_connection_attempts_total",
        kind: MetricKind::Counter,
        help: "Connection attempts that failed",
        modifier: None,
    },
    Translation {
        stat: "estabResets",
        name: "tcp_established_resets_total",
        kind: MetricKind::Counter,
        help: "Established connections reset",
        modifier: None,
    },
    Translation {
        stat: "retransSegs",
        name: "tcp_retransmitted_segments_total",
        kind: MetricKind::Counter,
        help: "Segments retransmitted",
        modifier: None,
    },
    Translation {
        stat: "inDupAck",
        name: "tcp_duplicate_acks_total",
        kind: MetricKind::Counter,
        help: "Duplicate ACKs received",
        modifier: None,
    },
    Translation {
        stat: "listenDrop",
        name: "tcp_listen_drops_total",
        kind: MetricKind::Counter,
        help: "Connections dropped from a full listen queue",
        modifier: None,
    },
    Translation {
        stat: "listenDropQ0",
        name: "tcp_listen_drops_q0_total",
        kind: MetricKind::Counter,
        help: "Connections dropped from a full half-open queue",
        modifier: None,
    },
    Translation {
        stat: "halfOpenDrop",
        name: "tcp_half_open_drops_total",
        kind: MetricKind::Counter,
        help: "Half-open connections dropped",
        modifier: None,
    },
    Translation {
        stat: "timRetransDrop",
        name: "tcp_retransmit_timeout_drops_total",
        kind: MetricKind::Counter,
        help: "Connections dropped by retransmit timeout",
        modifier: None,
    },
    Translation {
        stat: "currEstab",
        name: "tcp_current_established_connections",
        kind: MetricKind::Gauge,
        help: "Connections currently established",
        modifier: None,
    },
];

pub struct Tcp {
    kstat: Arc<kstat::Reader>,
}

impl Tcp {
    pub fn new(opts: &Options) -> Tcp {
        Tcp {
            kstat: Arc::clone(&opts.kstat),
        }
    }
}

impl Collector for Tcp {
    fn get_metrics(&self, zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let query = kstat::Query {
            class: Some("mib2".to_string()),
            module: Some("tcp".to_string()),
            name: Some("tcp".to_string()),
            instance: Some(kstat::INSTANCE_TOKEN.to_string()),
        }.instantiate(zone.instance_id);
        let records = self.kstat.read(&query)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        kstat::project(&records, TRANSLATIONS, None)
    }

    fn cache_ttl(&self) -> i64 {
        10
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use collectors::fake::{kstat_record, FakeKstat};
    use collectors::test_options;
    use kstat::Kstat;
    use zones;

    pub fn sample_record(instance: i64) -> Kstat {
        kstat_record(
            "tcp",
            instance,
            "tcp",
            "mib2",
            &[
                ("activeOpens", 272.0),
                ("passiveOpens", 183921.0),
                ("attemptFails", 39.0),
                ("estabResets", 7.0),
                ("retransSegs", 12.0),
                ("inDupAck", 1144.0),
                ("listenDrop", 0.0),
                ("listenDropQ0", 0.0),
                ("halfOpenDrop", 0.0),
                ("timRetransDrop", 1.0),
                ("currEstab", 11.0),
            ],
        )
    }

    #[test]
    fn test_projects_tcp_counters() {
        let mut opts = test_options();
        opts.kstat = ::std::sync::Arc::new(FakeKstat::new(vec![sample_record(26)]));
        let collector = Tcp::new(&opts);
        let zone = zones::ZoneInfo {
            zonename: "whatever".to_string(),
            instance_id: 26,
            core: None,
        };
        let ms = collector.get_metrics(&zone).unwrap();
        assert_eq!(ms.len(), TRANSLATIONS.len());
        assert!(ms.iter().any(|m| {
            m.name == "tcp_passive_opens_total" && m.value == "183921"
        }));
        let estab = ms.iter()
            .find(|m| m.name == "tcp_current_established_connections")
            .unwrap();
        assert_eq!(estab.kind, ::metric::MetricKind::Gauge);
    }
}
