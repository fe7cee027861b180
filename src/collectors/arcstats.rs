//! ZFS ARC statistics for the global zone, from the `zfs::arcstats`
//! kstat.

use collector::{Collector, Options};
use kstat::{self, Translation};
use metric::{self, Metric, MetricKind};
use std::sync::Arc;
use zones::ZoneInfo;

const TRANSLATIONS: &'static [Translation] = &[
    Translation {
        stat: "hits",
        name: "arcstats_hits_total",
        kind: MetricKind::Counter,
        help: "ARC hits",
        modifier: None,
    },
    Translation {
        stat: "misses",
        name: "arcstats_misses_total",
        kind: MetricKind::Counter,
        help: "ARC misses",
        modifier: None,
    },
    Translation {
        stat: "demand_data_hits",
        name: "arcstats_demand_data_hits_total",
        kind: MetricKind::Counter,
        help: "ARC demand data hits",
        modifier: None,
    },
    Translation {
        stat: "demand_data_misses",
        name: "arcstats_demand_data_misses_total",
        kind: MetricKind::Counter,
        help: "ARC demand data misses",
        modifier: None,
    },
    Translation {
        stat: "demand_metadata_hits",
        name: "arcstats_demand_metadata_hits_total",
        kind: MetricKind::Counter,
        help: "ARC demand metadata hits",
        modifier: None,
    },
    Translation {
        stat: "demand_metadata_misses",
        name: "arcstats_demand_metadata_misses_total",
        kind: MetricKind::Counter,
        help: "ARC demand metadata misses",
        modifier: None,
    },
    Translation {
        stat: "prefetch_data_hits",
        name: "arcstats_prefetch_data_hits_total",
        kind: MetricKind::Counter,
        help: "ARC prefetch data hits",
        modifier: None,
    },
    Translation {
        stat: "prefetch_data_misses",
        name: "arcstats_prefetch_data_misses_total",
        kind: MetricKind::Counter,
        help: "ARC prefetch data misses",
        modifier: None,
    },
    Translation {
        stat: "mru_hits",
        name: "arcstats_mru_hits_total",
        kind: MetricKind::Counter,
        help: "ARC MRU list hits",
        modifier: None,
    },
    Translation {
        stat: "mfu_hits",
        name: "arcstats_mfu_hits_total",
        kind: MetricKind::Counter,
        help: "ARC MFU list hits",
        modifier: None,
    },
    Translation {
        stat: "deleted",
        name: "arcstats_deleted_total",
        kind: MetricKind::Counter,
        help: "ARC buffers deleted",
        modifier: None,
    },
    Translation {
        stat: "evict_skip",
        name: "arcstats_evict_skips_total",
        kind: MetricKind::Counter,
        help: "ARC eviction skips",
        modifier: None,
    },
    Translation {
        stat: "l2_hits",
        name: "arcstats_l2_hits_total",
        kind: MetricKind::Counter,
        help: "L2ARC hits",
        modifier: None,
    },
    Translation {
        stat: "l2_misses",
        name: "arcstats_l2_misses_total",
        kind: MetricKind::Counter,
        help: "L2ARC misses",
        modifier: None,
    },
    Translation {
        stat: "size",
        name: "arcstats_size_bytes",
        kind: MetricKind::Gauge,
        help: "ARC total size",
        modifier: None,
    },
    Translation {
        stat: "c",
        name: "arcstats_target_cache_size_bytes",
        kind: MetricKind::Gauge,
        help: "ARC target size",
        modifier: None,
    },
    Translation {
        stat: "c_min",
        name: "arcstats_min_cache_size_bytes",
        kind: MetricKind::Gauge,
        help: "ARC minimum target size",
        modifier: None,
    },
    Translation {
        stat: "c_max",
        name: "arcstats_max_cache_size_bytes",
        kind: MetricKind::Gauge,
        help: "ARC maximum target size",
        modifier: None,
    },
    Translation {
        stat: "hdr_size",
        name: "arcstats_hdr_size_bytes",
        kind: MetricKind::Gauge,
        help: "ARC header size",
        modifier: None,
    },
];

pub struct Arcstats {
    kstat: Arc<kstat::Reader>,
}

impl Arcstats {
    pub fn new(opts: &Options) -> Arcstats {
        Arcstats {
            kstat: Arc::clone(&opts.kstat),
        }
    }
}

impl Collector for Arcstats {
    fn get_metrics(&self, _zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let query = kstat::Query {
            class: Some("misc".to_string()),
            module: Some("zfs".to_string()),
            name: Some("arcstats".to_string()),
            instance: None,
        };
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

    /// A full arcstats record satisfying the projection table.
    pub fn sample_record() -> Kstat {
        kstat_record(
            "zfs",
            0,
            "arcstats",
            "misc",
            &[
                ("hits", 13380586.0),
                ("misses", 254474012.0),
                ("demand_data_hits", 8121134.0),
                ("demand_data_misses", 118592271.0),
                ("demand_metadata_hits", 5043729.0),
                ("demand_metadata_misses", 65510231.0),
                ("prefetch_data_hits", 99214.0),
                ("prefetch_data_misses", 70302802.0),
                ("mru_hits", 7888481.0),
                ("mfu_hits", 5375014.0),
                ("deleted", 673327337.0),
                ("evict_skip", 4558.0),
                ("l2_hits", 0.0),
                ("l2_misses", 0.0),
                ("size", 580918120.0),
                ("c", 580802552.0),
                ("c_min", 198755840.0),
                ("c_max", 1590046720.0),
                ("hdr_size", 4359912.0),
            ],
        )
    }

    fn gz() -> zones::ZoneInfo {
        zones::ZoneInfo {
            zonename: "global".to_string(),
            instance_id: 0,
            core: None,
        }
    }

    #[test]
    fn test_projects_arcstats() {
        let mut opts = test_options();
        opts.kstat = ::std::sync::Arc::new(FakeKstat::new(vec![sample_record()]));
        let collector = Arcstats::new(&opts);
        let ms = collector.get_metrics(&gz()).unwrap();
        let hits = ms.iter().find(|m| m.name == "arcstats_hits_total").unwrap();
        assert_eq!(hits.value, "13380586");
        assert_eq!(hits.kind, ::metric::MetricKind::Counter);
        let size = ms.iter().find(|m| m.name == "arcstats_size_bytes").unwrap();
        assert_eq!(size.kind, ::metric::MetricKind::Gauge);
    }

    #[test]
    fn test_no_records_is_empty() {
        let opts = test_options();
        let collector = Arcstats::new(&opts);
        assert!(collector.get_metrics(&gz()).unwrap().is_empty());
    }
}
