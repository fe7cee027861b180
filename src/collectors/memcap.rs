//! Memory usage and caps for a zone, from the `memory_cap` kstat.
//!
//! The cap statistics use sentinel values to encode "uncapped": zero or
//! 2^64. Either one is emitted as no metric at all rather than as a
//! nonsense byte count.

use collector::{Collector, Options};
use kstat::{self, Translation};
use metric::{self, Metric, MetricKind};
use std::sync::Arc;
use zones::ZoneInfo;

const TRANSLATIONS: &'static [Translation] = &[
    Translation {
        stat: "rss",
        name: "memory_rss_bytes",
        kind: MetricKind::Gauge,
        help: "Resident set size",
        modifier: None,
    },
    Translation {
        stat: "swap",
        name: "memory_swap_bytes",
        kind: MetricKind::Gauge,
        help: "Swap reserved",
        modifier: None,
    },
    Translation {
        stat: "nover",
        name: "memory_cap_overages_total",
        kind: MetricKind::Counter,
        help: "Times the zone went over its physical cap",
        modifier: None,
    },
    Translation {
        stat: "pagedout",
        name: "memory_pagedout_bytes_total",
        kind: MetricKind::Counter,
        help: "Bytes paged out enforcing the cap",
        modifier: None,
    },
    Translation {
        stat: "anon_alloc_fail",
        name: "memory_anon_alloc_fail_total",
        kind: MetricKind::Counter,
        help: "Anonymous allocation failures",
        modifier: None,
    },
];

// (stat, metric, help) pairs whose values may be the uncapped sentinel
const CAPS: &'static [(&'static str, &'static str, &'static str)] = &[
    ("physcap", "memory_phys_cap_bytes", "Physical memory cap"),
    ("swapcap", "memory_swap_cap_bytes", "Swap cap"),
];

const UNCAPPED: f64 = 18_446_744_073_709_551_616.0; // 2^64

pub struct MemoryCap {
    kstat: Arc<kstat::Reader>,
}

impl MemoryCap {
    pub fn new(opts: &Options) -> MemoryCap {
        MemoryCap {
            kstat: Arc::clone(&opts.kstat),
        }
    }
}

impl Collector for MemoryCap {
    fn get_metrics(&self, zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let query = kstat::Query {
            class: Some("zone_memory_cap".to_string()),
            module: Some("memory_cap".to_string()),
            name: None,
            instance: Some(kstat::INSTANCE_TOKEN.to_string()),
        }.instantiate(zone.instance_id);
        let records = self.kstat.read(&query)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut res = kstat::project(&records, TRANSLATIONS, None)?;
        let record = &records[0];
        for &(stat, name, help) in CAPS {
            let value = match record.data.get(stat).and_then(|v| v.as_number()) {
                Some(v) => v,
                None => {
                    return Err(metric::Error::Fatal(
                        format!("kstat statistics missing: {}:{}", record.name, stat),
                    ))
                }
            };
            if value == 0.0 || value >= UNCAPPED {
                continue;
            }
            res.push(Metric::new(
                name,
                MetricKind::Gauge,
                kstat::format_number(value),
                help,
            ));
        }
        Ok(res)
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

    pub fn sample_record(instance: i64, physcap: f64) -> Kstat {
        kstat_record(
            "memory_cap",
            instance,
            "b4b1e1b6c7a9",
            "zone_memory_cap",
            &[
                ("rss", 123731968.0),
                ("swap", 334082048.0),
                ("nover", 0.0),
                ("pagedout", 0.0),
                ("anon_alloc_fail", 0.0),
                ("physcap", physcap),
                ("swapcap", 2147483648.0),
            ],
        )
    }

    fn zone(instance: i64) -> zones::ZoneInfo {
        zones::ZoneInfo {
            zonename: "b4b1e1b6c7a9".to_string(),
            instance_id: instance,
            core: None,
        }
    }

    #[test]
    fn test_projects_memory_stats() {
        let mut opts = test_options();
        opts.kstat = ::std::sync::Arc::new(FakeKstat::new(vec![
            sample_record(26, 1073741824.0),
        ]));
        let collector = MemoryCap::new(&opts);
        let ms = collector.get_metrics(&zone(26)).unwrap();
        assert!(ms.iter().any(|m| {
            m.name == "memory_rss_bytes" && m.value == "123731968"
        }));
        assert!(ms.iter().any(|m| {
            m.name == "memory_phys_cap_bytes" && m.value == "1073741824"
        }));
        assert!(ms.iter().any(|m| m.name == "memory_swap_cap_bytes"));
    }

    #[test]
    fn test_uncapped_sentinels_are_absent() {
        for sentinel in &[0.0, super::UNCAPPED] {
            let mut opts = test_options();
            opts.kstat = ::std::sync::Arc::new(FakeKstat::new(vec![
                sample_record(26, *sentinel),
            ]));
            let collector = MemoryCap::new(&opts);
            let ms = collector.get_metrics(&zone(26)).unwrap();
            assert!(!ms.iter().any(|m| m.name == "memory_phys_cap_bytes"));
            assert!(ms.iter().any(|m| m.name == "memory_swap_cap_bytes"));
        }
    }

    #[test]
    fn test_queries_by_instance() {
        let mut opts = test_options();
        opts.kstat = ::std::sync::Arc::new(FakeKstat::new(vec![
            sample_record(26, 1073741824.0),
        ]));
        let collector = MemoryCap::new(&opts);
        // instance 14 does not match the record at instance 26
        assert!(collector.get_metrics(&zone(14)).unwrap().is_empty());
    }
}
