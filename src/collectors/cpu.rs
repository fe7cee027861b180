//! Per-CPU hardware state for the global zone, from the `cpu_info`
//! kstats.

use collector::{Collector, Options};
use kstat::{self, Kstat, Translation};
use metric::{self, Metric, MetricKind};
use std::sync::Arc;
use zones::ZoneInfo;

const TRANSLATIONS: &'static [Translation] = &[
    Translation {
        stat: "clock_MHz",
        name: "cpu_info_clock_mhz",
        kind: MetricKind::Gauge,
        help: "CPU clock rate",
        modifier: None,
    },
    Translation {
        stat: "current_cstate",
        name: "cpu_info_current_cstate",
        kind: MetricKind::Gauge,
        help: "Current CPU C-state",
        modifier: None,
    },
    Translation {
        stat: "supported_max_cstates",
        name: "cpu_info_supported_max_cstates",
        kind: MetricKind::Gauge,
        help: "Deepest supported CPU C-state",
        modifier: None,
    },
];

pub struct CpuInfo {
    kstat: Arc<kstat::Reader>,
}

impl CpuInfo {
    pub fn new(opts: &Options) -> CpuInfo {
        CpuInfo {
            kstat: Arc::clone(&opts.kstat),
        }
    }
}

fn label(record: &Kstat) -> String {
    format!("{{cpu_id=\"{}\"}}", record.instance)
}

impl Collector for CpuInfo {
    fn get_metrics(&self, _zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let query = kstat::Query {
            class: Some("misc".to_string()),
            module: Some("cpu_info".to_string()),
            name: None,
            instance: None,
        };
        let records = self.kstat.read(&query)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        kstat::project(&records, TRANSLATIONS, Some(&label))
    }

    fn cache_ttl(&self) -> i64 {
        300
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use collectors::fake::{kstat_record, FakeKstat};
    use collectors::test_options;
    use zones;

    /// Two plausible cpu_info records.
    pub fn sample_records() -> Vec<Kstat> {
        vec![
            kstat_record(
                "cpu_info",
                0,
                "cpu_info0",
                "misc",
                &[
                    ("clock_MHz", 2400.0),
                    ("current_cstate", 1.0),
                    ("supported_max_cstates", 2.0),
                ],
            ),
            kstat_record(
                "cpu_info",
                1,
                "cpu_info1",
                "misc",
                &[
                    ("clock_MHz", 2400.0),
                    ("current_cstate", 0.0),
                    ("supported_max_cstates", 2.0),
                ],
            ),
        ]
    }

    #[test]
    fn test_labels_by_cpu_id() {
        let mut opts = test_options();
        opts.kstat = ::std::sync::Arc::new(FakeKstat::new(sample_records()));
        let collector = CpuInfo::new(&opts);
        let zone = zones::ZoneInfo {
            zonename: "global".to_string(),
            instance_id: 0,
            core: None,
        };
        let ms = collector.get_metrics(&zone).unwrap();
        assert_eq!(ms.len(), 6);
        assert_eq!(ms[0].label, Some("{cpu_id=\"0\"}".to_string()));
        assert_eq!(ms[3].label, Some("{cpu_id=\"1\"}".to_string()));
        let cstates: Vec<&str> = ms.iter()
            .filter(|m| m.name == "cpu_info_current_cstate")
            .map(|m| m.value.as_str())
            .collect();
        assert_eq!(cstates, vec!["1", "0"]);
    }
}
