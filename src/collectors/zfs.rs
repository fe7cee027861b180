//! Dataset usage for a zone's `zones/<uuid>` dataset.

use acquire::zfs;
use collector::{Collector, Options};
use kstat::format_number;
use metric::{self, Metric, MetricKind};
use std::sync::Arc;
use zones::ZoneInfo;

// one metric per property of `zfs::DATASET_PROPS`, in that order
const TRANSLATIONS: &'static [(&'static str, &'static str, &'static str)] = &[
    ("available", "zfs_available_bytes", "Bytes available to the dataset"),
    ("used", "zfs_used_bytes", "Bytes used by the dataset and descendants"),
    ("logicalused", "zfs_logical_used_bytes", "Logical bytes used"),
    ("recordsize", "zfs_recordsize_bytes", "Suggested block size"),
    ("quota", "zfs_quota_bytes", "Dataset quota"),
    ("compressratio", "zfs_compression_ratio", "Achieved compression ratio"),
    ("refcompressratio", "zfs_ref_compression_ratio", "Compression ratio of referenced space"),
    ("referenced", "zfs_referenced_bytes", "Bytes referenced"),
    ("logicalreferenced", "zfs_logical_referenced_bytes", "Logical bytes referenced"),
    ("usedbydataset", "zfs_used_by_dataset_bytes", "Bytes used by the dataset itself"),
    ("usedbysnapshots", "zfs_used_by_snapshots_bytes", "Bytes used by snapshots"),
];

pub struct ZfsUsage {
    zfs: Arc<zfs::UsageSource>,
}

impl ZfsUsage {
    pub fn new(opts: &Options) -> ZfsUsage {
        ZfsUsage {
            zfs: Arc::clone(&opts.zfs),
        }
    }
}

impl Collector for ZfsUsage {
    fn get_metrics(&self, zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let usage = self.zfs.usage(&zone.zonename)?;
        let mut res = Vec::with_capacity(TRANSLATIONS.len());
        for &(prop, name, help) in TRANSLATIONS {
            let value = match usage.get(prop) {
                Some(v) => *v,
                None => {
                    return Err(metric::Error::Malformed(
                        format!("zfs property {} missing for {}", prop, zone.zonename),
                    ))
                }
            };
            res.push(Metric::new(
                name,
                MetricKind::Gauge,
                format_number(value),
                help,
            ));
        }
        Ok(res)
    }

    fn cache_ttl(&self) -> i64 {
        60
    }
}
