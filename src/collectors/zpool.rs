//! Pool capacity and fragmentation for the global zone.

use acquire::zfs;
use collector::{Collector, Options};
use kstat::format_number;
use metric::{self, Metric, MetricKind};
use std::sync::Arc;
use zones::ZoneInfo;

pub struct ZpoolList {
    pools: Arc<zfs::PoolSource>,
}

impl ZpoolList {
    pub fn new(opts: &Options) -> ZpoolList {
        ZpoolList {
            pools: Arc::clone(&opts.pools),
        }
    }
}

impl Collector for ZpoolList {
    fn get_metrics(&self, _zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let mut pools = self.pools.pools()?;
        pools.sort_by(|a, b| a.name.cmp(&b.name));
        let mut res = Vec::with_capacity(pools.len() * 3);
        for pool in &pools {
            let label = format!("{{pool=\"{}\"}}", pool.name);
            let series: &[(&str, f64, &str)] = &[
                ("zpool_allocated_bytes", pool.allocated, "Bytes allocated in the pool"),
                ("zpool_fragmentation_percent", pool.fragmentation, "Pool fragmentation"),
                ("zpool_size_bytes", pool.size, "Total pool size"),
            ];
            for &(name, value, help) in series {
                res.push(
                    Metric::new(
                        name,
                        MetricKind::Gauge,
                        format_number(value),
                        help,
                    ).label(label.clone()),
                );
            }
        }
        Ok(res)
    }

    fn cache_ttl(&self) -> i64 {
        60
    }
}
