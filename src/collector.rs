//! The collector abstraction and its registry.
//!
//! A collector produces metric tuples for one concern -- ARC statistics,
//! NIC counters, a plugin directory -- against a resolved target zone.
//! Collectors are grouped by domain: `common` runs for every target,
//! `gz` only for the host, `vm` only for zones. The registry is built
//! once at startup from a shared options bag wiring in every external
//! seam, so tests can assemble a registry over fakes.

use acquire::{ntp, sidecar, zfs};
use cache;
use collectors;
use kstat;
use metric::{self, Metric};
use plugin;
use std::collections::BTreeMap;
use std::sync::Arc;
use zones::ZoneInfo;

/// Which targets a collector group applies to. Ordering is the
/// iteration order of the request pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Domain {
    /// Every target.
    Common,
    /// The global zone only.
    Gz,
    /// Container zones only.
    Vm,
}

impl Domain {
    /// Lowercase name, used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Domain::Common => "common",
            Domain::Gz => "gz",
            Domain::Vm => "vm",
        }
    }
}

/// One source of metric tuples.
pub trait Collector: Send + Sync {
    /// Produce tuples for the target.
    fn get_metrics(&self, zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error>;

    /// Seconds a result stays cached. Non-positive means never cache.
    fn cache_ttl(&self) -> i64;

    /// Cheap per-target gate, consulted before `get_metrics`.
    fn should_run(&self, _zone: &ZoneInfo) -> bool {
        true
    }

    /// Restrict the collector to core service zones.
    fn core_zone_only(&self) -> bool {
        false
    }

    /// Whether an empty result is acceptable. When false, empty output
    /// means the target's data is presently unavailable and the request
    /// fails with `NotFound`.
    fn empty_ok(&self) -> bool {
        false
    }
}

/// Everything a collector constructor may need.
#[derive(Clone)]
pub struct Options {
    /// Kernel statistics reader.
    pub kstat: Arc<kstat::Reader>,
    /// NTP daemon source.
    pub ntp: Arc<ntp::Source>,
    /// Dataset usage source.
    pub zfs: Arc<zfs::UsageSource>,
    /// Pool statistics source.
    pub pools: Arc<zfs::PoolSource>,
    /// Sidecar HTTP scraper.
    pub scraper: Arc<sidecar::Scraper>,
    /// Plugin directory for global-zone plugins.
    pub plugins_gz: Option<Arc<plugin::Dir>>,
    /// Plugin directory for zone plugins.
    pub plugins_vm: Option<Arc<plugin::Dir>>,
    /// The shared TTL cache.
    pub cache: cache::Cache,
    /// Administrative account owning core zones.
    pub admin_uuid: String,
    /// Wall-clock source for the time collector.
    pub timestamp: fn() -> i64,
}

/// The installed collectors, `domain -> name -> collector`.
pub struct Registry {
    builtins: BTreeMap<Domain, BTreeMap<&'static str, Box<Collector>>>,
    plugins_gz: Option<Arc<plugin::Dir>>,
    plugins_vm: Option<Arc<plugin::Dir>>,
}

impl Registry {
    /// Install every built-in collector and validate the configured
    /// plugin directories. Any failure here leaves the agent in its
    /// "not running" state.
    pub fn new(opts: &Options) -> Result<Registry, metric::Error> {
        let mut common: BTreeMap<&'static str, Box<Collector>> = BTreeMap::new();
        common.insert(
            "time",
            Box::new(collectors::time::Time::new(opts)) as Box<Collector>,
        );

        let mut gz: BTreeMap<&'static str, Box<Collector>> = BTreeMap::new();
        gz.insert(
            "arcstats",
            Box::new(collectors::arcstats::Arcstats::new(opts)) as Box<Collector>,
        );
        gz.insert(
            "cpu_info",
            Box::new(collectors::cpu::CpuInfo::new(opts)) as Box<Collector>,
        );
        gz.insert(
            "ntp",
            Box::new(collectors::ntp::Ntp::new(opts)) as Box<Collector>,
        );
        gz.insert(
            "zpool_list",
            Box::new(collectors::zpool::ZpoolList::new(opts)) as Box<Collector>,
        );

        let mut vm: BTreeMap<&'static str, Box<Collector>> = BTreeMap::new();
        vm.insert(
            "link",
            Box::new(collectors::link::Link::new(opts)) as Box<Collector>,
        );
        vm.insert(
            "memory_cap",
            Box::new(collectors::memcap::MemoryCap::new(opts)) as Box<Collector>,
        );
        vm.insert(
            "tcp",
            Box::new(collectors::tcp::Tcp::new(opts)) as Box<Collector>,
        );
        vm.insert(
            "zfs_usage",
            Box::new(collectors::zfs::ZfsUsage::new(opts)) as Box<Collector>,
        );
        vm.insert(
            "triton_core",
            Box::new(collectors::sidecar::TritonCore::new(opts)) as Box<Collector>,
        );

        for dir in opts.plugins_gz.iter().chain(opts.plugins_vm.iter()) {
            dir.load()?;
        }

        let mut builtins = BTreeMap::new();
        builtins.insert(Domain::Common, common);
        builtins.insert(Domain::Gz, gz);
        builtins.insert(Domain::Vm, vm);
        Ok(Registry {
            builtins: builtins,
            plugins_gz: opts.plugins_gz.clone(),
            plugins_vm: opts.plugins_vm.clone(),
        })
    }

    /// Built-in collectors of one domain, in name order.
    pub fn builtins(
        &self,
        domain: Domain,
    ) -> Option<&BTreeMap<&'static str, Box<Collector>>> {
        self.builtins.get(&domain)
    }

    /// The plugin directory feeding one domain, if configured.
    pub fn plugin_dir(&self, domain: Domain) -> Option<&Arc<plugin::Dir>> {
        match domain {
            Domain::Gz => self.plugins_gz.as_ref(),
            Domain::Vm => self.plugins_vm.as_ref(),
            Domain::Common => None,
        }
    }
}
