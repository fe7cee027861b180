//! The zone registry: which zones are running, what kernel instance id
//! each one holds, and which of them are core service zones.
//!
//! The registry is refreshed wholesale -- build a new map, swap it in --
//! so readers always observe a consistent enumeration. Between refreshes
//! a record can go stale; the orchestrator re-verifies its target after
//! collection and fails the request if the zone restarted under it,
//! since a restarted zone comes back with a new instance id and freshly
//! zeroed counters.

use acquire::{vm, zone};
use kstat;
use metric;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// The distinguished zonename of the host itself.
pub const GLOBAL_ZONENAME: &'static str = "global";

/// The kernel truncates zonenames to this many characters in kstat
/// names. Full-length comparison must go through the record's
/// `zonename` data field instead.
pub const KSTAT_ZONENAME_LEN: usize = 30;

/// Sidecar coordinates of a core service zone.
#[derive(Clone, Debug, PartialEq)]
pub struct CoreZone {
    /// IP of the zone's NIC on the admin network.
    pub admin_ip: String,
    /// TCP ports publishing sidecar metrics.
    pub metric_ports: Vec<u16>,
}

/// A resolved collection target.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneInfo {
    /// Zonename: a UUID, or `global` for the host.
    pub zonename: String,
    /// Kernel instance id; 0 for the host.
    pub instance_id: i64,
    /// Present when the zone is a core service zone.
    pub core: Option<CoreZone>,
}

impl ZoneInfo {
    /// Whether this target is the host itself.
    pub fn is_global(&self) -> bool {
        self.zonename == GLOBAL_ZONENAME
    }

    /// Whether this target is a core service zone.
    pub fn is_core(&self) -> bool {
        self.core.is_some()
    }
}

#[derive(Clone, Debug)]
struct Zone {
    instance_id: i64,
    core: Option<CoreZone>,
}

/// Tracks running zones. Shared by every request worker and the
/// periodic refresh task.
pub struct Registry {
    zones: RwLock<HashMap<String, Zone>>,
    lister: Arc<zone::Lister>,
    loader: Arc<vm::Loader>,
    kstat: Arc<kstat::Reader>,
    admin_uuid: String,
}

impl Registry {
    /// Create an empty registry; call `refresh` to populate it.
    pub fn new(
        lister: Arc<zone::Lister>,
        loader: Arc<vm::Loader>,
        kstat: Arc<kstat::Reader>,
        admin_uuid: String,
    ) -> Registry {
        Registry {
            zones: RwLock::new(HashMap::new()),
            lister: lister,
            loader: loader,
            kstat: kstat,
            admin_uuid: admin_uuid,
        }
    }

    /// Re-enumerate running zones and replace the registry atomically.
    ///
    /// A zone whose metadata cannot be loaded is kept as a plain zone;
    /// failure to enumerate at all fails the whole refresh and leaves
    /// the previous map in place.
    pub fn refresh(&self) -> Result<(), metric::Error> {
        let listed = self.lister.running()?;
        let mut next = HashMap::with_capacity(listed.len());
        for entry in listed {
            let core = match self.loader.load(&entry.zonename) {
                Ok(Some(vm)) => self.core_info(&vm),
                Ok(None) => None,
                Err(e) => {
                    warn!(
                        "unable to load metadata for zone {}: {}",
                        entry.zonename, e
                    );
                    None
                }
            };
            next.insert(
                entry.zonename,
                Zone {
                    instance_id: entry.zoneid,
                    core: core,
                },
            );
        }
        let mut zones = self.zones.write().unwrap();
        *zones = next;
        info!("zone registry refreshed, {} zones", zones.len());
        Ok(())
    }

    /// Resolve a request target. `gz` resolves to the host; anything
    /// else must be the UUID of a running zone.
    pub fn lookup(&self, target: &str) -> Result<ZoneInfo, metric::Error> {
        if target == "gz" {
            return Ok(ZoneInfo {
                zonename: GLOBAL_ZONENAME.to_string(),
                instance_id: 0,
                core: None,
            });
        }
        if Uuid::parse_str(target).is_err() {
            return Err(metric::Error::NotFound(
                format!("target {:?} is not gz or a zone uuid", target),
            ));
        }
        let zones = self.zones.read().unwrap();
        match zones.get(target) {
            Some(zone) => Ok(ZoneInfo {
                zonename: target.to_string(),
                instance_id: zone.instance_id,
                core: zone.core.clone(),
            }),
            None => Err(metric::Error::NotFound(
                format!("zone {} is not running", target),
            )),
        }
    }

    /// Re-resolve a target's instance id straight from the kernel and
    /// report whether it still matches. A zone that restarted since
    /// `lookup` holds a new instance id and fails verification.
    pub fn verify(&self, zone: &ZoneInfo) -> Result<bool, metric::Error> {
        let query = kstat::Query {
            module: Some("zones".to_string()),
            class: Some("zone_misc".to_string()),
            name: Some(truncate_zonename(&zone.zonename).to_string()),
            instance: None,
        };
        let records = self.kstat.read(&query)?;
        for record in &records {
            let full = record.data.get("zonename").and_then(|v| v.as_text());
            if full == Some(zone.zonename.as_str()) {
                return Ok(record.instance == zone.instance_id);
            }
        }
        Ok(false)
    }

    fn core_info(&self, vm: &vm::Vm) -> Option<CoreZone> {
        if self.admin_uuid.is_empty() {
            return None;
        }
        let owned = vm.owner_uuid
            .as_ref()
            .map(|o| *o == self.admin_uuid)
            .unwrap_or(false);
        if !owned || !vm.has_role_tag() {
            return None;
        }
        let admin_ip = match vm.admin_ip() {
            Some(ip) => ip.to_string(),
            None => return None,
        };
        Some(CoreZone {
            admin_ip: admin_ip,
            metric_ports: vm.metric_ports(),
        })
    }
}

/// Truncate a zonename the way the kernel does for kstat names.
pub fn truncate_zonename(zonename: &str) -> &str {
    if zonename.len() > KSTAT_ZONENAME_LEN {
        &zonename[..KSTAT_ZONENAME_LEN]
    } else {
        zonename
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acquire::zone::ListEntry;
    use kstat::{Kstat, Query, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedLister(Vec<ListEntry>);

    impl zone::Lister for FixedLister {
        fn running(&self) -> Result<Vec<ListEntry>, ::metric::Error> {
            Ok(self.0.clone())
        }
    }

    struct NoLoader;

    impl vm::Loader for NoLoader {
        fn load(&self, _: &str) -> Result<Option<vm::Vm>, ::metric::Error> {
            Ok(None)
        }
    }

    struct JsonLoader(&'static str);

    impl vm::Loader for JsonLoader {
        fn load(&self, _: &str) -> Result<Option<vm::Vm>, ::metric::Error> {
            Ok(vm::parse_lookup(self.0)?.pop())
        }
    }

    struct ZoneMiscReader {
        records: Mutex<Vec<Kstat>>,
    }

    impl ZoneMiscReader {
        fn new(entries: &[(&str, i64)]) -> ZoneMiscReader {
            let records = entries
                .iter()
                .map(|&(zonename, instance)| {
                    let mut data = HashMap::new();
                    data.insert(
                        "zonename".to_string(),
                        Value::Text(zonename.to_string()),
                    );
                    Kstat {
                        class: "zone_misc".to_string(),
                        module: "zones".to_string(),
                        name: truncate_zonename(zonename).to_string(),
                        instance: instance,
                        snaptime: 0.0,
                        crtime: 0.0,
                        data: data,
                    }
                })
                .collect();
            ZoneMiscReader {
                records: Mutex::new(records),
            }
        }
    }

    impl kstat::Reader for ZoneMiscReader {
        fn read(&self, query: &Query) -> Result<Vec<Kstat>, ::metric::Error> {
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .filter(|r| query.name.as_ref() == Some(&r.name))
                .cloned()
                .collect())
        }
    }

    const UUID_A: &'static str = "61c64afd-6c69-44b3-94fc-bcd17234e268";

    fn registry(
        entries: Vec<ListEntry>,
        kstats: &[(&str, i64)],
        admin_uuid: &str,
    ) -> Registry {
        Registry::new(
            Arc::new(FixedLister(entries)),
            Arc::new(NoLoader),
            Arc::new(ZoneMiscReader::new(kstats)),
            admin_uuid.to_string(),
        )
    }

    #[test]
    fn test_lookup_gz() {
        let reg = registry(Vec::new(), &[], "");
        let info = reg.lookup("gz").unwrap();
        assert_eq!(info.zonename, "global");
        assert_eq!(info.instance_id, 0);
        assert!(info.is_global());
        assert!(!info.is_core());
    }

    #[test]
    fn test_lookup_running_zone() {
        let reg = registry(
            vec![
                ListEntry {
                    zoneid: 14,
                    zonename: UUID_A.to_string(),
                },
            ],
            &[],
            "",
        );
        reg.refresh().unwrap();
        let info = reg.lookup(UUID_A).unwrap();
        assert_eq!(info.instance_id, 14);
        assert!(!info.is_global());
    }

    #[test]
    fn test_lookup_unknown_uuid_not_found() {
        let reg = registry(Vec::new(), &[], "");
        reg.refresh().unwrap();
        match reg.lookup(UUID_A) {
            Err(::metric::Error::NotFound(_)) => {}
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_non_uuid_not_found() {
        let reg = registry(Vec::new(), &[], "");
        match reg.lookup("12; rm -rf /") {
            Err(::metric::Error::NotFound(_)) => {}
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_refresh_replaces_map() {
        let reg = registry(
            vec![
                ListEntry {
                    zoneid: 14,
                    zonename: UUID_A.to_string(),
                },
            ],
            &[],
            "",
        );
        reg.refresh().unwrap();
        assert!(reg.lookup(UUID_A).is_ok());
    }

    #[test]
    fn test_verify_matching_instance() {
        let reg = registry(Vec::new(), &[(UUID_A, 14)], "");
        let info = ZoneInfo {
            zonename: UUID_A.to_string(),
            instance_id: 14,
            core: None,
        };
        assert_eq!(reg.verify(&info).unwrap(), true);
    }

    #[test]
    fn test_verify_detects_restart() {
        let reg = registry(Vec::new(), &[(UUID_A, 15)], "");
        let info = ZoneInfo {
            zonename: UUID_A.to_string(),
            instance_id: 14,
            core: None,
        };
        assert_eq!(reg.verify(&info).unwrap(), false);
    }

    #[test]
    fn test_verify_vanished_zone() {
        let reg = registry(Vec::new(), &[], "");
        let info = ZoneInfo {
            zonename: UUID_A.to_string(),
            instance_id: 14,
            core: None,
        };
        assert_eq!(reg.verify(&info).unwrap(), false);
    }

    #[test]
    fn test_verify_compares_full_zonename_not_truncation() {
        // Two zonenames sharing a 30-character prefix alias in the
        // kstat name field; the data field disambiguates.
        let long_a = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-one";
        let long_b = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-two";
        assert_eq!(truncate_zonename(long_a), truncate_zonename(long_b));
        let reg = registry(Vec::new(), &[(long_a, 7), (long_b, 9)], "");
        let info = ZoneInfo {
            zonename: long_b.to_string(),
            instance_id: 9,
            core: None,
        };
        assert_eq!(reg.verify(&info).unwrap(), true);
        let wrong = ZoneInfo {
            zonename: long_b.to_string(),
            instance_id: 7,
            core: None,
        };
        assert_eq!(reg.verify(&wrong).unwrap(), false);
    }

    #[test]
    fn test_core_zone_detection() {
        let admin = "930896af-bf8c-48d4-885c-6573a94b1853";
        let lookup = r#"[{
            "uuid": "61c64afd-6c69-44b3-94fc-bcd17234e268",
            "owner_uuid": "930896af-bf8c-48d4-885c-6573a94b1853",
            "tags": {"smartdc_role": "vmapi"},
            "nics": [{"nic_tag": "admin", "ip": "10.0.0.17"}],
            "customer_metadata": {"metricPorts": "8881"}
        }]"#;
        let reg = Registry::new(
            Arc::new(FixedLister(vec![
                ListEntry {
                    zoneid: 14,
                    zonename: UUID_A.to_string(),
                },
            ])),
            Arc::new(JsonLoader(lookup)),
            Arc::new(ZoneMiscReader::new(&[])),
            admin.to_string(),
        );
        reg.refresh().unwrap();
        let info = reg.lookup(UUID_A).unwrap();
        assert!(info.is_core());
        let core = info.core.unwrap();
        assert_eq!(core.admin_ip, "10.0.0.17");
        assert_eq!(core.metric_ports, vec![8881]);
    }

    #[test]
    fn test_non_admin_owner_is_not_core() {
        let lookup = r#"[{
            "uuid": "61c64afd-6c69-44b3-94fc-bcd17234e268",
            "owner_uuid": "00000000-0000-0000-0000-000000000000",
            "tags": {"smartdc_role": "vmapi"},
            "nics": [{"nic_tag": "admin", "ip": "10.0.0.17"}]
        }]"#;
        let reg = Registry::new(
            Arc::new(FixedLister(vec![
                ListEntry {
                    zoneid: 14,
                    zonename: UUID_A.to_string(),
                },
            ])),
            Arc::new(JsonLoader(lookup)),
            Arc::new(ZoneMiscReader::new(&[])),
            "930896af-bf8c-48d4-885c-6573a94b1853".to_string(),
        );
        reg.refresh().unwrap();
        assert!(!reg.lookup(UUID_A).unwrap().is_core());
    }
}
