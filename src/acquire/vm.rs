//! Zone metadata via vmadm(1M) and host identity via sysinfo(1M).
//!
//! The registry uses this to decide which zones are core service zones:
//! owned by the configured administrative account and carrying a role
//! tag, with sidecar metric ports published in customer metadata.

use acquire;
use metric;
use serde_json;
use std::collections::HashMap;

/// Fields requested from vmadm for every zone.
pub const LOOKUP_FIELDS: &'static str = "uuid,owner_uuid,tags,nics,customer_metadata";

/// One virtual NIC of a zone.
#[derive(Clone, Debug, Deserialize)]
pub struct Nic {
    /// Network tag, e.g. `admin` or `external`.
    #[serde(default)]
    pub nic_tag: Option<String>,
    /// Primary IP on the NIC.
    #[serde(default)]
    pub ip: Option<String>,
}

/// The slice of a zone's metadata the agent cares about.
#[derive(Clone, Debug, Deserialize)]
pub struct Vm {
    /// Zone UUID.
    pub uuid: String,
    /// Owning account.
    #[serde(default)]
    pub owner_uuid: Option<String>,
    /// Arbitrary operator tags.
    #[serde(default)]
    pub tags: HashMap<String, serde_json::Value>,
    /// Configured NICs.
    #[serde(default)]
    pub nics: Vec<Nic>,
    /// Customer metadata, holding `metricPorts` for core zones.
    #[serde(default)]
    pub customer_metadata: HashMap<String, serde_json::Value>,
}

impl Vm {
    /// IP of the NIC on the admin network, if any.
    pub fn admin_ip(&self) -> Option<&str> {
        self.nics
            .iter()
            .find(|n| n.nic_tag.as_ref().map(|t| t == "admin").unwrap_or(false))
            .and_then(|n| n.ip.as_ref())
            .map(|ip| ip.as_str())
    }

    /// Sidecar metric ports from `customer_metadata.metricPorts`, a
    /// comma-delimited list. Unparseable entries are dropped.
    pub fn metric_ports(&self) -> Vec<u16> {
        match self.customer_metadata
            .get("metricPorts")
            .and_then(|v| v.as_str())
        {
            None => Vec::new(),
            Some(raw) => raw.split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect(),
        }
    }

    /// Whether the zone carries a service role tag.
    pub fn has_role_tag(&self) -> bool {
        self.tags.contains_key("smartdc_role")
    }
}

/// Something that can load zone metadata.
pub trait Loader: Send + Sync {
    /// Metadata for one zone, or `None` when the platform does not know
    /// the UUID.
    fn load(&self, uuid: &str) -> Result<Option<Vm>, metric::Error>;
}

/// `Loader` that shells out to vmadm(1M).
pub struct VmadmLoader;

impl Loader for VmadmLoader {
    fn load(&self, uuid: &str) -> Result<Option<Vm>, metric::Error> {
        let filter = format!("uuid={}", uuid);
        let out = acquire::run_tool(
            "/usr/sbin/vmadm",
            &["lookup", "-j", "-o", LOOKUP_FIELDS, &filter],
        )?;
        if !out.success {
            return Err(metric::Error::NotAvailable(
                format!("vmadm lookup failed: {}", out.stderr.trim()),
            ));
        }
        let mut vms = parse_lookup(&out.stdout)?;
        Ok(vms.pop())
    }
}

/// Parse `vmadm lookup -j` output, a JSON array of zone records.
pub fn parse_lookup(json: &str) -> Result<Vec<Vm>, metric::Error> {
    serde_json::from_str(json).map_err(|e| {
        metric::Error::Malformed(format!("vmadm output: {}", e))
    })
}

/// Host identity as reported by sysinfo(1M).
#[derive(Clone, Debug, Deserialize)]
pub struct Sysinfo {
    /// Server UUID.
    #[serde(rename = "UUID")]
    pub uuid: String,
    /// Datacenter the server belongs to.
    #[serde(rename = "Datacenter Name", default)]
    pub datacenter_name: Option<String>,
}

/// Read host identity.
pub fn sysinfo() -> Result<Sysinfo, metric::Error> {
    let out = acquire::run_tool("/usr/bin/sysinfo", &[])?;
    if !out.success {
        return Err(metric::Error::NotAvailable(
            format!("sysinfo failed: {}", out.stderr.trim()),
        ));
    }
    serde_json::from_str(&out.stdout).map_err(|e| {
        metric::Error::Malformed(format!("sysinfo output: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    const LOOKUP: &'static str = r#"[
      {
        "uuid": "61c64afd-6c69-44b3-94fc-bcd17234e268",
        "owner_uuid": "930896af-bf8c-48d4-885c-6573a94b1853",
        "tags": {"smartdc_role": "vmapi", "smartdc_type": "core"},
        "nics": [
          {"nic_tag": "external", "ip": "198.51.100.9"},
          {"nic_tag": "admin", "ip": "10.0.0.17"}
        ],
        "customer_metadata": {"metricPorts": "8881,8882", "user-script": "x"}
      }
    ]"#;

    #[test]
    fn test_parse_lookup() {
        let vms = parse_lookup(LOOKUP).unwrap();
        assert_eq!(vms.len(), 1);
        let vm = &vms[0];
        assert_eq!(vm.uuid, "61c64afd-6c69-44b3-94fc-bcd17234e268");
        assert_eq!(vm.admin_ip(), Some("10.0.0.17"));
        assert_eq!(vm.metric_ports(), vec![8881, 8882]);
        assert!(vm.has_role_tag());
    }

    #[test]
    fn test_parse_lookup_minimal_record() {
        let vms = parse_lookup(r#"[{"uuid": "abc"}]"#).unwrap();
        let vm = &vms[0];
        assert_eq!(vm.admin_ip(), None);
        assert!(vm.metric_ports().is_empty());
        assert!(!vm.has_role_tag());
    }

    #[test]
    fn test_parse_lookup_rejects_garbage() {
        assert!(parse_lookup("not json").is_err());
    }

    #[test]
    fn test_metric_ports_drops_garbage_entries() {
        let vms = parse_lookup(
            r#"[{"uuid": "abc", "customer_metadata": {"metricPorts": "8881, nope, 70000, 8882"}}]"#,
        ).unwrap();
        assert_eq!(vms[0].metric_ports(), vec![8881, 8882]);
    }

    #[test]
    fn test_sysinfo_fields() {
        let si: Sysinfo = serde_json::from_str(
            r#"{"UUID": "44454c4c-3800-1042", "Datacenter Name": "us-east-1", "Boot Time": "1500000000"}"#,
        ).unwrap();
        assert_eq!(si.uuid, "44454c4c-3800-1042");
        assert_eq!(si.datacenter_name, Some("us-east-1".to_string()));
    }
}
