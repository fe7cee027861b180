//! ZFS dataset usage and pool statistics via zfs(1M) and zpool(1M).

use acquire;
use metric;
use std::collections::HashMap;

/// Dataset properties read for every zone, in emission order.
pub const DATASET_PROPS: &'static [&'static str] = &[
    "available",
    "used",
    "logicalused",
    "recordsize",
    "quota",
    "compressratio",
    "refcompressratio",
    "referenced",
    "logicalreferenced",
    "usedbydataset",
    "usedbysnapshots",
];

/// Something that can report dataset usage for a zone.
pub trait UsageSource: Send + Sync {
    /// Property values for the dataset `zones/<zonename>`.
    fn usage(&self, zonename: &str) -> Result<HashMap<String, f64>, metric::Error>;
}

/// `UsageSource` that shells out to zfs(1M).
pub struct ZfsCli;

impl UsageSource for ZfsCli {
    fn usage(&self, zonename: &str) -> Result<HashMap<String, f64>, metric::Error> {
        let props = DATASET_PROPS.join(",");
        let dataset = format!("zones/{}", zonename);
        let out = acquire::run_tool(
            "/usr/sbin/zfs",
            &["get", "-Hpo", "property,value", &props, &dataset],
        )?;
        if !out.success {
            return Err(metric::Error::NotAvailable(
                format!("zfs get failed: {}", out.stderr.trim()),
            ));
        }
        parse_usage(&out.stdout)
    }
}

/// Parse `zfs get -Hpo property,value` output.
///
/// Compression ratios carry a trailing `x` which is stripped. Every value
/// must then be numeric.
pub fn parse_usage(stdout: &str) -> Result<HashMap<String, f64>, metric::Error> {
    let mut props = HashMap::new();
    for line in stdout.lines() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 2 {
            return Err(metric::Error::Malformed(
                format!("short zfs get line: {:?}", line),
            ));
        }
        let raw = fields[1].trim_matches('x');
        let value = raw.parse::<f64>().map_err(|_| {
            metric::Error::Malformed(format!(
                "zfs property {} is not numeric: {:?}",
                fields[0], fields[1]
            ))
        })?;
        props.insert(fields[0].to_string(), value);
    }
    Ok(props)
}

/// One imported pool.
#[derive(Clone, Debug, PartialEq)]
pub struct Pool {
    /// Pool name.
    pub name: String,
    /// Bytes allocated.
    pub allocated: f64,
    /// Fragmentation percentage.
    pub fragmentation: f64,
    /// Total size in bytes.
    pub size: f64,
}

/// Something that can list imported pools.
pub trait PoolSource: Send + Sync {
    /// Every imported pool.
    fn pools(&self) -> Result<Vec<Pool>, metric::Error>;
}

/// `PoolSource` that shells out to zpool(1M).
pub struct ZpoolCli;

impl PoolSource for ZpoolCli {
    fn pools(&self) -> Result<Vec<Pool>, metric::Error> {
        let out = acquire::run_tool(
            "/usr/sbin/zpool",
            &["list", "-Hpo", "name,allocated,fragmentation,size"],
        )?;
        if !out.success {
            return Err(metric::Error::NotAvailable(
                format!("zpool list failed: {}", out.stderr.trim()),
            ));
        }
        parse_pools(&out.stdout)
    }
}

/// Parse `zpool list -Hpo name,allocated,fragmentation,size` output.
///
/// Fragmentation may carry a stray `%` suffix, which is stripped; a bare
/// `-` (pools that predate the spacemap histogram) reads as zero.
pub fn parse_pools(stdout: &str) -> Result<Vec<Pool>, metric::Error> {
    let mut pools = Vec::new();
    for line in stdout.lines() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            return Err(metric::Error::Malformed(
                format!("short zpool line: {:?}", line),
            ));
        }
        let number = |raw: &str| -> Result<f64, metric::Error> {
            raw.parse::<f64>().map_err(|_| {
                metric::Error::Malformed(
                    format!("zpool field is not numeric: {:?}", raw),
                )
            })
        };
        let frag = fields[2].trim_matches('%');
        let fragmentation = if frag == "-" { 0.0 } else { number(frag)? };
        pools.push(Pool {
            name: fields[0].to_string(),
            allocated: number(fields[1])?,
            fragmentation: fragmentation,
            size: number(fields[3])?,
        });
    }
    Ok(pools)
}
