//! Enumeration of running zones via zoneadm(1M).

use acquire;
use metric;

/// One running zone as reported by the kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct ListEntry {
    /// Kernel instance id.
    pub zoneid: i64,
    /// Zonename; a UUID for every zone this agent serves.
    pub zonename: String,
}

/// Something that can enumerate running zones.
pub trait Lister: Send + Sync {
    /// List every running non-global zone.
    fn running(&self) -> Result<Vec<ListEntry>, metric::Error>;
}

/// `Lister` that shells out to zoneadm(1M).
pub struct Zoneadm;

impl Lister for Zoneadm {
    fn running(&self) -> Result<Vec<ListEntry>, metric::Error> {
        let out = acquire::run_tool("/usr/sbin/zoneadm", &["list", "-p"])?;
        if !out.success {
            return Err(metric::Error::NotAvailable(
                format!("zoneadm failed: {}", out.stderr.trim()),
            ));
        }
        parse_list(&out.stdout)
    }
}

/// Parse `zoneadm list -p` output.
///
/// Each line is `zoneid:zonename:state:zonepath:uuid:brand:ip-type`. The
/// global zone (zoneid 0) is omitted; it is addressed as the
/// distinguished target `gz`, never through this list.
pub fn parse_list(stdout: &str) -> Result<Vec<ListEntry>, metric::Error> {
    let mut entries = Vec::new();
    for line in stdout.lines() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 2 {
            return Err(metric::Error::Malformed(
                format!("short zoneadm line: {:?}", line),
            ));
        }
        let zoneid = fields[0].parse::<i64>().map_err(|_| {
            metric::Error::Malformed(
                format!("bad zoneid in zoneadm line: {:?}", line),
            )
        })?;
        if zoneid == 0 {
            continue;
        }
        entries.push(ListEntry {
            zoneid: zoneid,
            zonename: fields[1].to_string(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_skips_global() {
        let out = "\
0:global:running:/::liveimg:shared
14:61c64afd-6c69-44b3-94fc-bcd17234e268:running:/zones/61c64afd-6c69-44b3-94fc-bcd17234e268:61c64afd-6c69-44b3-94fc-bcd17234e268:joyent:excl
26:9f00b51e-7dfa-4aa4-8371-45e696c1f0e0:running:/zones/9f00b51e-7dfa-4aa4-8371-45e696c1f0e0:9f00b51e-7dfa-4aa4-8371-45e696c1f0e0:lx:excl
";
        let entries = parse_list(out).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].zoneid, 14);
        assert_eq!(
            entries[0].zonename,
            "61c64afd-6c69-44b3-94fc-bcd17234e268"
        );
        assert_eq!(entries[1].zoneid, 26);
    }

    #[test]
    fn test_parse_list_rejects_garbage() {
        assert!(parse_list("not a zone line\n").is_err());
        assert!(parse_list("abc:uuid:running\n").is_err());
    }

    #[test]
    fn test_parse_list_empty() {
        assert_eq!(parse_list("").unwrap(), Vec::new());
    }
}
