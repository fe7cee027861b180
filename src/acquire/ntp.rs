//! NTP daemon state via ntpq(1M).
//!
//! One ntpq invocation runs `apeers` followed by `iostats`, `kerninfo`,
//! `monstats`, `sysinfo` and `sysstats`; if the peer table names a system
//! peer, a second invocation reads its variables with `readvar <assid>`.
//! The combined output is walked by a small state machine that tracks an
//! association context -- 0 for the local daemon, otherwise a peer's
//! association id -- and routes every recognized `key: value` or
//! `key=value` datum into the `system`, `syspeer` or per-peer structure.
//!
//! A daemon that is not running is not an error: ntpq reports it with a
//! well-known line on stderr and the module answers with
//! `available = false` so the collector can emit nothing.

use acquire;
use metric;
use std::collections::HashMap;

/// The exact stderr ntpq produces when no daemon is listening.
pub const CONNECTION_REFUSED: &'static str =
    "/usr/sbin/ntpq: read: Connection refused\n";

/// Something that can run ntpq commands.
pub trait Source: Send + Sync {
    /// Run ntpq with one `-c` per command, returning stdout and stderr.
    fn query(&self, commands: &[&str]) -> Result<(String, String), metric::Error>;
}

/// `Source` that shells out to ntpq(1M).
pub struct NtpqCli;

impl Source for NtpqCli {
    fn query(&self, commands: &[&str]) -> Result<(String, String), metric::Error> {
        let mut args: Vec<&str> = vec!["-n"];
        for command in commands {
            args.push("-c");
            args.push(command);
        }
        let out = acquire::run_tool("/usr/sbin/ntpq", &args)?;
        Ok((out.stdout, out.stderr))
    }
}

/// One row of the peer table.
#[derive(Clone, Debug, PartialEq)]
pub struct Peer {
    /// Remote address, numeric under `-n`.
    pub remote: String,
    /// Reference id of the peer's own source.
    pub refid: String,
    /// Association id.
    pub assid: u32,
    /// Peer stratum.
    pub stratum: f64,
    /// Seconds since the peer was last heard from.
    pub when: f64,
    /// Polling interval, seconds.
    pub poll: f64,
    /// Failed polls in the last eight: 8 minus the popcount of the
    /// reach register.
    pub failed_polls: f64,
    /// Round-trip delay, milliseconds.
    pub delay: f64,
    /// Offset, milliseconds.
    pub offset: f64,
    /// Jitter, milliseconds.
    pub jitter: f64,
    /// Admission state decoded from the flash character.
    pub state: i32,
}

/// Everything one acquisition learned about the local NTP daemon.
#[derive(Clone, Debug, Default)]
pub struct NtpData {
    /// False when the daemon is down; every other field is then empty.
    pub available: bool,
    /// Local daemon statistics.
    pub system: HashMap<String, f64>,
    /// Variables of the current system peer, when there is one.
    pub syspeer: HashMap<String, f64>,
    /// Peer table.
    pub peers: Vec<Peer>,
}

impl NtpData {
    /// Association id of the current system peer, if any.
    pub fn syspeer_assid(&self) -> Option<u32> {
        self.peers.iter().find(|p| p.state == 6).map(|p| p.assid)
    }
}

/// Decode a peer-table flash character into the numeric admission state:
/// invalid=0, falseticker=1, overflow=2, pruned=3, candidate=4,
/// backup=5, syspeer=6, pps=7, anything else -1.
pub fn peer_state(flash: char) -> i32 {
    match flash {
        ' ' => 0,
        'x' => 1,
        '.' => 2,
        '-' => 3,
        '+' => 4,
        '#' => 5,
        '*' => 6,
        'o' => 7,
        _ => -1,
    }
}

/// Count of failed polls encoded in a reach register: the number of
/// zero bits among the last eight polls.
pub fn failed_polls(reach: u8) -> u32 {
    8 - reach.count_ones()
}

/// Convert an NTP timestamp of the form `<hex>.<hex>` to seconds since
/// the unix epoch.
pub fn timestamp_to_epoch(raw: &str) -> Option<f64> {
    const NTP_UNIX_DELTA: f64 = 2_208_988_800.0;
    let mut halves = raw.splitn(2, '.');
    let seconds = u64::from_str_radix(halves.next()?, 16).ok()?;
    let fraction = u32::from_str_radix(halves.next()?, 16).ok()?;
    Some(
        seconds as f64 - NTP_UNIX_DELTA
            + f64::from(fraction) / 4_294_967_296.0,
    )
}

#[derive(Clone, Copy)]
enum Conv {
    Plain,
    Base2,
    Timestamp,
}

// `key: value` data routed to the system structure, with its canonical
// name and conversion.
const SYSTEM_PROPS: &'static [(&'static str, &'static str, Conv)] = &[
    // iostats
    ("time since reset", "time_since_reset", Conv::Plain),
    ("receive buffers", "receive_buffers", Conv::Plain),
    ("free receive buffers", "free_receive_buffers", Conv::Plain),
    ("used receive buffers", "used_receive_buffers", Conv::Plain),
    ("low water refills", "low_water_refills", Conv::Plain),
    ("dropped packets", "dropped_packets", Conv::Plain),
    ("ignored packets", "ignored_packets", Conv::Plain),
    ("received packets", "received_packets", Conv::Plain),
    ("packets sent", "packets_sent", Conv::Plain),
    ("packet send failures", "packet_send_failures", Conv::Plain),
    ("input wakeups", "input_wakeups", Conv::Plain),
    ("useful input wakeups", "useful_input_wakeups", Conv::Plain),
    // kerninfo
    ("pll offset", "pll_offset", Conv::Plain),
    ("pll frequency", "pll_frequency", Conv::Plain),
    ("maximum error", "maximum_error", Conv::Plain),
    ("estimated error", "estimated_error", Conv::Plain),
    ("pll time constant", "pll_time_constant", Conv::Plain),
    ("precision", "precision", Conv::Plain),
    ("frequency tolerance", "frequency_tolerance", Conv::Plain),
    ("pps frequency", "pps_frequency", Conv::Plain),
    ("pps stability", "pps_stability", Conv::Plain),
    ("pps jitter", "pps_jitter", Conv::Plain),
    ("calibration interval", "calibration_interval", Conv::Plain),
    ("calibration cycles", "calibration_cycles", Conv::Plain),
    ("jitter exceeded", "jitter_exceeded", Conv::Plain),
    ("stability exceeded", "stability_exceeded", Conv::Plain),
    ("calibration errors", "calibration_errors", Conv::Plain),
    // monstats
    ("addresses", "mru_addresses", Conv::Plain),
    ("peak addresses", "mru_peak_addresses", Conv::Plain),
    ("maximum addresses", "mru_maximum_addresses", Conv::Plain),
    ("reclaim above count", "mru_reclaim_above_count", Conv::Plain),
    ("reclaim older than", "mru_reclaim_older_than", Conv::Plain),
    ("kilobytes", "mru_kilobytes", Conv::Plain),
    ("maximum kilobytes", "mru_maximum_kilobytes", Conv::Plain),
    // sysinfo
    ("leap indicator", "leap_indicator", Conv::Base2),
    ("stratum", "stratum", Conv::Plain),
    ("log2 precision", "log2_precision", Conv::Plain),
    ("root delay", "root_delay", Conv::Plain),
    ("root dispersion", "root_dispersion", Conv::Plain),
    ("reference time", "reference_time", Conv::Timestamp),
    ("system jitter", "system_jitter", Conv::Plain),
    ("clock jitter", "clock_jitter", Conv::Plain),
    ("clock wander", "clock_wander", Conv::Plain),
    ("broadcast delay", "broadcast_delay", Conv::Plain),
    ("symm. auth. delay", "symm_auth_delay", Conv::Plain),
    // sysstats
    ("uptime", "uptime", Conv::Plain),
    ("sysstats reset", "sysstats_reset", Conv::Plain),
    ("packets received", "packets_received", Conv::Plain),
    ("current version", "current_version", Conv::Plain),
    ("older version", "older_version", Conv::Plain),
    ("bad length or format", "bad_length_or_format", Conv::Plain),
    ("authentication failed", "authentication_failed", Conv::Plain),
    ("declined", "declined", Conv::Plain),
    ("restricted", "restricted", Conv::Plain),
    ("rate limited", "rate_limited", Conv::Plain),
    ("KoD responses", "kod_responses", Conv::Plain),
    ("processed for time", "processed_for_time", Conv::Plain),
];

// `key=value` variables routed to the syspeer structure.
const PEER_VARS: &'static [(&'static str, &'static str, Conv)] = &[
    ("leap", "leap_indicator", Conv::Base2),
    ("stratum", "stratum", Conv::Plain),
    ("precision", "precision", Conv::Plain),
    ("rootdelay", "root_delay", Conv::Plain),
    ("rootdisp", "root_dispersion", Conv::Plain),
    ("reftime", "reference_time", Conv::Timestamp),
    ("rec", "last_received_time", Conv::Timestamp),
    ("hpoll", "host_poll", Conv::Plain),
    ("ppoll", "peer_poll", Conv::Plain),
    ("headway", "headway", Conv::Plain),
    ("offset", "offset", Conv::Plain),
    ("delay", "delay", Conv::Plain),
    ("dispersion", "dispersion", Conv::Plain),
    ("jitter", "jitter", Conv::Plain),
    ("xleave", "interleave_delay", Conv::Plain),
];

/// Gather the daemon's state through `source`.
pub fn fetch(source: &Source) -> Result<NtpData, metric::Error> {
    let (stdout, stderr) = source.query(&[
        "apeers",
        "iostats",
        "kerninfo",
        "monstats",
        "sysinfo",
        "sysstats",
    ])?;
    if stderr == CONNECTION_REFUSED {
        return Ok(NtpData::default());
    }
    if !stderr.is_empty() {
        return Err(metric::Error::NotAvailable(
            format!("ntpq: {}", stderr.trim()),
        ));
    }
    let mut data = NtpData::default();
    data.available = true;
    parse_report(&stdout, &mut data);
    if let Some(assid) = data.syspeer_assid() {
        let command = format!("readvar {}", assid);
        let (stdout, stderr) = source.query(&[&command])?;
        if stderr.is_empty() {
            parse_variables(&stdout, assid, &mut data);
        }
    }
    Ok(data)
}

/// Walk the combined report output.
pub fn parse_report(stdout: &str, data: &mut NtpData) {
    let mut in_peer_table = false;
    let mut context: u32 = 0;
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.starts_with("remote") && trimmed.contains("assid") {
            in_peer_table = true;
            continue;
        }
        if in_peer_table {
            if trimmed.starts_with('=') {
                continue;
            }
            if let Some(peer) = parse_peer_row(line) {
                data.peers.push(peer);
                continue;
            }
            in_peer_table = false;
        }
        if trimmed.starts_with("associd=") {
            context = trimmed["associd=".len()..]
                .split_whitespace()
                .next()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            continue;
        }
        if context != 0 {
            continue;
        }
        let (key, value) = match split_colon(trimmed) {
            Some(kv) => kv,
            None => continue,
        };
        for &(prop, canonical, conv) in SYSTEM_PROPS {
            if prop == key {
                if let Some(n) = convert(value, conv) {
                    data.system.insert(canonical.to_string(), n);
                }
                break;
            }
        }
    }
}

/// Walk `readvar` output for the system peer.
pub fn parse_variables(stdout: &str, syspeer_assid: u32, data: &mut NtpData) {
    let mut context: u32 = 0;
    for line in stdout.lines() {
        for piece in line.split(',') {
            for token in piece.split_whitespace() {
                let mut halves = token.splitn(2, '=');
                let key = match halves.next() {
                    Some(k) => k,
                    None => continue,
                };
                let value = match halves.next() {
                    Some(v) => v,
                    None => continue,
                };
                if key == "associd" {
                    context = value.parse().unwrap_or(0);
                    continue;
                }
                if context != syspeer_assid {
                    continue;
                }
                for &(var, canonical, conv) in PEER_VARS {
                    if var == key {
                        if let Some(n) = convert(value, conv) {
                            data.syspeer.insert(canonical.to_string(), n);
                        }
                        break;
                    }
                }
            }
        }
    }
}

/// Parse one peer-table row. The first column is the flash character,
/// possibly a space.
fn parse_peer_row(line: &str) -> Option<Peer> {
    let mut chars = line.char_indices();
    let (_, flash) = chars.next()?;
    let rest = match chars.next() {
        Some((idx, _)) => &line[idx..],
        None => return None,
    };
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() != 11 {
        return None;
    }
    let assid = fields[2].parse::<u32>().ok()?;
    let stratum = fields[3].parse::<f64>().ok()?;
    let reach = u8::from_str_radix(fields[7], 8).ok()?;
    Some(Peer {
        remote: fields[0].to_string(),
        refid: fields[1].to_string(),
        assid: assid,
        stratum: stratum,
        when: duration_secs(fields[5])?,
        poll: duration_secs(fields[6])?,
        failed_polls: f64::from(failed_polls(reach)),
        delay: fields[8].parse().ok()?,
        offset: fields[9].parse().ok()?,
        jitter: fields[10].parse().ok()?,
        state: peer_state(flash),
    })
}

/// ntpq prints intervals as bare seconds or with an m/h/d suffix; a `-`
/// means "never".
fn duration_secs(raw: &str) -> Option<f64> {
    if raw == "-" {
        return Some(0.0);
    }
    let (digits, scale) = match raw.chars().last()? {
        'm' => (&raw[..raw.len() - 1], 60.0),
        'h' => (&raw[..raw.len() - 1], 3_600.0),
        'd' => (&raw[..raw.len() - 1], 86_400.0),
        _ => (raw, 1.0),
    };
    digits.parse::<f64>().ok().map(|v| v * scale)
}

fn split_colon(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(':')?;
    Some((line[..idx].trim(), line[idx + 1..].trim()))
}

fn convert(value: &str, conv: Conv) -> Option<f64> {
    let token = value.split_whitespace().next()?;
    match conv {
        Conv::Plain => token.parse::<f64>().ok(),
        Conv::Base2 => i64::from_str_radix(token, 2).ok().map(|v| v as f64),
        Conv::Timestamp => timestamp_to_epoch(token),
    }
}
