//! NTP daemon health for the global zone.
//!
//! Flattens the acquisition module's structure into `ntp_*` families:
//! system scalars unlabeled, the peer table labeled by remote address
//! and association id, and the system peer's variables as
//! `ntp_syspeer_*`. A host whose daemon is down contributes no families
//! at all.

use acquire::ntp;
use collector::{Collector, Options};
use kstat::format_number;
use metric::{self, Metric, MetricKind};
use std::sync::Arc;
use zones::ZoneInfo;

const SYSTEM: &'static [(&'static str, &'static str, MetricKind, &'static str)] = &[
    ("time_since_reset", "ntp_io_time_since_reset_seconds", MetricKind::Counter, "Seconds since the IO counters were reset"),
    ("receive_buffers", "ntp_io_receive_buffers", MetricKind::Gauge, "Receive buffers allocated"),
    ("free_receive_buffers", "ntp_io_free_receive_buffers", MetricKind::Gauge, "Receive buffers free"),
    ("used_receive_buffers", "ntp_io_used_receive_buffers", MetricKind::Gauge, "Receive buffers in use"),
    ("low_water_refills", "ntp_io_low_water_refills_total", MetricKind::Counter, "Times the buffer pool was refilled"),
    ("dropped_packets", "ntp_io_dropped_packets_total", MetricKind::Counter, "Packets dropped"),
    ("ignored_packets", "ntp_io_ignored_packets_total", MetricKind::Counter, "Packets ignored"),
    ("received_packets", "ntp_io_received_packets_total", MetricKind::Counter, "Packets received"),
    ("packets_sent", "ntp_io_sent_packets_total", MetricKind::Counter, "Packets sent"),
    ("packet_send_failures", "ntp_io_send_failures_total", MetricKind::Counter, "Packet send failures"),
    ("input_wakeups", "ntp_io_input_wakeups_total", MetricKind::Counter, "Input wakeups"),
    ("useful_input_wakeups", "ntp_io_useful_input_wakeups_total", MetricKind::Counter, "Useful input wakeups"),
    ("pll_offset", "ntp_kern_pll_offset_milliseconds", MetricKind::Gauge, "Kernel PLL offset"),
    ("pll_frequency", "ntp_kern_pll_frequency_ppm", MetricKind::Gauge, "Kernel PLL frequency"),
    ("maximum_error", "ntp_kern_max_error_milliseconds", MetricKind::Gauge, "Maximum error"),
    ("estimated_error", "ntp_kern_estimated_error_milliseconds", MetricKind::Gauge, "Estimated error"),
    ("pll_time_constant", "ntp_kern_pll_time_constant", MetricKind::Gauge, "Kernel PLL time constant"),
    ("precision", "ntp_kern_precision_milliseconds", MetricKind::Gauge, "Kernel clock precision"),
    ("frequency_tolerance", "ntp_kern_frequency_tolerance_ppm", MetricKind::Gauge, "Frequency tolerance"),
    ("pps_frequency", "ntp_kern_pps_frequency_ppm", MetricKind::Gauge, "PPS frequency"),
    ("pps_stability", "ntp_kern_pps_stability_ppm", MetricKind::Gauge, "PPS stability"),
    ("pps_jitter", "ntp_kern_pps_jitter_milliseconds", MetricKind::Gauge, "PPS jitter"),
    ("calibration_interval", "ntp_kern_calibration_interval_seconds", MetricKind::Gauge, "PPS calibration interval"),
    ("calibration_cycles", "ntp_kern_calibration_cycles_total", MetricKind::Counter, "PPS calibration cycles"),
    ("jitter_exceeded", "ntp_kern_jitter_exceeded_total", MetricKind::Counter, "PPS jitter limit exceedances"),
    ("stability_exceeded", "ntp_kern_stability_exceeded_total", MetricKind::Counter, "PPS stability limit exceedances"),
    ("calibration_errors", "ntp_kern_calibration_errors_total", MetricKind::Counter, "PPS calibration errors"),
    ("mru_addresses", "ntp_mru_addresses", MetricKind::Gauge, "MRU addresses tracked"),
    ("mru_peak_addresses", "ntp_mru_peak_addresses", MetricKind::Gauge, "Peak MRU addresses tracked"),
    ("mru_maximum_addresses", "ntp_mru_max_addresses", MetricKind::Gauge, "MRU address limit"),
    ("mru_reclaim_above_count", "ntp_mru_reclaim_above_count", MetricKind::Gauge, "MRU reclaim threshold"),
    ("mru_reclaim_older_than", "ntp_mru_reclaim_older_than_seconds", MetricKind::Gauge, "MRU reclaim age"),
    ("mru_kilobytes", "ntp_mru_kilobytes", MetricKind::Gauge, "MRU memory in use"),
    ("mru_maximum_kilobytes", "ntp_mru_max_kilobytes", MetricKind::Gauge, "MRU memory limit"),
    ("leap_indicator", "ntp_leap_indicator", MetricKind::Gauge, "Leap indicator"),
    ("stratum", "ntp_stratum", MetricKind::Gauge, "Stratum of the local clock"),
    ("log2_precision", "ntp_precision_log2_seconds", MetricKind::Gauge, "Clock precision"),
    ("root_delay", "ntp_root_delay_milliseconds", MetricKind::Gauge, "Delay to the root reference"),
    ("root_dispersion", "ntp_root_dispersion_milliseconds", MetricKind::Gauge, "Dispersion to the root reference"),
    ("reference_time", "ntp_reference_time_seconds", MetricKind::Gauge, "Time of the last clock update"),
    ("system_jitter", "ntp_system_jitter", MetricKind::Gauge, "Combined system jitter"),
    ("clock_jitter", "ntp_clock_jitter_milliseconds", MetricKind::Gauge, "Clock jitter"),
    ("clock_wander", "ntp_clock_wander_ppm", MetricKind::Gauge, "Clock frequency wander"),
    ("broadcast_delay", "ntp_broadcast_delay_milliseconds", MetricKind::Gauge, "Broadcast client default delay"),
    ("symm_auth_delay", "ntp_auth_delay_milliseconds", MetricKind::Gauge, "Symmetric authentication delay"),
    ("uptime", "ntp_uptime_seconds", MetricKind::Counter, "Seconds the daemon has been running"),
    ("sysstats_reset", "ntp_sysstats_reset_seconds", MetricKind::Counter, "Seconds since system stats were reset"),
    ("packets_received", "ntp_packets_received_total", MetricKind::Counter, "Packets received"),
    ("current_version", "ntp_current_version_packets_total", MetricKind::Counter, "Current-version packets received"),
    ("older_version", "ntp_old_version_packets_total", MetricKind::Counter, "Older-version packets received"),
    ("bad_length_or_format", "ntp_bad_length_or_format_total", MetricKind::Counter, "Packets with bad length or format"),
    ("authentication_failed", "ntp_auth_failed_total", MetricKind::Counter, "Packets failing authentication"),
    ("declined", "ntp_declined_total", MetricKind::Counter, "Requests declined"),
    ("restricted", "ntp_restricted_total", MetricKind::Counter, "Requests rejected by restrictions"),
    ("rate_limited", "ntp_rate_limited_total", MetricKind::Counter, "Responses rate limited"),
    ("kod_responses", "ntp_kod_responses_total", MetricKind::Counter, "Kiss-of-death responses sent"),
    ("processed_for_time", "ntp_processed_for_time_total", MetricKind::Counter, "Packets used for time"),
];

const SYSPEER: &'static [(&'static str, &'static str, &'static str)] = &[
    ("leap_indicator", "ntp_syspeer_leap_indicator", "System peer leap indicator"),
    ("stratum", "ntp_syspeer_stratum", "System peer stratum"),
    ("precision", "ntp_syspeer_precision_log2_seconds", "System peer precision"),
    ("root_delay", "ntp_syspeer_root_delay_milliseconds", "System peer root delay"),
    ("root_dispersion", "ntp_syspeer_root_dispersion_milliseconds", "System peer root dispersion"),
    ("reference_time", "ntp_syspeer_reference_time_seconds", "System peer reference time"),
    ("last_received_time", "ntp_syspeer_last_received_time_seconds", "Time of the system peer's last packet"),
    ("host_poll", "ntp_syspeer_host_poll_log2_seconds", "Host poll exponent"),
    ("peer_poll", "ntp_syspeer_peer_poll_log2_seconds", "Peer poll exponent"),
    ("headway", "ntp_syspeer_headway", "System peer headway"),
    ("offset", "ntp_syspeer_offset_milliseconds", "Offset against the system peer"),
    ("delay", "ntp_syspeer_delay_milliseconds", "Delay to the system peer"),
    ("dispersion", "ntp_syspeer_dispersion_milliseconds", "Dispersion of the system peer"),
    ("jitter", "ntp_syspeer_jitter_milliseconds", "Jitter of the system peer"),
    ("interleave_delay", "ntp_syspeer_interleave_delay_milliseconds", "Interleave delay"),
];

pub struct Ntp {
    source: Arc<ntp::Source>,
}

impl Ntp {
    pub fn new(opts: &Options) -> Ntp {
        Ntp {
            source: Arc::clone(&opts.ntp),
        }
    }
}

impl Collector for Ntp {
    fn get_metrics(&self, _zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let data = ntp::fetch(self.source.as_ref())?;
        if !data.available {
            return Ok(Vec::new());
        }
        let mut res = Vec::new();
        for &(key, name, kind, help) in SYSTEM {
            if let Some(v) = data.system.get(key) {
                res.push(Metric::new(name, kind, format_number(*v), help));
            }
        }
        for peer in &data.peers {
            let label =
                format!("{{remote=\"{}\",assid=\"{}\"}}", peer.remote, peer.assid);
            let series: &[(&str, f64, &str)] = &[
                ("ntp_peer_stratum", peer.stratum, "Peer stratum"),
                (
                    "ntp_peer_state",
                    f64::from(peer.state),
                    "Peer admission state",
                ),
                (
                    "ntp_peer_unreachable_polls",
                    peer.failed_polls,
                    "Failed polls of the last eight",
                ),
                (
                    "ntp_peer_last_contact_seconds",
                    peer.when,
                    "Seconds since the peer was heard",
                ),
                (
                    "ntp_peer_poll_interval_seconds",
                    peer.poll,
                    "Peer polling interval",
                ),
                ("ntp_peer_delay_milliseconds", peer.delay, "Delay to the peer"),
                (
                    "ntp_peer_offset_milliseconds",
                    peer.offset,
                    "Offset against the peer",
                ),
                (
                    "ntp_peer_jitter_milliseconds",
                    peer.jitter,
                    "Jitter of the peer",
                ),
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
        for &(key, name, help) in SYSPEER {
            if let Some(v) = data.syspeer.get(key) {
                res.push(Metric::new(
                    name,
                    MetricKind::Gauge,
                    format_number(*v),
                    help,
                ));
            }
        }
        Ok(res)
    }

    fn cache_ttl(&self) -> i64 {
        60
    }

    // a host without a running ntpd still answers its poll
    fn empty_ok(&self) -> bool {
        true
    }
}
