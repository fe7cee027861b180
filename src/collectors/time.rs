//! Wall-clock time for every target, mostly useful to spot agents whose
//! clock has wandered from the poller's.

use collector::{Collector, Options};
use metric::{self, Metric, MetricKind};
use zones::ZoneInfo;

pub struct Time {
    timestamp: fn() -> i64,
}

impl Time {
    pub fn new(opts: &Options) -> Time {
        Time {
            timestamp: opts.timestamp,
        }
    }
}

impl Collector for Time {
    fn get_metrics(&self, _zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let now = (self.timestamp)();
        Ok(vec![
            Metric::new(
                "time_of_day",
                MetricKind::Counter,
                now.to_string(),
                "System time in seconds since epoch",
            ),
        ])
    }

    // never cached; every poll sees the current clock
    fn cache_ttl(&self) -> i64 {
        -1
    }
}
