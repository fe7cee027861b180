//! Sidecar metrics of core service zones.
//!
//! A core zone publishes Prometheus text on its admin network; all of
//! its configured metric ports are scraped concurrently and the bodies
//! re-parsed so family headers de-duplicate in the final document.

use acquire::sidecar;
use collector::{Collector, Options};
use metric::{self, Metric};
use protocols::prometheus;
use std::sync::Arc;
use zones::ZoneInfo;

pub struct TritonCore {
    scraper: Arc<sidecar::Scraper>,
}

impl TritonCore {
    pub fn new(opts: &Options) -> TritonCore {
        TritonCore {
            scraper: Arc::clone(&opts.scraper),
        }
    }
}

impl Collector for TritonCore {
    fn get_metrics(&self, zone: &ZoneInfo) -> Result<Vec<Metric>, metric::Error> {
        let core = match zone.core {
            Some(ref core) => core,
            None => return Ok(Vec::new()),
        };
        let text =
            sidecar::scrape_all(&self.scraper, &core.admin_ip, &core.metric_ports);
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let mut res = Vec::new();
        prometheus::parse(&text, "", &mut res)?;
        Ok(res)
    }

    fn cache_ttl(&self) -> i64 {
        10
    }

    fn core_zone_only(&self) -> bool {
        true
    }

    // every port may be down without failing the zone's poll
    fn empty_ok(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector::Collector;
    use collectors::fake::{FailScraper, TextScraper};
    use collectors::test_options;
    use zones::{CoreZone, ZoneInfo};

    fn core_zone() -> ZoneInfo {
        ZoneInfo {
            zonename: "61c64afd-6c69-44b3-94fc-bcd17234e268".to_string(),
            instance_id: 26,
            core: Some(CoreZone {
                admin_ip: "10.0.0.17".to_string(),
                metric_ports: vec![8881],
            }),
        }
    }

    #[test]
    fn test_scrapes_and_parses() {
        let mut opts = test_options();
        opts.scraper = ::std::sync::Arc::new(TextScraper(
            "# HELP vmapi_requests_total completed requests\n\
             # TYPE vmapi_requests_total counter\n\
             vmapi_requests_total{code=\"200\"} 7816\n"
                .to_string(),
        ));
        let collector = TritonCore::new(&opts);
        let ms = collector.get_metrics(&core_zone()).unwrap();
        assert_eq!(ms.len(), 1);
        assert_eq!(ms[0].name, "vmapi_requests_total");
        assert!(ms[0].value.contains("code=\"200\""));
        assert!(collector.core_zone_only());
    }

    #[test]
    fn test_all_ports_down_is_empty() {
        let mut opts = test_options();
        opts.scraper = ::std::sync::Arc::new(FailScraper);
        let collector = TritonCore::new(&opts);
        assert!(collector.get_metrics(&core_zone()).unwrap().is_empty());
        assert!(collector.empty_ok());
    }

    #[test]
    fn test_garbage_body_is_malformed() {
        let mut opts = test_options();
        opts.scraper =
            ::std::sync::Arc::new(TextScraper("orphan 12\n".to_string()));
        let collector = TritonCore::new(&opts);
        match collector.get_metrics(&core_zone()) {
            Err(::metric::Error::Malformed(_)) => {}
            other => panic!("expected malformed, got {:?}", other),
        }
    }
}
