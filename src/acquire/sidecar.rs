//! Scraping of core-zone metric sidecars.
//!
//! Core service zones publish Prometheus text on one or more TCP ports
//! listed in their `customer_metadata.metricPorts`. All ports are
//! fetched concurrently, one task per port, and the successful bodies
//! are concatenated for downstream parsing. Retries are disabled to
//! bound tail latency; a port that fails simply contributes nothing.

use hyper;
use metric;
use std::io::Read;
use std::sync::Arc;
use std::thread;

/// Something that can fetch one URL.
pub trait Scraper: Send + Sync {
    /// GET a URL, returning the response body.
    fn fetch(&self, url: &str) -> Result<String, metric::Error>;
}

/// `Scraper` backed by a plain HTTP client.
///
/// No client-side deadline beyond connection and response defaults: the
/// poller's own deadline bounds timeliness.
pub struct HttpScraper;

impl Scraper for HttpScraper {
    fn fetch(&self, url: &str) -> Result<String, metric::Error> {
        let client = hyper::Client::new();
        let mut response = client.get(url).send().map_err(|e| {
            metric::Error::NotAvailable(format!("GET {}: {}", url, e))
        })?;
        if response.status != hyper::status::StatusCode::Ok {
            return Err(metric::Error::NotAvailable(
                format!("GET {}: {}", url, response.status),
            ));
        }
        let mut body = String::new();
        response.read_to_string(&mut body)?;
        Ok(body)
    }
}

/// Fetch `http://<admin_ip>:<port>/metrics` for every port in parallel
/// and join the successful bodies with newlines, in port order.
pub fn scrape_all(scraper: &Arc<Scraper>, admin_ip: &str, ports: &[u16]) -> String {
    let mut handles = Vec::with_capacity(ports.len());
    for &port in ports {
        let scraper = Arc::clone(scraper);
        let url = format!("http://{}:{}/metrics", admin_ip, port);
        handles.push(thread::spawn(move || match scraper.fetch(&url) {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("sidecar scrape failed: {}", e);
                None
            }
        }));
    }
    let mut bodies = Vec::new();
    for handle in handles {
        match handle.join() {
            Ok(Some(body)) => bodies.push(body),
            Ok(None) => {}
            Err(_) => warn!("sidecar scrape task panicked"),
        }
    }
    bodies.join("\n")
}
