//! Tiny, unassuming HTTP server: the agent's whole REST surface.
//!
//! Two endpoints. `GET /v1/<target>/metrics` answers prometheus text
//! for `gz` or a zone UUID; `POST /v1/refresh` forces a zone registry
//! refresh. A small pool of workers shares one accept queue; requests
//! are audited with their status and latency.

use agent::{self, Agent};
use metric;
use regex::Regex;
use std::sync::Arc;
use std::thread;
use tiny_http;
use time;
use uuid::Uuid;

lazy_static! {
    static ref METRICS_PATH: Regex =
        Regex::new(r"^/v1/([^/]+)/metrics$").unwrap();
}

/// Bind and start serving on detached worker threads. The workers run
/// for the life of the process; shutdown is the binary's signal exit.
pub fn serve(
    agent: Arc<Agent>,
    host: &str,
    port: u16,
    workers: usize,
) -> Result<(), metric::Error> {
    let server = tiny_http::Server::http((host, port)).map_err(|e| {
        metric::Error::Fatal(format!("unable to bind {}:{}: {}", host, port, e))
    })?;
    let server = Arc::new(server);
    for _ in 0..workers {
        let server = Arc::clone(&server);
        let agent = Arc::clone(&agent);
        thread::spawn(move || loop {
            match server.recv() {
                Ok(request) => handle(&agent, request),
                Err(e) => {
                    warn!("failed to accept request: {}", e);
                }
            }
        });
    }
    Ok(())
}

fn handle(agent: &Agent, request: tiny_http::Request) {
    let started = time::monotonic_millis();
    let method = request.method().clone();
    let url = request.url().to_string();
    let (status, body) = route(agent, &method, &url);
    info!(
        "{:?} {} -> {} ({}ms)",
        method,
        url,
        status,
        time::monotonic_millis() - started
    );
    let response = tiny_http::Response::from_string(body)
        .with_status_code(status)
        .with_header(content_type_text());
    if let Err(e) = request.respond(response) {
        warn!("unable to respond to {:?} {}: {}", method, url, e);
    }
}

/// Dispatch one request to the agent, yielding status and body.
pub fn route(agent: &Agent, method: &tiny_http::Method, url: &str) -> (u16, String) {
    match *method {
        tiny_http::Method::Get => {
            let target = match METRICS_PATH
                .captures(url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str())
            {
                Some(target) => target,
                None => return (404, "no such resource\n".to_string()),
            };
            if target != "gz" && Uuid::parse_str(target).is_err() {
                return (404, "no such target\n".to_string());
            }
            match agent.metrics(target) {
                Ok(body) => (200, body),
                Err(agent::Error::NotFound(msg)) => (404, format!("{}\n", msg)),
                Err(e) => {
                    error!("request for {} failed: {}", target, e);
                    (500, "internal error\n".to_string())
                }
            }
        }
        tiny_http::Method::Post => {
            if url != "/v1/refresh" {
                return (404, "no such resource\n".to_string());
            }
            match agent.refresh() {
                Ok(()) => (200, String::new()),
                Err(e) => {
                    error!("zone refresh failed: {}", e);
                    (500, "internal error\n".to_string())
                }
            }
        }
        _ => (404, "no such resource\n".to_string()),
    }
}

fn content_type_text() -> tiny_http::Header {
    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/plain"[..])
        .expect("static header must parse")
}

#[cfg(test)]
mod tests {
    use super::*;
    use acquire::vm;
    use acquire::zone::{self as zone_acquire, ListEntry};
    use collectors::fake::FakeKstat;
    use collectors::test_options;
    use std::sync::Arc;
    use tiny_http::Method;

    struct EmptyLister;

    impl zone_acquire::Lister for EmptyLister {
        fn running(&self) -> Result<Vec<ListEntry>, ::metric::Error> {
            Ok(Vec::new())
        }
    }

    struct NoLoader;

    impl vm::Loader for NoLoader {
        fn load(&self, _: &str) -> Result<Option<vm::Vm>, ::metric::Error> {
            Ok(None)
        }
    }

    fn test_agent() -> Agent {
        let opts = test_options();
        let registry = Arc::new(::zones::Registry::new(
            Arc::new(EmptyLister),
            Arc::new(NoLoader),
            Arc::new(FakeKstat::empty()),
            String::new(),
        ));
        registry.refresh().unwrap();
        Agent::new(&opts, registry)
    }

    #[test]
    fn test_route_unknown_path_is_404() {
        let agent = test_agent();
        assert_eq!(route(&agent, &Method::Get, "/nope").0, 404);
        assert_eq!(route(&agent, &Method::Get, "/v1/metrics").0, 404);
        assert_eq!(route(&agent, &Method::Delete, "/v1/refresh").0, 404);
    }

    #[test]
    fn test_route_bad_target_is_404() {
        let agent = test_agent();
        let (status, _) = route(&agent, &Method::Get, "/v1/bogus/metrics");
        assert_eq!(status, 404);
    }

    #[test]
    fn test_route_stopped_zone_is_404() {
        let agent = test_agent();
        let (status, _) = route(
            &agent,
            &Method::Get,
            "/v1/61c64afd-6c69-44b3-94fc-bcd17234e268/metrics",
        );
        assert_eq!(status, 404);
    }

    #[test]
    fn test_route_refresh() {
        let agent = test_agent();
        let (status, body) = route(&agent, &Method::Post, "/v1/refresh");
        assert_eq!(status, 200);
        assert_eq!(body, "");
    }
}
