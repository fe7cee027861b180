//! Parsers that lift metric text into `metric::Metric` tuples.
//!
//! Two wire formats reach zmond: the tab-separated native format spoken
//! by plugin scripts, and the Prometheus text exposition format spoken by
//! both plugins and core-zone sidecars. Both parsers validate family
//! names with `metric::valid_name` and reject what the poller should
//! never see.

pub mod native;
pub mod prometheus;
