//! `metric` holds the abstract datatype that zmond's collection pipeline
//! operates over, plus the serializer that turns a run of them into the
//! Prometheus text exposition format. Every collector, parser and plugin
//! produces `metric::Metric` and nothing else; the orchestrator owns the
//! only serialization point.

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::io;

lazy_static! {
    static ref METRIC_NAME: Regex =
        Regex::new(r"^[A-Za-z_:][A-Za-z0-9_:]*$").unwrap();
}

/// Check a metric family name against the prometheus naming rule.
pub fn valid_name(name: &str) -> bool {
    METRIC_NAME.is_match(name)
}

/// The type of a metric family.
///
/// `Option` is an in-band control record, not a metric: the only
/// recognized option is `ttl`, which overrides the producing collector's
/// cache TTL for the current result. Options never reach the poller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Option,
}

impl MetricKind {
    /// The prometheus spelling of the kind.
    pub fn as_str(&self) -> &'static str {
        match *self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
            MetricKind::Option => "option",
        }
    }
}

/// Which parser produced a tuple.
///
/// Native tuples carry a single value in `value`; prometheus tuples carry
/// a verbatim block of value lines, labels included, and are emitted
/// as-is under the de-duplicated family header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Native,
    Prometheus,
}

/// The universal currency of the collection pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// Family name. Must satisfy `valid_name`.
    pub name: String,
    /// Family type.
    pub kind: MetricKind,
    /// Value, kept as a string end to end so numeric content is never
    /// reformatted through a float round-trip.
    pub value: String,
    /// Human-readable help text.
    pub help: String,
    /// Optional label group, already formatted as `{k1="v1",k2="v2"}`.
    pub label: Option<String>,
    /// Origin format of the tuple.
    pub format: Format,
}

impl Metric {
    /// Create a native-format tuple with no label.
    pub fn new<S, T, U>(name: S, kind: MetricKind, value: T, help: U) -> Metric
    where
        S: Into<String>,
        T: Into<String>,
        U: Into<String>,
    {
        Metric {
            name: name.into(),
            kind: kind,
            value: value.into(),
            help: help.into(),
            label: None,
            format: Format::Native,
        }
    }

    /// Attach a pre-formatted label group.
    pub fn label(mut self, label: String) -> Metric {
        self.label = Some(label);
        self
    }

    /// Mark the tuple as carrying a verbatim prometheus value block.
    pub fn prometheus(mut self) -> Metric {
        self.format = Format::Prometheus;
        self
    }

    /// True for in-band option records.
    pub fn is_option(&self) -> bool {
        self.kind == MetricKind::Option
    }
}

/// Errors that can strike the collection pipeline.
///
/// These are contracts, not just payloads: `NotFound` surfaces to the
/// poller as 404, `Fatal` as 500, and `NotAvailable` / `Malformed` are
/// absorbed at the collector boundary without failing the request.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The target zone does not exist, is stopped, or its data is
    /// presently empty where empty is not acceptable.
    NotFound(String),
    /// An upstream dependency is down or over capacity.
    NotAvailable(String),
    /// A parser rejected its input.
    Malformed(String),
    /// An invariant was violated; the current request must abort.
    Fatal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::NotFound(ref msg) => write!(f, "not found: {}", msg),
            Error::NotAvailable(ref msg) => write!(f, "not available: {}", msg),
            Error::Malformed(ref msg) => write!(f, "malformed: {}", msg),
            Error::Fatal(ref msg) => write!(f, "fatal: {}", msg),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::NotAvailable(e.to_string())
    }
}

/// Serialize a run of tuples to prometheus text.
///
/// `# HELP` / `# TYPE` are emitted exactly once per family name, at the
/// first occurrence; subsequent tuples for the same family contribute
/// only value lines. Family order follows input order, as does series
/// order within a family. A duplicate `(name, label)` pair is a
/// programmer error and aborts with `Error::Fatal`.
pub fn emit(metrics: &[Metric]) -> Result<String, Error> {
    let mut buf = String::with_capacity(2_048);
    let mut headered: HashSet<&str> = HashSet::new();
    let mut series: HashSet<(&str, &str)> = HashSet::new();
    for m in metrics {
        if m.is_option() {
            continue;
        }
        if !valid_name(&m.name) {
            return Err(Error::Malformed(
                format!("invalid metric name {:?}", m.name),
            ));
        }
        if headered.insert(m.name.as_str()) {
            buf.push_str("# HELP ");
            buf.push_str(&m.name);
            buf.push_str(" ");
            buf.push_str(&m.help);
            buf.push_str("\n# TYPE ");
            buf.push_str(&m.name);
            buf.push_str(" ");
            buf.push_str(m.kind.as_str());
            buf.push_str("\n");
        }
        match m.format {
            Format::Prometheus => {
                if !m.value.is_empty() {
                    buf.push_str(&m.value);
                    if !m.value.ends_with('\n') {
                        buf.push_str("\n");
                    }
                }
            }
            Format::Native => {
                let label = m.label.as_ref().map(|l| l.as_str()).unwrap_or("");
                if !series.insert((m.name.as_str(), label)) {
                    return Err(Error::Fatal(
                        format!("duplicate metric series {}{}", m.name, label),
                    ));
                }
                buf.push_str(&m.name);
                buf.push_str(label);
                buf.push_str(" ");
                buf.push_str(&m.value);
                buf.push_str("\n");
            }
        }
    }
    Ok(buf)
}
