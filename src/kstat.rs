//! Adapter over the host's kernel statistics facility.
//!
//! Collectors describe what they want with a `Query`, get back `Kstat`
//! records, and project matching records into metric tuples through a
//! declarative `Translation` table. The concrete reader shells out to
//! kstat(1M); tests substitute their own `Reader`.

use metric::{self, Metric, MetricKind};
use std::collections::HashMap;
use std::process::Command;

/// Placeholder in a query's `name` or `instance` that is replaced with
/// the target zone's kernel instance id before the query runs.
pub const INSTANCE_TOKEN: &'static str = "<instanceId>";

/// A kstat selector. Empty fields match everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    /// Statistic class, e.g. `misc` or `net`.
    pub class: Option<String>,
    /// Module, e.g. `zfs` or `link`.
    pub module: Option<String>,
    /// Statistic name, possibly carrying `<instanceId>`.
    pub name: Option<String>,
    /// Instance, possibly carrying `<instanceId>`.
    pub instance: Option<String>,
}

impl Query {
    /// Substitute `<instanceId>` placeholders with a concrete id.
    pub fn instantiate(&self, instance_id: i64) -> Query {
        let id = instance_id.to_string();
        let swap = |field: &Option<String>| {
            field
                .as_ref()
                .map(|v| v.replace(INSTANCE_TOKEN, &id))
        };
        Query {
            class: self.class.clone(),
            module: swap(&self.module),
            name: swap(&self.name),
            instance: swap(&self.instance),
        }
    }
}

/// One named statistic inside a kstat record.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Numeric statistic.
    Number(f64),
    /// Non-numeric statistic, e.g. a zonename.
    Text(String),
}

impl Value {
    /// Numeric content, if any.
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Value::Number(n) => Some(n),
            Value::Text(_) => None,
        }
    }

    /// Textual content, if any.
    pub fn as_text(&self) -> Option<&str> {
        match *self {
            Value::Number(_) => None,
            Value::Text(ref t) => Some(t),
        }
    }
}

/// One kstat record.
#[derive(Clone, Debug)]
pub struct Kstat {
    /// Statistic class.
    pub class: String,
    /// Module that published the record.
    pub module: String,
    /// Record name.
    pub name: String,
    /// Kernel instance id.
    pub instance: i64,
    /// Data snapshot time, seconds.
    pub snaptime: f64,
    /// Record creation time, seconds.
    pub crtime: f64,
    /// Named statistics.
    pub data: HashMap<String, Value>,
}

impl Kstat {
    fn empty(module: &str, instance: i64, name: &str) -> Kstat {
        Kstat {
            class: String::new(),
            module: module.to_string(),
            name: name.to_string(),
            instance: instance,
            snaptime: 0.0,
            crtime: 0.0,
            data: HashMap::new(),
        }
    }
}

/// Something that can answer kstat queries.
pub trait Reader: Send + Sync {
    /// Return every record matching the query.
    fn read(&self, query: &Query) -> Result<Vec<Kstat>, metric::Error>;
}

/// `Reader` that shells out to kstat(1M) in parseable-output mode.
pub struct CliReader {
    path: String,
}

impl CliReader {
    /// A reader using the stock kstat path.
    pub fn new() -> CliReader {
        CliReader {
            path: "/usr/bin/kstat".to_string(),
        }
    }
}

impl Default for CliReader {
    fn default() -> CliReader {
        CliReader::new()
    }
}

impl Reader for CliReader {
    fn read(&self, query: &Query) -> Result<Vec<Kstat>, metric::Error> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("-p");
        if let Some(ref class) = query.class {
            cmd.arg("-c").arg(class);
        }
        if let Some(ref module) = query.module {
            cmd.arg("-m").arg(module);
        }
        if let Some(ref instance) = query.instance {
            cmd.arg("-i").arg(instance);
        }
        if let Some(ref name) = query.name {
            cmd.arg("-n").arg(name);
        }
        let output = cmd.output()?;
        if !output.status.success() {
            // kstat exits nonzero with empty output when nothing matches
            if output.stdout.is_empty() {
                return Ok(Vec::new());
            }
            return Err(metric::Error::NotAvailable(format!(
                "kstat exited {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        parse(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse kstat(1M) `-p` output into records.
///
/// Each line is `module:instance:name:statistic<TAB>value`. The
/// pseudo-statistics `class`, `crtime` and `snaptime` are folded into the
/// record itself.
pub fn parse(output: &str) -> Result<Vec<Kstat>, metric::Error> {
    let mut records: Vec<Kstat> = Vec::new();
    let mut index: HashMap<(String, i64, String), usize> = HashMap::new();
    for line in output.lines() {
        if line.is_empty() {
            continue;
        }
        let (selector, value) = match line.find('\t') {
            Some(idx) => (&line[..idx], line[idx + 1..].trim()),
            None => {
                return Err(metric::Error::Malformed(
                    format!("kstat line without value: {:?}", line),
                ))
            }
        };
        let parts: Vec<&str> = selector.splitn(4, ':').collect();
        if parts.len() != 4 {
            return Err(metric::Error::Malformed(
                format!("kstat selector too short: {:?}", selector),
            ));
        }
        let instance = parts[1].parse::<i64>().map_err(|_| {
            metric::Error::Malformed(
                format!("kstat instance is not a number: {:?}", parts[1]),
            )
        })?;
        let key = (parts[0].to_string(), instance, parts[2].to_string());
        let idx = match index.get(&key) {
            Some(&idx) => idx,
            None => {
                records.push(Kstat::empty(parts[0], instance, parts[2]));
                index.insert(key, records.len() - 1);
                records.len() - 1
            }
        };
        let record = &mut records[idx];
        match parts[3] {
            "class" => record.class = value.to_string(),
            "crtime" => record.crtime = value.parse().unwrap_or(0.0),
            "snaptime" => record.snaptime = value.parse().unwrap_or(0.0),
            stat => {
                let parsed = match value.parse::<f64>() {
                    Ok(n) => Value::Number(n),
                    Err(_) => Value::Text(value.to_string()),
                };
                record.data.insert(stat.to_string(), parsed);
            }
        }
    }
    Ok(records)
}

/// One row of a projection map: which statistic becomes which metric.
pub struct Translation {
    /// Statistic name inside the kstat record.
    pub stat: &'static str,
    /// Metric family name to emit.
    pub name: &'static str,
    /// Metric family type.
    pub kind: MetricKind,
    /// Help text.
    pub help: &'static str,
    /// Optional pure rescaling applied before formatting.
    pub modifier: Option<fn(f64) -> f64>,
}

/// Nanoseconds to seconds.
pub fn ns_to_sec(v: f64) -> f64 {
    v / 1e9
}

/// Fixed-point load average scaling.
pub fn load_avg(v: f64) -> f64 {
    v / 256.0
}

/// Project records through a translation table.
///
/// Records are sorted by name first so metric ordering is stable across
/// runs. With more than one record the caller must supply a `labeler`
/// deriving a label group from each record; `(name, label)` pairs must
/// be unique. A statistic named by the table but absent (or non-numeric)
/// in a record fails the whole projection with an aggregate error.
pub fn project(
    records: &[Kstat],
    map: &[Translation],
    labeler: Option<&Fn(&Kstat) -> String>,
) -> Result<Vec<Metric>, metric::Error> {
    if records.len() > 1 && labeler.is_none() {
        return Err(metric::Error::Fatal(
            "multiple kstat records require a labeler".to_string(),
        ));
    }
    let mut sorted: Vec<&Kstat> = records.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut res = Vec::with_capacity(sorted.len() * map.len());
    let mut seen: Vec<(String, Option<String>)> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    for record in sorted {
        let label = labeler.map(|l| l(record));
        for translation in map {
            let number = record
                .data
                .get(translation.stat)
                .and_then(|v| v.as_number());
            let number = match number {
                Some(n) => n,
                None => {
                    missing.push(format!("{}:{}", record.name, translation.stat));
                    continue;
                }
            };
            let value = match translation.modifier {
                Some(modifier) => modifier(number),
                None => number,
            };
            let series = (translation.name.to_string(), label.clone());
            if seen.contains(&series) {
                return Err(metric::Error::Fatal(format!(
                    "duplicate labeled metric {}{}",
                    translation.name,
                    label.as_ref().map(|l| l.as_str()).unwrap_or("")
                )));
            }
            seen.push(series);
            let mut m = Metric::new(
                translation.name,
                translation.kind,
                format_number(value),
                translation.help,
            );
            if let Some(ref l) = label {
                m = m.label(l.clone());
            }
            res.push(m);
        }
    }
    if !missing.is_empty() {
        return Err(metric::Error::Fatal(
            format!("kstat statistics missing: {}", missing.join(", ")),
        ));
    }
    Ok(res)
}

/// Format a number without a float round-trip for integral values.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}
