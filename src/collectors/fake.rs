//! Test doubles for every collector seam.

use acquire::{ntp, sidecar, zfs};
use kstat::{self, Kstat, Query, Value};
use metric;
use std::collections::HashMap;
use std::sync::Mutex;

/// Build a kstat record from a stat table.
pub fn kstat_record(
    module: &str,
    instance: i64,
    name: &str,
    class: &str,
    stats: &[(&str, f64)],
) -> Kstat {
    let mut data = HashMap::new();
    for &(stat, value) in stats {
        data.insert(stat.to_string(), Value::Number(value));
    }
    Kstat {
        class: class.to_string(),
        module: module.to_string(),
        name: name.to_string(),
        instance: instance,
        snaptime: 0.0,
        crtime: 0.0,
        data: data,
    }
}

/// Attach a text stat to a record.
pub fn with_text(mut record: Kstat, stat: &str, text: &str) -> Kstat {
    record
        .data
        .insert(stat.to_string(), Value::Text(text.to_string()));
    record
}

/// In-memory kstat reader with the same filter semantics the CLI
/// reader gets from kstat(1M).
pub struct FakeKstat {
    records: Mutex<Vec<Kstat>>,
}

impl FakeKstat {
    pub fn new(records: Vec<Kstat>) -> FakeKstat {
        FakeKstat {
            records: Mutex::new(records),
        }
    }

    pub fn empty() -> FakeKstat {
        FakeKstat::new(Vec::new())
    }

    pub fn replace(&self, records: Vec<Kstat>) {
        *self.records.lock().unwrap() = records;
    }
}

impl kstat::Reader for FakeKstat {
    fn read(&self, query: &Query) -> Result<Vec<Kstat>, metric::Error> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| query_matches(query, r))
            .cloned()
            .collect())
    }
}

fn query_matches(query: &Query, record: &Kstat) -> bool {
    if let Some(ref module) = query.module {
        if *module != record.module {
            return false;
        }
    }
    if let Some(ref class) = query.class {
        if *class != record.class {
            return false;
        }
    }
    if let Some(ref name) = query.name {
        if *name != record.name {
            return false;
        }
    }
    if let Some(ref instance) = query.instance {
        if instance.parse::<i64>().ok() != Some(record.instance) {
            return false;
        }
    }
    true
}

/// An NTP source whose daemon is down.
pub struct RefusedNtp;

impl ntp::Source for RefusedNtp {
    fn query(&self, _: &[&str]) -> Result<(String, String), metric::Error> {
        Ok((String::new(), ntp::CONNECTION_REFUSED.to_string()))
    }
}

/// An NTP source answering from canned output.
pub struct CannedNtp {
    pub report: String,
    pub readvar: String,
}

impl ntp::Source for CannedNtp {
    fn query(&self, commands: &[&str]) -> Result<(String, String), metric::Error> {
        if commands[0].starts_with("readvar") {
            Ok((self.readvar.clone(), String::new()))
        } else {
            Ok((self.report.clone(), String::new()))
        }
    }
}

/// Dataset usage from a fixed table.
#[derive(Default)]
pub struct FakeZfs(pub HashMap<String, f64>);

impl FakeZfs {
    /// A full property set, each value distinct.
    pub fn full() -> FakeZfs {
        let mut props = HashMap::new();
        for (i, prop) in zfs::DATASET_PROPS.iter().enumerate() {
            props.insert(prop.to_string(), (i as f64 + 1.0) * 1_000.0);
        }
        FakeZfs(props)
    }
}

impl zfs::UsageSource for FakeZfs {
    fn usage(&self, _: &str) -> Result<HashMap<String, f64>, metric::Error> {
        Ok(self.0.clone())
    }
}

/// Pool statistics from a fixed list.
pub struct FakePools(pub Vec<zfs::Pool>);

impl zfs::PoolSource for FakePools {
    fn pools(&self) -> Result<Vec<zfs::Pool>, metric::Error> {
        Ok(self.0.clone())
    }
}

/// A scraper with nothing listening.
pub struct FailScraper;

impl sidecar::Scraper for FailScraper {
    fn fetch(&self, url: &str) -> Result<String, metric::Error> {
        Err(metric::Error::NotAvailable(format!("no listener at {}", url)))
    }
}

/// A scraper answering every port with the same body.
pub struct TextScraper(pub String);

impl sidecar::Scraper for TextScraper {
    fn fetch(&self, _: &str) -> Result<String, metric::Error> {
        Ok(self.0.clone())
    }
}
