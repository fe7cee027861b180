//! Zmond is a per-host metrics agent. On demand it gathers heterogeneous
//! observability data about the host and every running zone on it and
//! answers in the Prometheus text exposition format. A remote poller asks
//! for `/v1/<target>/metrics` -- `gz` for the host, a UUID for a zone --
//! and zmond fans the request out over a registry of collectors, fronted
//! by a TTL cache so that expensive acquisitions are amortized across
//! polls.
//!
//! Why you might choose to run zmond:
//!
//!  * You poll per-zone metrics from a central Prometheus and want one
//!    agent per host rather than one exporter per zone.
//!  * You want operator-supplied plugin scripts executed under strict
//!    timeout, output and concurrency bounds.
//!  * You want core service zones scraped through their sidecar metric
//!    ports without exposing those ports beyond the admin network.
#![allow(unknown_lints)]
#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]
extern crate chrono;
extern crate clap;
extern crate glob;
extern crate hyper;
extern crate regex;
extern crate serde;
extern crate serde_json;
extern crate tiny_http;
extern crate toml;
extern crate uuid;

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_derive;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
extern crate tempdir;

pub mod acquire;
pub mod agent;
pub mod cache;
pub mod collector;
pub mod collectors;
pub mod config;
pub mod constants;
pub mod http;
pub mod kstat;
pub mod metric;
pub mod plugin;
pub mod protocols;
pub mod time;
pub mod zones;
