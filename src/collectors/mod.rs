//! The built-in collectors.
//!
//! One file per concern. Kstat-backed collectors declare a projection
//! table and lean on `kstat::project`; the rest normalize their
//! acquisition module's output by hand. Registration order lives in
//! `collector::Registry::new`.

pub mod arcstats;
pub mod cpu;
pub mod link;
pub mod memcap;
pub mod ntp;
pub mod plugin;
pub mod sidecar;
pub mod tcp;
pub mod time;
pub mod zfs;
pub mod zpool;

#[cfg(test)]
pub mod fake;

/// An options bag over inert fakes; tests override the seams they need.
#[cfg(test)]
pub fn test_options() -> ::collector::Options {
    use std::sync::Arc;

    ::collector::Options {
        kstat: Arc::new(fake::FakeKstat::empty()),
        ntp: Arc::new(fake::RefusedNtp),
        zfs: Arc::new(fake::FakeZfs::default()),
        pools: Arc::new(fake::FakePools(Vec::new())),
        scraper: Arc::new(fake::FailScraper),
        plugins_gz: None,
        plugins_vm: None,
        cache: ::cache::Cache::new(3_600),
        admin_uuid: String::new(),
        timestamp: ::time::now,
    }
}
