#![allow(unknown_lints)]

extern crate chan_signal;
extern crate chrono;
extern crate fern;
extern crate zmond;

#[macro_use]
extern crate log;

use chrono::Utc;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use zmond::{acquire, agent, cache, collector, config, http, kstat, plugin,
            time, zones};

fn level_filter(args: &config::Args) -> log::LevelFilter {
    let configured = match args.log_level.as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        other => {
            eprintln!("unknown log_level {:?}, using info", other);
            log::LevelFilter::Info
        }
    };
    let raised = match args.verbose {
        0 => configured,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    if raised > configured {
        raised
    } else {
        configured
    }
}

fn main() {
    let args = config::parse_args();

    let signal = chan_signal::notify(&[
        chan_signal::Signal::INT,
        chan_signal::Signal::TERM,
    ]);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                record.target(),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(level_filter(&args))
        .chain(std::io::stdout())
        .apply()
        .expect("could not set up logging");

    info!("zmond - {}", args.version);
    match acquire::vm::sysinfo() {
        Ok(si) => info!(
            "serving host {} in datacenter {}",
            si.uuid,
            si.datacenter_name.unwrap_or_else(|| "unknown".to_string())
        ),
        Err(e) => warn!("unable to read host identity: {}", e),
    }
    if args.ufds_admin_uuid.is_empty() {
        warn!("ufds_admin_uuid is not configured, core zones will not be scraped");
    }

    let kstat_reader: Arc<kstat::Reader> = Arc::new(kstat::CliReader::new());
    let zone_registry = Arc::new(zones::Registry::new(
        Arc::new(acquire::zone::Zoneadm),
        Arc::new(acquire::vm::VmadmLoader),
        Arc::clone(&kstat_reader),
        args.ufds_admin_uuid.clone(),
    ));
    if let Err(e) = zone_registry.refresh() {
        error!("initial zone enumeration failed: {}", e);
    }

    let opts = collector::Options {
        kstat: kstat_reader,
        ntp: Arc::new(acquire::ntp::NtpqCli),
        zfs: Arc::new(acquire::zfs::ZfsCli),
        pools: Arc::new(acquire::zfs::ZpoolCli),
        scraper: Arc::new(acquire::sidecar::HttpScraper),
        plugins_gz: args.plugin_gz_dir
            .clone()
            .map(|dir| Arc::new(plugin::Dir::new(dir, args.plugin_root_only))),
        plugins_vm: args.plugin_vm_dir
            .clone()
            .map(|dir| Arc::new(plugin::Dir::new(dir, args.plugin_root_only))),
        cache: cache::Cache::new(args.cache_sweep_secs),
        admin_uuid: args.ufds_admin_uuid.clone(),
        timestamp: time::now,
    };
    let agent = Arc::new(agent::Agent::new(&opts, Arc::clone(&zone_registry)));
    if !agent.running() {
        error!("collectors failed to load, all requests will fail");
    }

    let refresh_registry = Arc::clone(&zone_registry);
    let refresh_interval = Duration::from_secs(args.zone_refresh_secs);
    thread::spawn(move || loop {
        thread::sleep(refresh_interval);
        if let Err(e) = refresh_registry.refresh() {
            warn!("periodic zone refresh failed: {}", e);
        }
    });

    if let Err(e) = http::serve(
        Arc::clone(&agent),
        &args.host,
        args.port,
        args.http_workers,
    ) {
        error!("unable to start http server: {}", e);
        process::exit(1);
    }
    info!("listening on {}:{}", args.host, args.port);

    signal.recv();
    info!("shutdown signal received, exiting");
    process::exit(0);
}
