//! Compile-time constants and tunable defaults for zmond.

/// Default port the HTTP surface listens on.
pub const DEFAULT_PORT: u16 = 9163;
/// Default number of HTTP worker threads pulling from the accept queue.
pub const DEFAULT_HTTP_WORKERS: usize = 4;
/// How often the zone registry re-enumerates running zones, in seconds.
pub const DEFAULT_ZONE_REFRESH_SECS: u64 = 1800;
/// How often the cache sweeper walks the TTL buckets, in seconds.
pub const DEFAULT_CACHE_SWEEP_SECS: u64 = 300;

/// Plugin directory listings are reused for this long before the
/// directory is enumerated again.
pub const PLUGIN_RELOAD_INTERVAL_MILLIS: u64 = 60_000;
/// Wall-clock bound on a single plugin execution unless plugin.json says
/// otherwise.
pub const PLUGIN_DEFAULT_TIMEOUT_MILLIS: u64 = 10_000;
/// Cache TTL for plugin results unless plugin.json or an in-band `ttl`
/// option says otherwise.
pub const PLUGIN_DEFAULT_TTL_SECS: u64 = 60;
/// Accumulated stdout past this bound kills the plugin.
pub const PLUGIN_MAX_OUTPUT_BYTES: usize = 512 * 1024;
/// Process-wide bound on concurrently executing plugins.
pub const PLUGIN_MAX_CONCURRENT: usize = 100;
