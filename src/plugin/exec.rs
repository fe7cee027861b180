//! Bounded execution of plugin scripts.
//!
//! A plugin is launched with the target zonename as its only argument
//! and three hard bounds: a wall-clock timeout, a cap on accumulated
//! stdout, and a process-wide cap on concurrently executing plugins.
//! Breaching any bound kills the child and reports the plugin as
//! unavailable. stderr is logged and never surfaced.

use constants;
use metric;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use time;

lazy_static! {
    static ref IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
}

struct Slot<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> Slot<'a> {
    fn acquire(counter: &'a AtomicUsize, max: usize) -> Option<Slot<'a>> {
        let prior = counter.fetch_add(1, Ordering::SeqCst);
        if prior >= max {
            counter.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Slot { counter: counter })
    }
}

impl<'a> Drop for Slot<'a> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run one plugin under the global concurrency cap.
pub fn run(
    path: &Path,
    zonename: &str,
    timeout_millis: u64,
    max_output_bytes: usize,
) -> Result<String, metric::Error> {
    run_counted(
        &IN_FLIGHT,
        constants::PLUGIN_MAX_CONCURRENT,
        path,
        zonename,
        timeout_millis,
        max_output_bytes,
    )
}

/// Run one plugin against an explicit concurrency counter.
///
/// The slot is claimed before the child is spawned and released when
/// this function returns, so the number of live children can never
/// exceed `max_concurrent`. An over-capacity request fails immediately
/// without spawning anything.
pub fn run_counted(
    counter: &AtomicUsize,
    max_concurrent: usize,
    path: &Path,
    zonename: &str,
    timeout_millis: u64,
    max_output_bytes: usize,
) -> Result<String, metric::Error> {
    let _slot = match Slot::acquire(counter, max_concurrent) {
        Some(slot) => slot,
        None => {
            return Err(metric::Error::NotAvailable(
                format!("plugin concurrency cap reached, skipping {:?}", path),
            ))
        }
    };

    let mut child = Command::new(path)
        .arg(zonename)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            metric::Error::NotAvailable(format!("spawn {:?}: {}", path, e))
        })?;

    let overflowed = Arc::new(AtomicBool::new(false));
    let stdout_pipe = match child.stdout.take() {
        Some(pipe) => pipe,
        None => {
            kill_and_reap(&mut child);
            return Err(metric::Error::Fatal("child stdout not piped".to_string()));
        }
    };
    let stderr_pipe = match child.stderr.take() {
        Some(pipe) => pipe,
        None => {
            kill_and_reap(&mut child);
            return Err(metric::Error::Fatal("child stderr not piped".to_string()));
        }
    };
    let stdout_overflow = Arc::clone(&overflowed);
    let stdout_reader = thread::spawn(move || {
        read_capped(stdout_pipe, max_output_bytes, &stdout_overflow)
    });
    let stderr_reader = thread::spawn(move || {
        let sink = Arc::new(AtomicBool::new(false));
        read_capped(stderr_pipe, 64 * 1024, &sink)
    });

    let deadline = time::monotonic_millis() + timeout_millis;
    let mut attempts = 0;
    let status = loop {
        if overflowed.load(Ordering::SeqCst) {
            kill_and_reap(&mut child);
            return Err(metric::Error::NotAvailable(format!(
                "plugin {:?} exceeded {} bytes of output",
                path, max_output_bytes
            )));
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(metric::Error::NotAvailable(
                    format!("wait on {:?}: {}", path, e),
                ));
            }
        }
        if time::monotonic_millis() >= deadline {
            kill_and_reap(&mut child);
            return Err(metric::Error::NotAvailable(format!(
                "plugin {:?} timed out after {}ms",
                path, timeout_millis
            )));
        }
        time::delay(attempts);
        if attempts < 7 {
            attempts += 1;
        }
    };

    let stdout = join_reader(stdout_reader)?;
    let stderr = join_reader(stderr_reader)?;
    if !stderr.is_empty() {
        warn!(
            "plugin {:?} wrote to stderr: {}",
            path,
            String::from_utf8_lossy(&stderr).trim()
        );
    }
    if overflowed.load(Ordering::SeqCst) || stdout.len() > max_output_bytes {
        return Err(metric::Error::NotAvailable(format!(
            "plugin {:?} exceeded {} bytes of output",
            path, max_output_bytes
        )));
    }
    if !status.success() {
        return Err(metric::Error::NotAvailable(format!(
            "plugin {:?} exited {:?}",
            path,
            status.code()
        )));
    }
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn read_capped<R>(mut pipe: R, cap: usize, overflowed: &Arc<AtomicBool>) -> Vec<u8>
where
    R: Read,
{
    let mut collected = Vec::new();
    let mut buf = [0u8; 8_192];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) | Err(_) => return collected,
            Ok(n) => {
                collected.extend_from_slice(&buf[..n]);
                if collected.len() > cap {
                    overflowed.store(true, Ordering::SeqCst);
                    return collected;
                }
            }
        }
    }
}

fn join_reader(
    handle: thread::JoinHandle<Vec<u8>>,
) -> Result<Vec<u8>, metric::Error> {
    handle.join().map_err(|_| {
        metric::Error::Fatal("plugin output reader panicked".to_string())
    })
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
