//! S4 — executor graceful-then-forced shutdown, asserted against the actual
//! log output `stop()` produces.
//!
//! Installs a process-wide capturing logger once (log::set_logger only
//! succeeds the first time per process) and serializes every test that reads
//! its buffer with `#[serial]`, since the buffer is shared global state.

use serial_test::serial;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use sluice::{ManagedExecutor, PoolExecutor};

struct CapturingLogger {
    records: Mutex<Vec<String>>,
}

impl log::Log for CapturingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        self.records.lock().expect("log buffer poisoned").push(format!("{}", record.args()));
    }

    fn flush(&self) {}
}

fn logger() -> &'static CapturingLogger {
    static INSTANCE: OnceLock<CapturingLogger> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        let logger = CapturingLogger { records: Mutex::new(Vec::new()) };
        logger
    })
}

fn install_logger_once() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        log::set_logger(logger()).expect("logger installed exactly once per process");
        log::set_max_level(log::LevelFilter::Trace);
    });
}

fn drain_log() -> Vec<String> {
    std::mem::take(&mut *logger().records.lock().expect("log buffer poisoned"))
}

#[test]
#[serial]
fn test_graceful_stop_with_retry_logs_await_message() {
    install_logger_once();
    drain_log();

    let pool = PoolExecutor::new(1, false);
    let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
    let barrier_clone = std::sync::Arc::clone(&barrier);
    pool.execute(Box::new(move || {
        std::thread::sleep(Duration::from_millis(150));
        barrier_clone.wait();
    }))
    .unwrap();

    // Tight timeout forces the retry branch to log while still waiting.
    pool.stop(Duration::from_millis(64), true).unwrap();
    barrier.wait();

    let logs = drain_log();
    assert!(
        logs.iter().any(|line| line.contains("Awaiting termination of some promises")),
        "expected the retry-wait log line, got: {logs:?}"
    );
}

#[test]
#[serial]
fn test_forced_stop_without_retry_logs_forced_shutdown() {
    install_logger_once();
    drain_log();

    let pool = PoolExecutor::new(1, false);
    let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
    let barrier_clone = std::sync::Arc::clone(&barrier);
    pool.execute(Box::new(move || {
        barrier_clone.wait();
    }))
    .unwrap();

    // No retry: stop() must return promptly, logging the forced-shutdown line,
    // leaving the worker thread abandoned rather than blocking on it.
    pool.stop(Duration::from_millis(64), false).unwrap();

    let logs = drain_log();
    assert!(
        logs.iter().any(|line| line.contains("Not all promises kept following shutdown -- forced shutdown")),
        "expected the forced-shutdown log line, got: {logs:?}"
    );

    barrier.wait();
}
