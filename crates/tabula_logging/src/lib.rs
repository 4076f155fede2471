//! helpers for logging.
//!
//! The store itself only talks to the `log` facade.  Binaries, tests and benches that want to see what the store is
//! doing (registrations, materializations, reconciliations) install a logger with one of these.
use std::io::Write;

fn format_record(buf: &mut env_logger::fmt::Formatter, record: &log::Record) -> std::io::Result<()> {
    let now = time::OffsetDateTime::now_utc();

    writeln!(
        buf,
        "{} {} time={} target={}",
        record.level(),
        record.args(),
        now,
        record.target()
    )
}

/// Log to stderr, filtered by `RUST_LOG`.
///
/// If called multiple times in the same process, only applies once.
pub fn log_to_stderr() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        env_logger::builder().format(format_record).init();
    });
}

/// Like [log_to_stderr], but routes output through the test harness so that it is only shown for failing tests.
///
/// Safe to call from every test: only the first call in a process installs the logger.
pub fn log_for_tests() {
    let _ = env_logger::builder()
        .is_test(true)
        .format(format_record)
        .try_init();
}
