use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Colored stderr logger for demos, benches and tools embedding the engine.
pub struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mark = match record.level() {
            Level::Trace => "{TRACE}".bright_black(),
            Level::Debug => "{DEBUG}".bright_black(),
            Level::Info => "{INFO}".cyan(),
            Level::Warn => "{WARN}".yellow(),
            Level::Error => "{ERROR}".red(),
        }
        .bold();
        let module = record.module_path().unwrap_or("");
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{mark:<8} {module:<28} {}", record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Install the logger once; later calls are no-ops.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    static INITIALIZED: AtomicBool = AtomicBool::new(false);
    static LOGGER: OnceLock<StderrLogger> = OnceLock::new();
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    log::set_logger(LOGGER.get_or_init(|| StderrLogger { level }))
        .map(|()| log::set_max_level(level))
}
