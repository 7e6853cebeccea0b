// Injectable logging. Components hold a `Logger` handed to them at
// construction instead of writing to a process-wide logger directly.
use log::{Level, LevelFilter, Log, Metadata, Record};

use std::{fmt, io::Write, sync::Arc};

#[derive(Clone)]
pub struct Logger(Arc<dyn Log>);

impl Logger {
    pub fn new(inner: Arc<dyn Log>) -> Self {
        Self(inner)
    }

    /// Forwards to whatever logger is installed with the `log` facade.
    pub fn global() -> Self {
        Self(Arc::new(GlobalLog))
    }

    pub fn null() -> Self {
        Self(Arc::new(NullLog))
    }

    pub fn log(&self, level: Level, args: fmt::Arguments) {
        let metadata = Metadata::builder()
            .level(level)
            .target("padfuster")
            .build();
        if !self.0.enabled(&metadata) {
            return;
        }
        self.0.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .build(),
        );
    }

    pub fn error(&self, args: fmt::Arguments) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments) {
        self.log(Level::Debug, args);
    }

    pub fn trace(&self, args: fmt::Arguments) {
        self.log(Level::Trace, args);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Logger")
    }
}

struct GlobalLog;

impl Log for GlobalLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        log::logger().log(record);
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

struct NullLog;

impl Log for NullLog {
    fn enabled(&self, _: &Metadata) -> bool {
        false
    }

    fn log(&self, _: &Record) {}

    fn flush(&self) {}
}

/// Writes `[*] message` style lines to stderr, keeping stdout for results.
#[derive(Debug)]
pub struct ConsoleLog {
    level: LevelFilter,
}

impl ConsoleLog {
    pub fn new(level: LevelFilter) -> Self {
        Self { level }
    }

    /// Info by default, one level more per `-v`.
    pub fn with_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        Self::new(level)
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    fn prefix(level: Level) -> &'static str {
        match level {
            Level::Error => "[x]",
            Level::Warn => "[!]",
            Level::Info => "[*]",
            Level::Debug => "[~]",
            Level::Trace => "[#]",
        }
    }
}

impl Log for ConsoleLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(
                std::io::stderr(),
                "{} {}",
                Self::prefix(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
