//! Logger setup for the command-line tool.
//!
//! `fancy` and `basic` log types use env_logger's default line format. The
//! `json` log type emits one JSON object per record on stderr.
//!
//! Records are written while the shared progress area is suspended, so log
//! lines from builders land above the spinners instead of through them.

use std::io::Write;

use log::{Level, Log, Metadata, Record};

use crate::config::{LogConfig, LogType};
use crate::tasktree::render::progress;

/// env_logger output routed around the progress bars.
struct ProgressLogger {
    inner: env_logger::Logger,
}

impl Log for ProgressLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.inner.matches(record) {
            progress().suspend(|| self.inner.log(record));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

fn build_logger(config: &LogConfig) -> ProgressLogger {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.level);

    match config.log_type {
        LogType::Json => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{}",
                    json_line(record.level(), record.target(), &record.args().to_string())
                )
            });
        }
        LogType::Fancy | LogType::Basic => {
            builder.format_timestamp(None).format_target(false);
        }
    }

    ProgressLogger {
        inner: builder.build(),
    }
}

/// Install the global logger. Calling it again is a no-op.
pub fn init(config: &LogConfig) {
    let logger = build_logger(config);
    let max_level = logger.inner.filter();
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }
}

/// Render one log record as a JSON object.
pub fn json_line(level: Level, target: &str, message: &str) -> String {
    serde_json::json!({
        "level": level.as_str().to_lowercase(),
        "target": target,
        "msg": message,
    })
    .to_string()
}
