//! Shared helpers for the demo binaries.

use std::io::Write;
use std::str::FromStr;

/// Install the demo logger: `file:line [LEVEL] time - message`, filtered
/// by `log_level`, but only when `--debug` was given.
pub fn init_logging(debug: bool, log_level: &str) -> anyhow::Result<()> {
    let log_level = log::LevelFilter::from_str(log_level)?;
    if debug {
        env_logger::Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}:{} [{}] {} - {}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.level(),
                    chrono::Local::now().format("%H:%M:%S.%6f"),
                    record.args()
                )
            })
            .filter(None, log_level)
            .init();
    }
    Ok(())
}
