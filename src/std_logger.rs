use chrono::Local;
use log::{max_level, LevelFilter, Metadata, Record, SetLoggerError};

pub struct StdLogger;

static LOGGER: StdLogger = StdLogger;

impl StdLogger {
  pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
  }
}

impl log::Log for StdLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    metadata.level() <= max_level()
  }

  fn log(&self, record: &Record) {
    if self.enabled(record.metadata()) {
      let time_str = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
      println!("{0} {1:<5} {2}: {3}", time_str, record.level(), record.target(), record.args())
    }
  }

  fn flush(&self) {}
}
