use std::fmt::Arguments;

/// A buffered ffmpeg log line, bridged out of the C callback and replayed through
/// `log` once we're back in safe Rust code.
pub struct Item {
    pub level: Level,
    pub target: String,
    pub body: String,
}

pub trait Logger {
    fn log(&self, level: Level, target: &str, body: Arguments<'_>);
    fn log_item(&self, item: Item) {
        self.log(item.level, &item.target, format_args!("{}", item.body))
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Level {
    Verbose,
    Info,
    Warn,
    Error,
}

pub struct LogLogger;

impl Logger for LogLogger {
    fn log(&self, level: Level, target: &str, body: Arguments<'_>) {
        let level = match level {
            Level::Verbose => log::Level::Debug,
            Level::Info => log::Level::Info,
            Level::Warn => log::Level::Warn,
            Level::Error => log::Level::Error,
        };
        log::log!(target: target, level, "{}", body);
    }
}

#[allow(unused_macros)]
macro_rules! warning {
    ($logger:expr, $($args:tt),* $(,)*) => {
        $logger.log(
            $crate::frame_source::logger::Level::Warn,
            std::module_path!(),
            std::format_args!($($args),*)
        )
    }
}

#[allow(unused_macros)]
macro_rules! fault {
    ($logger:expr, $($args:tt),* $(,)*) => {
        $logger.log(
            $crate::frame_source::logger::Level::Error,
            std::module_path!(),
            std::format_args!($($args),*)
        )
    }
}

#[allow(unused_imports)]
pub(crate) use fault;
#[allow(unused_imports)]
pub(crate) use warning;
