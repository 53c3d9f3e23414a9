use crate::thread::thread_name;
use chrono::Local;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::fmt::Arguments;
use std::io::Write;
use std::sync::{Arc, Weak};
use std::{fmt, thread};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Verbose,
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Verbose => write!(f, "verbose"),
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Message {
    pub severity: Severity,
    pub crate_name: String,
    pub message: String,
    pub time: chrono::DateTime<Local>,
    pub thread: thread::ThreadId,
}

/// Receives every message emitted through the logging macros.
pub trait Sink: Send + Sync {
    fn log(&self, message: &Message);
}

enum SinkEntry {
    Arc(Arc<dyn Sink>),
    Weak(Weak<dyn Sink>),
}

impl SinkEntry {
    fn log(&self, message: &Message) {
        match self {
            SinkEntry::Arc(arc) => arc.log(message),
            SinkEntry::Weak(weak) => {
                if let Some(arc) = weak.upgrade() {
                    arc.log(message);
                }
            }
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            SinkEntry::Arc(_) => true,
            SinkEntry::Weak(weak) => weak.strong_count() > 0,
        }
    }
}

static SINKS: Lazy<RwLock<Vec<SinkEntry>>> = Lazy::new(RwLock::default);

#[doc(hidden)]
pub fn internal_log(severity: Severity, crate_name: &str, args: Arguments) {
    let message = Message {
        severity,
        crate_name: crate_name.to_string(),
        message: args.to_string(),
        time: Local::now(),
        thread: thread::current().id(),
    };

    for sink in SINKS.read().iter() {
        sink.log(&message);
    }

    if matches!(message.severity, Severity::Fatal) {
        panic!("{}", message.message);
    }
}

/** Sink API */

pub fn register_sink(sink: Arc<dyn Sink>) {
    SINKS.write().push(SinkEntry::Arc(sink));
}

/// Register a sink that is dropped from the sink list once its last strong reference goes away.
pub fn register_sink_weak<T: Sink + 'static>(sink: Weak<T>) {
    let mut sinks = SINKS.write();
    sinks.retain(SinkEntry::is_alive);
    sinks.push(SinkEntry::Weak(sink));
}

/** Default logging macros */
#[macro_export]
macro_rules! ze_verbose {
    ($($arg:tt)*) => ({
        $crate::logger::internal_log($crate::logger::Severity::Verbose, env!("CARGO_PKG_NAME"), format_args!($($arg)*));
    })
}

#[macro_export]
macro_rules! ze_info {
    ($($arg:tt)*) => ({
        $crate::logger::internal_log($crate::logger::Severity::Info, env!("CARGO_PKG_NAME"), format_args!($($arg)*));
    })
}

#[macro_export]
macro_rules! ze_warn {
    ($($arg:tt)*) => ({
        $crate::logger::internal_log($crate::logger::Severity::Warn, env!("CARGO_PKG_NAME"), format_args!($($arg)*));
    })
}

#[macro_export]
macro_rules! ze_error {
    ($($arg:tt)*) => ({
        $crate::logger::internal_log($crate::logger::Severity::Error, env!("CARGO_PKG_NAME"), format_args!($($arg)*));
    })
}

#[macro_export]
macro_rules! ze_fatal {
    ($($arg:tt)*) => ({
        $crate::logger::internal_log($crate::logger::Severity::Fatal, env!("CARGO_PKG_NAME"), format_args!($($arg)*));
        unreachable!();
    })
}

/** Default sinks */
pub struct StdoutSink {
    min_severity: Severity,
}

impl StdoutSink {
    pub fn new() -> Arc<Self> {
        Self::with_min_severity(Severity::Verbose)
    }

    pub fn with_min_severity(min_severity: Severity) -> Arc<Self> {
        Arc::new(Self { min_severity })
    }
}

impl Sink for StdoutSink {
    fn log(&self, message: &Message) {
        if message.severity < self.min_severity {
            return;
        }

        let mut stdout = StandardStream::stdout(ColorChoice::Auto);
        let thread_name = match thread_name(message.thread) {
            None => "Unknown Thread".to_string(),
            Some(str) => str.as_ref().clone(),
        };

        // Write errors are ignored
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(match message.severity {
            Severity::Verbose => Color::Cyan,
            Severity::Info => Color::White,
            Severity::Warn => Color::Yellow,
            Severity::Error => Color::Red,
            Severity::Fatal => Color::Rgb(255, 15, 15),
        })));

        let _ = writeln!(
            &mut stdout,
            "[{}] [{}/{}] ({}) {}",
            message.time.format("%H:%M:%S"),
            message.severity,
            thread_name,
            message.crate_name,
            message.message
        );
        let _ = stdout.reset();
        let _ = stdout.flush();
    }
}

/// Keeps every message in memory. Mostly useful to inspect what a subsystem reported.
#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<Message>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Returns true if a message of `severity` containing `needle` was logged
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.messages
            .lock()
            .iter()
            .any(|message| message.severity == severity && message.message.contains(needle))
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl Sink for MemorySink {
    fn log(&self, message: &Message) {
        self.messages.lock().push(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_receives_messages() {
        let sink = MemorySink::new();
        register_sink_weak(Arc::downgrade(&sink));

        crate::ze_warn!("memory sink test {}", 42);
        crate::ze_info!("memory sink other message");

        assert!(sink.contains(Severity::Warn, "memory sink test 42"));
        assert!(!sink.contains(Severity::Error, "memory sink test 42"));
        assert!(sink
            .messages()
            .iter()
            .any(|message| message.crate_name == "ze-core"));
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Verbose < Severity::Info);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    #[should_panic(expected = "unrecoverable")]
    fn fatal_panics() {
        internal_log(Severity::Fatal, "ze-core", format_args!("unrecoverable"));
    }
}
