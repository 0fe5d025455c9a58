/// Logs a line tagged with the emitting component.
/// Usage:
/// ```rust
/// use log::Level;
/// watchpost::agent_log!(Level::Info, "engine", "cycle started");
/// watchpost::agent_log!(Level::Error, "probe", "probe failed: {}", "boom");
/// ```
/// The component becomes the record target, so the fern formatter renders:
/// [2025-04-25T16:32:10+02:00][DEBUG][engine][pid=4568][tid=ThreadId(1)] Your message here
#[macro_export]
macro_rules! agent_log {
    ($level:expr, $component:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        log::log!(target: $component, $level, $fmt $(, $($arg)+)?)
    };
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    /// A tiny in-memory logger that captures up to DEBUG.
    struct MemoryLogger {
        buffer: Mutex<String>,
    }

    impl MemoryLogger {
        const fn new() -> Self {
            MemoryLogger { buffer: Mutex::new(String::new()) }
        }

        fn take(&self) -> String {
            std::mem::take(&mut *self.buffer.lock().unwrap())
        }
    }

    static LOGGER: MemoryLogger = MemoryLogger::new();

    impl Log for MemoryLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Debug
        }
        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                let mut buf = self.buffer.lock().unwrap();
                buf.push_str(&format!("[{}][{}] {}\n", record.level(), record.target(), record.args()));
            }
        }
        fn flush(&self) {}
    }

    #[test]
    fn agent_log_tags_component_as_target() {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Debug);
        LOGGER.take();

        agent_log!(Level::Debug, "engine", "Answer={}!", 42);
        agent_log!(Level::Warn, "monitor", "no args");

        let output = LOGGER.take();
        assert!(output.contains("[DEBUG][engine] Answer=42!"), "missing tagged line: {}", output);
        assert!(output.contains("[WARN][monitor] no args"), "missing plain line: {}", output);
    }
}
