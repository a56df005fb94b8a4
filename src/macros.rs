/// Logs a structured diagnostic line with timestamp, level, component, pid, tid, and message.
/// Usage:
/// ```rust
/// use log::Level;
/// logsink::sink_log!(Level::Info, "sink", "Sink opened");
/// logsink::sink_log!(Level::Error, "writer", "Batch failed: {}", "disk I/O error");
/// ```
/// Logs like:
/// [2025-04-25T16:32:10+02:00][WARN][writer][pid=4568][tid=ThreadId(3)] Your message here
///
/// This is the crate's self-log: it never writes into the log table itself.
#[macro_export]
macro_rules! sink_log {
    ($level:expr, $component:expr, $fmt:expr $(, $($arg:tt)+)?) => {
        $crate::__private::log::log!(
            target: concat!("logsink::", $component),
            $level,
            concat!(
                "[", "{}", "]",          // timestamp
                "[", "{}", "]",          // level via Display
                "[", $component, "]",    // component
                "[pid=", "{}", "]",      // pid
                "[tid=", "{:?}", "] ",   // tid
                $fmt                     // message
            ),
            $crate::__private::chrono::Local::now().to_rfc3339(),
            $level,
            std::process::id(),
            std::thread::current().id()
            $(, $($arg)+)?
        );
    };
}
