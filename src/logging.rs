//! Helper macros enforcing consistent safe-ops log fields.
//!
//! These macros keep a `service` field (and optionally `probe`) present on every log
//! emitted from the waiter and auditor so downstream parsing can rely on them.

/// Log an event for a service/probe pair plus any extra fields.
#[macro_export]
macro_rules! service_event {
    ($level:ident, $event:expr, service = $service:expr, probe = $probe:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            event = $event,
            service = $service,
            probe = $probe,
            $($field = %$value,)*
        )
    };
    ($level:ident, $event:expr, service = $service:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            event = $event,
            service = $service,
            $($field = %$value,)*
        )
    };
}
