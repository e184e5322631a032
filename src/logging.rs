//! Crate-internal logging macros.
//!
//! With the `tracing` feature (on by default) each level macro forwards to `tracing` under the
//! `adaptive_log_fetcher` target. Without it, field values are still borrowed so call sites keep
//! compiling warning-free, but nothing is emitted.

#[cfg(feature = "tracing")]
macro_rules! log_event {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "adaptive_log_fetcher", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! log_event {
    ($level:ident, $($arg:tt)*) => {
        consume_fields!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! consume_fields {
    ($field:ident = % $value:expr $(, $($rest:tt)*)?) => {
        { let _ = &$value; $(consume_fields!($($rest)*);)? }
    };
    ($field:ident = ? $value:expr $(, $($rest:tt)*)?) => {
        { let _ = &$value; $(consume_fields!($($rest)*);)? }
    };
    ($field:ident = $value:expr $(, $($rest:tt)*)?) => {
        { let _ = &$value; $(consume_fields!($($rest)*);)? }
    };
    ($message:literal $(, $($rest:tt)*)?) => {
        { $(consume_fields!($($rest)*);)? }
    };
    ($value:expr $(, $($rest:tt)*)?) => {
        { let _ = &$value; $(consume_fields!($($rest)*);)? }
    };
    () => {};
}

macro_rules! error {
    ($($arg:tt)*) => { log_event!(error, $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { log_event!(warn, $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { log_event!(info, $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { log_event!(debug, $($arg)*) };
}

macro_rules! trace {
    ($($arg:tt)*) => { log_event!(trace, $($arg)*) };
}
