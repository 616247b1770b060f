//! Supporting macros shared across the crate.

/// Trace when the `verbose` feature is enabled.
macro_rules! verbose {
    ($($tt:tt)*) => {
        #[cfg(feature = "verbose")]
        tracing::trace!($($tt)*)
    };
}

/// Warn when the `verbose` feature is enabled.
macro_rules! warning {
    ($($tt:tt)*) => {
        #[cfg(feature = "verbose")]
        tracing::warn!($($tt)*)
    };
}

/// Create unit type `Error`.
macro_rules! unit_error {
    ($(#[$meta:meta])* $vis:vis struct $name:ident($msg:literal);) => {
        $(#[$meta])*
        $vis struct $name;

        impl std::error::Error for $name { }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($msg)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "\"{self}\"")
            }
        }
    };
}

pub(crate) use unit_error;
pub(crate) use verbose;
pub(crate) use warning;
