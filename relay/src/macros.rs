//! Macros for relay error handling.
//!
//! Provides convenience macros for creating and returning [`crate::error::RelayError`] instances
//! with reduced boilerplate for common error handling patterns.

/// Creates a [`crate::error::RelayError`] from error kind and description.
///
/// This macro provides a concise way to create [`crate::error::RelayError`] instances with
/// either static descriptions or additional dynamic detail information.
#[macro_export]
macro_rules! relay_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::RelayError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::RelayError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::RelayError`] from the current function.
///
/// This macro combines error creation with early return, reducing boilerplate
/// when handling error conditions that should immediately terminate execution.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::relay_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::relay_error!($kind, $desc, $detail))
    };
}
