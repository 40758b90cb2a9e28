//! Macros for building [`crate::error::CdcError`] values with less boilerplate.

/// Creates a [`crate::error::CdcError`] from an error kind, a static description and an
/// optional dynamic detail.
#[macro_export]
macro_rules! cdc_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::CdcError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::CdcError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Returns early from the current function with a [`crate::error::CdcError`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::cdc_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::cdc_error!($kind, $desc, $detail))
    };
}
