/// Macro to return early with an error
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::Generic($crate::error::eyre::Report::msg(format!($($arg)*))))
    };
}

/// Return early with a helper type mismatch
#[macro_export]
macro_rules! type_bail {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::Type(format!($($arg)*)))
    };
}

/// Log a trace message
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::tracing::trace!($($arg)*)
    };
}
