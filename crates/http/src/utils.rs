//! Utility macros used internally by the crate.

/// Returns early with an error if a condition is not met.
///
/// This is the `assert!` of fallible code: validation that should surface as
/// an `Err` rather than a panic.
///
/// ```ignore
/// ensure!(config.max_head_size >= MIN_HEAD_SIZE, ConfigError::head_size_too_small(config.max_head_size));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
