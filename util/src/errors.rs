//! Error helpers shared across the workspace

/// Wraps a callsite's error in the given error variant, stringifying the
/// underlying cause
///
/// Shorthand for `.map_err(|e| SomeError::Variant(e.to_string()))`
#[macro_export]
macro_rules! err_str {
    ($x:expr) => {
        |err| $x(err.to_string())
    };
}
