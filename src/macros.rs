/// Expands to a short `file:line` tag, used as the argument to
/// `anyhow::Context::with_context` at fallible call sites throughout the
/// crate.
macro_rules! context {
    () => {
        format!("{}:{}", file!(), line!())
    };
}
