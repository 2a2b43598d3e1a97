/// Lazily compiled, process-wide `Regex` for a literal pattern.
///
/// Only use this with literal patterns that are known to be valid; an invalid literal is a programming error
/// caught the first time the expression is evaluated in tests.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Print a tagged debug line when `HERMIT_DEBUG_RULES` is set.
///
/// ```text
/// debug_log!("apply", "rule={} outputs={}", name, n);
/// // [apply] rule=PL outputs=1
/// ```
#[macro_export]
macro_rules! debug_log {
    ($tag:literal, $($arg:tt)*) => {
        if $crate::debug_enabled() {
            eprintln!(concat!("[", $tag, "] {}"), format_args!($($arg)*));
        }
    };
}
