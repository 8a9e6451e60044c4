pub mod macros;

/// Surface crate logs (persona fallbacks, dropped renditions) when a test runs with
/// `RUST_LOG` set.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
