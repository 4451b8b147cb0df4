//! Test harness for end-to-end store testing.

#![deny(unsafe_code)]

mod harness;

pub use harness::TestStore;

/// Initialize tracing for tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ward_store=debug,ward_tests=debug")
        .with_test_writer()
        .try_init();
}
