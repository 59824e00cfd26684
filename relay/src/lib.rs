pub mod channel;
pub mod concurrency;
pub mod controller;
pub mod discovery;
pub mod dispatch;
pub mod error;
mod macros;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod utils;
pub mod watch;
pub mod workers;
