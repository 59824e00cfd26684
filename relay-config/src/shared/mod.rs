mod base;
mod controller;
mod retry;
mod source;

pub use base::*;
pub use controller::*;
pub use retry::*;
pub use source::*;
