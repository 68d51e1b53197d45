pub mod bitmap;
pub mod session;
pub mod stats;

pub use bitmap::*;
pub use session::*;
pub use stats::*;
