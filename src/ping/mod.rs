pub mod engine;
pub mod receiver;
pub mod signal;

pub use engine::*;
pub use receiver::*;
pub use signal::*;
