pub mod endpoint;
pub mod event;
pub mod topics;

pub use endpoint::*;
pub use event::*;
