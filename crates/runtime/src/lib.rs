pub mod clock;
pub mod cooldown;
pub mod event_bus;
pub mod session;

pub use clock::*;
pub use cooldown::*;
pub use event_bus::*;
pub use session::*;
