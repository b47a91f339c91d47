pub mod alerts;
pub mod marker;
pub mod memory;
pub mod remote;
pub mod store;

pub use alerts::*;
pub use marker::*;
pub use memory::*;
pub use remote::*;
pub use store::*;
