pub mod collaborators;
pub mod config;
pub mod controller;
pub mod policy;

pub use collaborators::*;
pub use config::*;
pub use controller::*;
pub use policy::*;
