pub mod agent;
pub mod budget;
pub mod cancel;
pub mod event_bus;
pub mod frame;
pub mod task;

pub use agent::*;
pub use budget::*;
pub use cancel::*;
pub use event_bus::*;
pub use frame::*;
pub use task::*;
