pub mod load_task;
pub mod request;
pub mod source;

pub use load_task::*;
pub use request::*;
pub use source::*;
