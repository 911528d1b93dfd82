pub mod geo;
pub mod projection;

pub use geo::*;
pub use projection::*;
