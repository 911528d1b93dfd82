pub mod animation;
pub mod builder;
pub mod field;
pub mod grid;
pub mod particles;

pub use animation::*;
pub use builder::*;
pub use field::*;
pub use grid::*;
pub use particles::*;
