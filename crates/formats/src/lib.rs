pub mod grid_record;

pub use grid_record::*;
