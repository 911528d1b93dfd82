//! Wind map engine: loads weather grids, interpolates them onto a projected
//! globe and animates particles through the result.

pub mod config;
pub mod engine;
pub mod error;
pub mod status;
