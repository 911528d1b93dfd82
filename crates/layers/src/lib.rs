pub mod raster;
pub mod symbology;
pub mod trail;

pub use raster::*;
pub use symbology::*;
pub use trail::*;
