// Map representations the filter can localize on

pub mod polygon_map;

pub use polygon_map::{Landmark, PolygonMap};
