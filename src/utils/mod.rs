//! Utility modules for mcl_localization

pub mod visualization;

pub use visualization::{colors, plot_world_state, PathStyle, PointStyle, Visualizer};
