//! Common types, traits, and error definitions for mcl_localization
//!
//! This module provides the foundational building blocks shared by the
//! filter core, the reference map and the visualization helpers.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
