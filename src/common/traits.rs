//! Common traits defining the collaborators of the localization engine

use serde::{Deserialize, Serialize};

use crate::common::types::*;

/// Result of a simulated landmark lookup
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VisionDetection {
    pub detected: bool,
    /// Bearing of the landmark relative to the viewing direction [deg]
    pub angle_offset: f64,
    /// Perceived width of the landmark
    pub width: f64,
}

impl VisionDetection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn seen(angle_offset: f64, width: f64) -> Self {
        Self {
            detected: true,
            angle_offset,
            width,
        }
    }
}

/// The known, static map the robot is localized on.
///
/// Headings are in degrees using the screen-space convention of
/// [`heading_direction`].
pub trait Environment: Send + Sync {
    /// Identifier of the map, recorded into every world state
    fn key(&self) -> &str;

    /// Bounding box used for uniform particle generation
    fn bounds(&self) -> Bounds;

    /// Whether the point lies inside the operating region
    fn contains(&self, point: Point2D) -> bool;

    /// Distance to the nearest obstacle along the ray, or a non-positive
    /// value when nothing is hit
    fn nearest_obstacle_distance(&self, origin: Point2D, heading: f64) -> f64;

    /// Occlusion-aware lookup of the landmark carrying `signature`
    fn vision_query(&self, origin: Point2D, heading: f64, signature: u8) -> VisionDetection;
}

impl<E: Environment + ?Sized> Environment for std::sync::Arc<E> {
    fn key(&self) -> &str {
        (**self).key()
    }

    fn bounds(&self) -> Bounds {
        (**self).bounds()
    }

    fn contains(&self, point: Point2D) -> bool {
        (**self).contains(point)
    }

    fn nearest_obstacle_distance(&self, origin: Point2D, heading: f64) -> f64 {
        (**self).nearest_obstacle_distance(origin, heading)
    }

    fn vision_query(&self, origin: Point2D, heading: f64, signature: u8) -> VisionDetection {
        (**self).vision_query(origin, heading, signature)
    }
}

/// Trait for things that can draw themselves
pub trait Visualizable {
    /// Draw current state to visualizer
    fn visualize(&self, vis: &mut crate::utils::Visualizer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // Test that the blanket Arc impl forwards correctly
    struct DummyMap;

    impl Environment for DummyMap {
        fn key(&self) -> &str {
            "dummy"
        }

        fn bounds(&self) -> Bounds {
            Bounds::new(Point2D::origin(), Point2D::new(1.0, 1.0))
        }

        fn contains(&self, point: Point2D) -> bool {
            point.x >= 0.0 && point.y >= 0.0
        }

        fn nearest_obstacle_distance(&self, _origin: Point2D, _heading: f64) -> f64 {
            42.0
        }

        fn vision_query(&self, _origin: Point2D, _heading: f64, _signature: u8) -> VisionDetection {
            VisionDetection::none()
        }
    }

    #[test]
    fn test_environment_through_arc() {
        let map: Arc<dyn Environment> = Arc::new(DummyMap);
        assert_eq!(map.key(), "dummy");
        assert!(map.contains(Point2D::new(0.5, 0.5)));
        assert_eq!(map.nearest_obstacle_distance(Point2D::origin(), 0.0), 42.0);
        assert!(!map.vision_query(Point2D::origin(), 0.0, 1).detected);
    }
}
