//! Sensor feedback reported by the robot once per measurement cycle

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Signature ids a camera can be trained on
pub const VISION_SIGNATURES: std::ops::RangeInclusive<u8> = 1..=7;

/// Ultrasonic ray directions, relative to heading plus sensor head angle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UltrasonicDirection {
    Left,
    Center,
    Right,
}

impl UltrasonicDirection {
    pub const ALL: [UltrasonicDirection; 3] = [
        UltrasonicDirection::Left,
        UltrasonicDirection::Center,
        UltrasonicDirection::Right,
    ];

    /// Angular offset of the ray [deg]
    pub fn offset(self) -> f64 {
        match self {
            UltrasonicDirection::Left => 90.0,
            UltrasonicDirection::Center => 0.0,
            UltrasonicDirection::Right => -90.0,
        }
    }
}

/// One signature as seen by the camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignatureObservation {
    /// Bearing relative to the camera axis [deg]
    pub angle: f64,
    /// Perceived width
    pub width: f64,
}

/// Result of a camera query
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisionReading {
    /// Signature with the largest perceived width, if any was seen
    pub dominant: Option<u8>,
    pub signatures: BTreeMap<u8, SignatureObservation>,
}

impl VisionReading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signature and update the dominant one
    pub fn with_signature(mut self, id: u8, angle: f64, width: f64) -> Self {
        self.signatures.insert(id, SignatureObservation { angle, width });
        self.dominant = dominant_signature(self.signatures.iter().map(|(id, s)| (*id, s.width)));
        self
    }

    pub fn dominant_observation(&self) -> Option<(u8, SignatureObservation)> {
        let id = self.dominant?;
        self.signatures.get(&id).map(|obs| (id, *obs))
    }
}

/// Pick the widest signature; ties go to the lowest id
pub fn dominant_signature<I>(widths: I) -> Option<u8>
where
    I: IntoIterator<Item = (u8, f64)>,
{
    let mut best: Option<(u8, f64)> = None;
    for (id, width) in widths {
        match best {
            Some((_, w)) if width <= w => {}
            _ => best = Some((id, width)),
        }
    }
    best.map(|(id, _)| id)
}

/// Snapshot of the robot's distance, color and vision feedback.
///
/// Distances that are absent or non-positive mean "not measured".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorReading {
    pub left: Option<f64>,
    pub center: Option<f64>,
    pub right: Option<f64>,
    /// Current sensor head angle relative to the robot heading [deg]
    pub sensor_head_angle: f64,
    pub color: Option<u8>,
    pub vision: Option<VisionReading>,
}

impl SensorReading {
    pub fn new(left: Option<f64>, center: Option<f64>, right: Option<f64>) -> Self {
        Self {
            left,
            center,
            right,
            ..Default::default()
        }
    }

    /// Reading with only the center sensor
    pub fn center_only(center: f64) -> Self {
        Self::new(None, Some(center), None)
    }

    pub fn with_head_angle(mut self, angle: f64) -> Self {
        self.sensor_head_angle = angle;
        self
    }

    pub fn with_vision(mut self, vision: VisionReading) -> Self {
        self.vision = Some(vision);
        self
    }

    /// Measured distance in the given direction, if it is usable
    pub fn distance(&self, direction: UltrasonicDirection) -> Option<f64> {
        let value = match direction {
            UltrasonicDirection::Left => self.left,
            UltrasonicDirection::Center => self.center,
            UltrasonicDirection::Right => self.right,
        };
        value.filter(|d| *d > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmeasured_distances_are_filtered() {
        let reading = SensorReading::new(Some(-1.0), Some(0.0), Some(12.5));
        assert_eq!(reading.distance(UltrasonicDirection::Left), None);
        assert_eq!(reading.distance(UltrasonicDirection::Center), None);
        assert_eq!(reading.distance(UltrasonicDirection::Right), Some(12.5));
    }

    #[test]
    fn test_dominant_signature_prefers_widest() {
        let vision = VisionReading::new()
            .with_signature(3, 10.0, 4.0)
            .with_signature(1, -5.0, 9.0)
            .with_signature(2, 0.0, 9.0);
        assert_eq!(vision.dominant, Some(1));
        let (id, obs) = vision.dominant_observation().unwrap();
        assert_eq!(id, 1);
        assert_eq!(obs.angle, -5.0);
    }

    #[test]
    fn test_empty_vision_has_no_dominant() {
        assert_eq!(dominant_signature(Vec::new()), None);
        assert!(VisionReading::new().dominant_observation().is_none());
    }
}
