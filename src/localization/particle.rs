//! Particle representation and population generation

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::common::{
    heading_direction, normalize_degrees, Environment, LocalizationError, LocalizationResult,
    Point2D, Pose, VisionDetection,
};
use crate::localization::config::PosePin;
use crate::localization::motion_model::TRANSLATION_NOISE_DIVISOR;
use crate::localization::sensor::{dominant_signature, UltrasonicDirection, VISION_SIGNATURES};

/// Rejection-sampling budget per requested particle
const GENERATION_ATTEMPTS_PER_PARTICLE: usize = 1000;

/// One hypothesis of the robot pose
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub pose: Pose,
    /// Unnormalized between measurement cycles, normalized right before resampling
    pub weight: f32,
    /// Sensor head angle relative to heading [deg]
    pub sensor_head_angle: f64,
}

impl Particle {
    pub fn new(pose: Pose) -> Self {
        Particle {
            pose,
            weight: 0.0,
            sensor_head_angle: 0.0,
        }
    }

    pub fn position(&self) -> Point2D {
        self.pose.position()
    }

    /// Move along the current heading.
    ///
    /// `noise` is the clipped normal sample `d`; the travelled distance is
    /// `distance * (1 + d / 10)` and is returned.
    pub fn translate(&mut self, distance: f64, noise: f64) -> f64 {
        let actual = distance * (1.0 + noise / TRANSLATION_NOISE_DIVISOR);
        let dir = heading_direction(self.pose.heading);
        self.pose.x += dir.x * actual;
        self.pose.y += dir.y * actual;
        actual
    }

    /// Turn in place, keeping the heading in `[0, 360)`
    pub fn rotate(&mut self, degrees: f64) {
        self.pose.heading = normalize_degrees(self.pose.heading + degrees);
    }

    /// Direction the sensor head currently looks at [deg]
    pub fn sensor_heading(&self) -> f64 {
        normalize_degrees(self.pose.heading + self.sensor_head_angle)
    }

    /// Ultrasonic distance this particle would measure on the map
    pub fn simulated_distance<E: Environment + ?Sized>(
        &self,
        env: &E,
        direction: UltrasonicDirection,
    ) -> f64 {
        let heading = normalize_degrees(self.sensor_heading() + direction.offset());
        env.nearest_obstacle_distance(self.position(), heading)
    }

    /// Widest landmark this particle would see, if any
    pub fn simulated_vision<E: Environment + ?Sized>(
        &self,
        env: &E,
    ) -> Option<(u8, VisionDetection)> {
        let heading = self.sensor_heading();
        let detections: Vec<(u8, VisionDetection)> = VISION_SIGNATURES
            .map(|id| (id, env.vision_query(self.position(), heading, id)))
            .filter(|(_, det)| det.detected)
            .collect();

        let dominant = dominant_signature(detections.iter().map(|(id, det)| (*id, det.width)))?;
        detections.into_iter().find(|(id, _)| *id == dominant)
    }
}

/// Sample `count` particles uniformly inside the operating region.
///
/// Pinned coordinates are used verbatim; points outside the region are
/// rejected and redrawn.
pub fn generate_population<E, R>(
    env: &E,
    count: usize,
    pin: &PosePin,
    rng: &mut R,
) -> LocalizationResult<Vec<Particle>>
where
    E: Environment + ?Sized,
    R: Rng,
{
    if count == 0 {
        return Err(LocalizationError::InvalidParameter(
            "particle count must be at least 1".to_string(),
        ));
    }

    let bounds = env.bounds();
    let budget = count.saturating_mul(GENERATION_ATTEMPTS_PER_PARTICLE);
    let mut particles = Vec::with_capacity(count);
    let mut attempts = 0;

    while particles.len() < count {
        if attempts >= budget {
            return Err(LocalizationError::InvalidParameter(format!(
                "operating region of map '{}' rejected {} samples",
                env.key(),
                attempts
            )));
        }
        attempts += 1;

        let x = pin
            .x
            .unwrap_or_else(|| sample_range(rng, bounds.min.x, bounds.max.x));
        let y = pin
            .y
            .unwrap_or_else(|| sample_range(rng, bounds.min.y, bounds.max.y));
        if !env.contains(Point2D::new(x, y)) {
            continue;
        }
        let heading = pin.heading.unwrap_or_else(|| rng.gen_range(0.0..360.0));
        particles.push(Particle::new(Pose::new(x, y, heading)));
    }

    debug!(
        "generated {} particles on '{}' in {} draws",
        count,
        env.key(),
        attempts
    );
    Ok(particles)
}

fn sample_range<R: Rng>(rng: &mut R, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}
