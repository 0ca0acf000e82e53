//! Reduction of a particle population to one pose and an uncertainty radius

use crate::common::{normalize_degrees, Pose};
use crate::localization::particle::Particle;

/// How headings are averaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingMean {
    /// Plain arithmetic mean; biased for headings straddling 0/360
    Arithmetic,
    /// Mean direction of the unit heading vectors
    Circular,
}

#[derive(Debug, Clone, Copy)]
pub struct PoseEstimator {
    heading_mean: HeadingMean,
}

impl PoseEstimator {
    pub fn new(heading_mean: HeadingMean) -> Self {
        PoseEstimator { heading_mean }
    }

    /// Unweighted mean of x, y and heading. An empty population estimates the origin.
    pub fn estimate(&self, particles: &[Particle]) -> Pose {
        if particles.is_empty() {
            return Pose::origin();
        }
        let n = particles.len() as f64;
        let x = particles.iter().map(|p| p.pose.x).sum::<f64>() / n;
        let y = particles.iter().map(|p| p.pose.y).sum::<f64>() / n;
        let heading = match self.heading_mean {
            HeadingMean::Arithmetic => particles.iter().map(|p| p.pose.heading).sum::<f64>() / n,
            HeadingMean::Circular => circular_mean(particles.iter().map(|p| p.pose.heading)),
        };
        Pose { x, y, heading }
    }

    /// Largest distance from the estimate to any particle
    pub fn spreading(&self, particles: &[Particle]) -> f64 {
        let estimate = self.estimate(particles);
        spreading_around(&estimate, particles)
    }
}

impl Default for PoseEstimator {
    fn default() -> Self {
        Self::new(HeadingMean::Arithmetic)
    }
}

/// Worst-case radius around `estimate`
pub fn spreading_around(estimate: &Pose, particles: &[Particle]) -> f64 {
    particles
        .iter()
        .map(|p| p.pose.distance(estimate))
        .fold(0.0, f64::max)
}

fn circular_mean<I: Iterator<Item = f64>>(headings: I) -> f64 {
    let (sin, cos) = headings.fold((0.0, 0.0), |(s, c), h| {
        let rad = h.to_radians();
        (s + rad.sin(), c + rad.cos())
    });
    if sin == 0.0 && cos == 0.0 {
        return 0.0;
    }
    normalize_degrees(sin.atan2(cos).to_degrees())
}
