//! Motion noise injection for particle translation and rotation

use log::debug;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::localization::config::LocalizationMode;
use crate::localization::particle::Particle;

/// Divisor applied to the clipped normal sample on translation
pub const TRANSLATION_NOISE_DIVISOR: f64 = 10.0;
/// Divisor applied to the unclipped normal sample on 2D rotation
const ROTATION_NOISE_DIVISOR: f64 = 540.0;

/// Draws motion noise and applies robot motion to a population
#[derive(Debug, Clone, Copy)]
pub struct MotionModel {
    mode: LocalizationMode,
    noise_enabled: bool,
}

impl MotionModel {
    pub fn new(mode: LocalizationMode, noise_enabled: bool) -> Self {
        MotionModel { mode, noise_enabled }
    }

    /// Standard normal sample clipped to `[-1, 1]` by redrawing
    pub fn clipped_normal<R: Rng>(rng: &mut R) -> f64 {
        loop {
            let d: f64 = rng.sample(StandardNormal);
            if (-1.0..=1.0).contains(&d) {
                return d;
            }
        }
    }

    /// Noise sample `d` for one particle translation
    pub fn translation_noise<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.noise_enabled {
            Self::clipped_normal(rng)
        } else {
            0.0
        }
    }

    /// Degrees a single particle actually turns for a commanded rotation.
    ///
    /// Only the 2D ultrasonic mode perturbs rotation, with an unclipped
    /// normal sample and rounding to whole degrees.
    pub fn rotation_amount<R: Rng>(&self, degrees: f64, rng: &mut R) -> f64 {
        if self.mode != LocalizationMode::TwoDimensional {
            return degrees;
        }
        let d: f64 = if self.noise_enabled {
            rng.sample(StandardNormal)
        } else {
            0.0
        };
        (degrees * (1.0 + d / ROTATION_NOISE_DIVISOR)).round()
    }

    /// Translate every particle; returns the mean distance actually travelled
    pub fn translate<R: Rng>(&self, particles: &mut [Particle], distance: f64, rng: &mut R) -> f64 {
        if particles.is_empty() {
            return 0.0;
        }
        let mut travelled = 0.0;
        for particle in particles.iter_mut() {
            let noise = self.translation_noise(rng);
            travelled += particle.translate(distance, noise);
        }
        let mean = travelled / particles.len() as f64;
        debug!("translated {} particles by {:.2} (mean {:.2})", particles.len(), distance, mean);
        mean
    }

    /// Rotate every particle by the (possibly perturbed) commanded angle
    pub fn rotate<R: Rng>(&self, particles: &mut [Particle], degrees: f64, rng: &mut R) {
        for particle in particles.iter_mut() {
            let amount = self.rotation_amount(degrees, rng);
            particle.rotate(amount);
        }
        debug!("rotated {} particles by {:.1} deg", particles.len(), degrees);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Pose;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Largest deviation noise can add to a translation of `distance`
    fn max_translation_error(distance: f64) -> f64 {
        distance.abs() / TRANSLATION_NOISE_DIVISOR
    }

    #[test]
    fn test_clipped_normal_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10_000 {
            let d = MotionModel::clipped_normal(&mut rng);
            assert!((-1.0..=1.0).contains(&d));
        }
    }

    #[test]
    fn test_deterministic_motion() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = MotionModel::new(LocalizationMode::TwoDimensional, false);
        let mut particles = vec![Particle::new(Pose::new(0.0, 0.0, 0.0))];

        let travelled = model.translate(&mut particles, 50.0, &mut rng);
        assert_eq!(travelled, 50.0);
        assert_eq!(particles[0].pose, Pose::new(50.0, 0.0, 0.0));

        model.rotate(&mut particles, 90.0, &mut rng);
        assert_eq!(particles[0].pose.heading, 90.0);
    }

    #[test]
    fn test_translation_error_is_bounded() {
        let mut rng = StdRng::seed_from_u64(5);
        let model = MotionModel::new(LocalizationMode::TwoDimensional, true);
        let mut particles = vec![Particle::new(Pose::origin()); 2000];
        model.translate(&mut particles, 20.0, &mut rng);

        let bound = max_translation_error(20.0) + 1e-9;
        assert!(particles.iter().all(|p| (p.pose.x - 20.0).abs() <= bound));
        // noise must actually spread the particles
        assert!(particles.iter().any(|p| (p.pose.x - 20.0).abs() > 0.1));
    }

    #[test]
    fn test_rotation_noise_only_in_2d() {
        let mut rng = StdRng::seed_from_u64(9);
        let camera = MotionModel::new(LocalizationMode::Camera, true);
        let line = MotionModel::new(LocalizationMode::OneDimensional, true);
        for _ in 0..100 {
            assert_eq!(camera.rotation_amount(45.5, &mut rng), 45.5);
            assert_eq!(line.rotation_amount(45.5, &mut rng), 45.5);
        }

        let planar = MotionModel::new(LocalizationMode::TwoDimensional, true);
        let amounts: Vec<f64> = (0..500).map(|_| planar.rotation_amount(540.0, &mut rng)).collect();
        assert!(amounts.iter().all(|a| a.fract() == 0.0));
        assert!(amounts.iter().any(|a| *a != 540.0));
    }
}
