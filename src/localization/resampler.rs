//! Weight normalization and resampling-wheel resampling

use log::{debug, warn};
use ordered_float::OrderedFloat;
use rand::Rng;

use crate::common::{LocalizationError, LocalizationResult};
use crate::localization::particle::Particle;

/// Divide every weight by the total so that they sum to one.
///
/// A population whose weights are all zero cannot be normalized.
pub fn normalize(particles: &mut [Particle]) -> LocalizationResult<()> {
    let sum: f64 = particles.iter().map(|p| p.weight as f64).sum();
    if !(sum > 0.0) || !sum.is_finite() {
        warn!("cannot normalize {} particles, weight sum {}", particles.len(), sum);
        return Err(LocalizationError::DegeneratePopulation(particles.len()));
    }
    for particle in particles.iter_mut() {
        particle.weight = (particle.weight as f64 / sum) as f32;
    }
    Ok(())
}

/// Effective number of particles for normalized weights
pub fn effective_sample_size(particles: &[Particle]) -> f64 {
    let sum_w_squared: f64 = particles.iter().map(|p| (p.weight as f64).powi(2)).sum();
    if sum_w_squared > 0.0 {
        1.0 / sum_w_squared
    } else {
        0.0
    }
}

/// Draw a new population of the same size from normalized weights.
///
/// Classic resampling wheel: start at a random index and advance a pointer
/// by up to twice the maximum weight per draw. Copies carry weight 0 until
/// the next measurement rescores them.
pub fn resample_wheel<R: Rng>(particles: &[Particle], rng: &mut R) -> Vec<Particle> {
    let n = particles.len();
    if n == 0 {
        return Vec::new();
    }

    let max_w = particles
        .iter()
        .map(|p| OrderedFloat(p.weight as f64))
        .max()
        .map(|w| w.into_inner())
        .unwrap_or(0.0);

    let mut index = rng.gen_range(0..n);
    let mut beta = 0.0;
    let mut next_generation = Vec::with_capacity(n);

    for _ in 0..n {
        beta += rng.gen::<f64>() * 2.0 * max_w;
        while beta > particles[index].weight as f64 {
            beta -= particles[index].weight as f64;
            index = (index + 1) % n;
        }
        let mut copy = particles[index];
        copy.weight = 0.0;
        next_generation.push(copy);
    }

    next_generation
}

/// Normalize in place, then draw the next generation
pub fn resample<R: Rng>(particles: &mut [Particle], rng: &mut R) -> LocalizationResult<Vec<Particle>> {
    normalize(particles)?;
    debug!(
        "resampling {} particles, n_eff {:.1}",
        particles.len(),
        effective_sample_size(particles)
    );
    Ok(resample_wheel(particles, rng))
}
