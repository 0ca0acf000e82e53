//! Measurement model: turns a sensor reading and a particle into a weight
//!
//! Deviations between measured and simulated values are quantized into
//! penalty buckets relative to the measured value. The ultrasonic penalties
//! are summed and inverted; a matching camera signature scales the result up.

use serde::{Deserialize, Serialize};

use crate::common::Environment;
use crate::localization::particle::Particle;
use crate::localization::sensor::{SensorReading, UltrasonicDirection};

/// Fixed quantization of relative deviations into penalties
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyTable {
    /// Relative deviation edges, strictly decreasing
    pub edges: [f64; 4],
    /// Penalty for exceeding the matching edge
    pub penalties: [f64; 4],
    /// Penalty for a non-zero deviation below every edge
    pub floor: f64,
}

impl Default for PenaltyTable {
    fn default() -> Self {
        PenaltyTable {
            edges: [0.9, 0.75, 0.5, 0.25],
            penalties: [81.0, 27.0, 9.0, 3.0],
            floor: 1.0,
        }
    }
}

impl PenaltyTable {
    /// Penalty for `deviation` measured against `reference`.
    ///
    /// An exact match carries no penalty.
    pub fn penalty(&self, deviation: f64, reference: f64) -> f64 {
        if deviation == 0.0 {
            return 0.0;
        }
        let reference = reference.abs();
        self.edges
            .iter()
            .zip(self.penalties.iter())
            .find(|(edge, _)| deviation > *edge * reference)
            .map(|(_, penalty)| *penalty)
            .unwrap_or(self.floor)
    }
}

/// Per-particle breakdown of a weight computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Likelihood {
    pub total_penalty: f64,
    pub base_weight: f64,
    pub vision_score: f64,
    pub weight: f32,
}

/// Computes unnormalized particle weights
#[derive(Debug, Clone, Copy)]
pub struct LikelihoodScorer {
    table: PenaltyTable,
    vision_enabled: bool,
}

impl LikelihoodScorer {
    pub fn new(table: PenaltyTable, vision_enabled: bool) -> Self {
        LikelihoodScorer {
            table,
            vision_enabled,
        }
    }

    /// Summed ultrasonic penalty over the directions both sides measured
    pub fn ultrasonic_penalty<E: Environment + ?Sized>(
        &self,
        reading: &SensorReading,
        particle: &Particle,
        env: &E,
    ) -> f64 {
        UltrasonicDirection::ALL
            .iter()
            .filter_map(|&direction| {
                let measured = reading.distance(direction)?;
                let simulated = particle.simulated_distance(env, direction);
                if simulated <= 0.0 {
                    return None;
                }
                Some(self.table.penalty((measured - simulated).abs(), measured))
            })
            .sum()
    }

    /// Inverse of the penalty; 1 when nothing was compared
    pub fn base_weight(total_penalty: f64) -> f64 {
        if total_penalty == 0.0 {
            1.0
        } else {
            1.0 / total_penalty
        }
    }

    /// Camera agreement score, 0 when the dominant signatures differ.
    ///
    /// The particle's weight from the previous cycle is carried into the score.
    pub fn vision_score<E: Environment + ?Sized>(
        &self,
        reading: &SensorReading,
        particle: &Particle,
        env: &E,
    ) -> f64 {
        let observed = match reading.vision.as_ref().and_then(|v| v.dominant_observation()) {
            Some(observed) => observed,
            None => return 0.0,
        };
        let (simulated_id, simulated) = match particle.simulated_vision(env) {
            Some(simulated) => simulated,
            None => return 0.0,
        };
        let (observed_id, observation) = observed;
        if observed_id != simulated_id {
            return 0.0;
        }

        let angle_penalty = self.table.penalty(
            (observation.angle - simulated.angle_offset).abs(),
            observation.angle,
        );
        let width_penalty = self
            .table
            .penalty((observation.width - simulated.width).abs(), observation.width);

        particle.weight as f64 + Self::base_weight(angle_penalty + width_penalty)
    }

    /// Full weight computation for one particle
    pub fn evaluate<E: Environment + ?Sized>(
        &self,
        reading: &SensorReading,
        particle: &Particle,
        env: &E,
    ) -> Likelihood {
        if !env.contains(particle.position()) {
            return Likelihood {
                total_penalty: 0.0,
                base_weight: 0.0,
                vision_score: 0.0,
                weight: 0.0,
            };
        }

        let total_penalty = self.ultrasonic_penalty(reading, particle, env);
        let base_weight = Self::base_weight(total_penalty);
        let vision_score = if self.vision_enabled {
            self.vision_score(reading, particle, env)
        } else {
            0.0
        };
        let scale = if vision_score > 0.0 {
            vision_score * 4.0 + 1.0
        } else {
            1.0
        };

        Likelihood {
            total_penalty,
            base_weight,
            vision_score,
            weight: saturate(base_weight * scale),
        }
    }

    pub fn weight<E: Environment + ?Sized>(
        &self,
        reading: &SensorReading,
        particle: &Particle,
        env: &E,
    ) -> f32 {
        self.evaluate(reading, particle, env).weight
    }

    /// Rescore every particle in place
    pub fn score_population<E: Environment + ?Sized>(
        &self,
        reading: &SensorReading,
        particles: &mut [Particle],
        env: &E,
    ) {
        for particle in particles.iter_mut() {
            particle.sensor_head_angle = reading.sensor_head_angle;
            particle.weight = self.weight(reading, particle, env);
        }
    }
}

/// Clamp to the largest finite `f32`.
///
/// The vision score feeds the previous weight back in, so repeated
/// measurements without a resample compound it.
fn saturate(weight: f64) -> f32 {
    weight.min(f32::MAX as f64) as f32
}

impl Default for LikelihoodScorer {
    fn default() -> Self {
        Self::new(PenaltyTable::default(), false)
    }
}
