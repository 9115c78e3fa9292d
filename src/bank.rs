// Particle population of a single filter run
//
// The population size is fixed when the run starts. Resampling replaces
// particles but never changes how many there are.

use crate::particle::{Checkpoint, Particle};
use crate::utilities::{effective_sample_size, log_sum_exp};
use nalgebra::{Point3, Vector3};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Fixed-size weighted particle population.
#[derive(Debug, Clone)]
pub struct ParticleSet {
    particles: Vec<Particle>,
}

impl ParticleSet {
    /// `count` particles at `position` heading along `direction`, with uniform weights.
    pub fn new(count: usize, position: Point3<f64>, direction: Vector3<f64>) -> Self {
        let log_weight = -(count as f64).ln();
        ParticleSet {
            particles: (0..count)
                .map(|_| Particle::new(position, direction, log_weight))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Particle> {
        self.particles.iter_mut()
    }

    pub fn any_alive(&self) -> bool {
        self.particles.iter().any(Particle::is_alive)
    }

    pub fn checkpoint(&self) -> Vec<Checkpoint> {
        self.particles.iter().map(Particle::checkpoint).collect()
    }

    /// Roll every particle back to `checkpoints`, taken on this same set.
    pub fn restore(&mut self, checkpoints: &[Checkpoint]) {
        for (p, checkpoint) in self.particles.iter_mut().zip(checkpoints) {
            p.restore(checkpoint);
        }
    }

    /// Normalize log weights so the weights sum to one.
    ///
    /// Returns `false` and leaves the weights untouched when every weight is
    /// zero or any is NaN.
    pub fn normalize(&mut self) -> bool {
        let log_weights: Vec<f64> = self.particles.iter().map(|p| p.log_weight).collect();
        let total = log_sum_exp(&log_weights);
        if !total.is_finite() {
            return false;
        }
        for p in &mut self.particles {
            p.log_weight -= total;
        }
        true
    }

    /// Linear-space weights.
    pub fn weights(&self) -> Vec<f64> {
        self.particles.iter().map(Particle::weight).collect()
    }

    /// `1 / sum(w^2)`, assuming normalized weights.
    pub fn effective_sample_size(&self) -> f64 {
        effective_sample_size(&self.weights())
    }

    /// Multinomial resampling: draw `len()` particles with replacement in
    /// proportion to their weights, then reset the weights to uniform.
    ///
    /// Returns `false` when the weights cannot define a distribution.
    pub fn resample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let count = self.particles.len();
        let index = match WeightedIndex::new(self.weights()) {
            Ok(index) => index,
            Err(_) => return false,
        };
        let log_weight = -(count as f64).ln();
        let resampled: Vec<Particle> = (0..count)
            .map(|_| {
                let mut p = self.particles[index.sample(rng)].clone();
                p.log_weight = log_weight;
                p
            })
            .collect();
        self.particles = resampled;
        true
    }

    /// Index of the heaviest particle, lowest index on ties.
    pub fn heaviest(&self) -> Option<usize> {
        self.heaviest_where(|_| true)
    }

    /// Index of the heaviest particle satisfying `keep`, lowest index on ties.
    pub fn heaviest_where<F>(&self, keep: F) -> Option<usize>
    where
        F: Fn(&Particle) -> bool,
    {
        let mut best: Option<(usize, f64)> = None;
        for (i, p) in self.particles.iter().enumerate() {
            if p.log_weight.is_nan() || !keep(p) {
                continue;
            }
            match best {
                Some((_, w)) if p.log_weight <= w => {}
                _ => best = Some((i, p.log_weight)),
            }
        }
        best.map(|(i, _)| i)
    }
}
