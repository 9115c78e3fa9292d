use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Why a particle stopped advancing, or `Alive` while it still propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParticleState {
    Alive,
    OutOfMask,
    ProposalExhausted,
    MaxStepsReached,
}

/// One hypothesis of the fiber path.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Point3<f64>,
    /// Unit direction of the last displacement
    pub direction: Vector3<f64>,
    /// Unnormalized weight, log space
    pub log_weight: f64,
    /// Visited positions, starting with the seed
    pub trajectory: Vec<Point3<f64>>,
    pub state: ParticleState,
}

/// State of a particle before a step, enough to undo that step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    position: Point3<f64>,
    direction: Vector3<f64>,
    log_weight: f64,
    state: ParticleState,
    trajectory_len: usize,
}

impl Particle {
    pub fn new(position: Point3<f64>, direction: Vector3<f64>, log_weight: f64) -> Self {
        Self {
            position,
            direction,
            log_weight,
            trajectory: vec![position],
            state: ParticleState::Alive,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state == ParticleState::Alive
    }

    pub fn weight(&self) -> f64 {
        self.log_weight.exp()
    }

    /// Move by `step` along `direction` and record the new position.
    pub fn advance(&mut self, direction: Vector3<f64>, step: f64) {
        self.direction = direction;
        self.position += direction * step;
        self.trajectory.push(self.position);
    }

    /// Stop the particle. Its trajectory and weight are kept.
    pub fn stop(&mut self, state: ParticleState) {
        self.state = state;
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            position: self.position,
            direction: self.direction,
            log_weight: self.log_weight,
            state: self.state,
            trajectory_len: self.trajectory.len(),
        }
    }

    /// Return to `checkpoint`, dropping the positions recorded since.
    pub fn restore(&mut self, checkpoint: &Checkpoint) {
        self.position = checkpoint.position;
        self.direction = checkpoint.direction;
        self.log_weight = checkpoint.log_weight;
        self.state = checkpoint.state;
        self.trajectory.truncate(checkpoint.trajectory_len);
    }
}
