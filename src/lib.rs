//! Probabilistic white-matter tractography with a particle filter.
//!
//! Each seed voxel starts a sequential Monte Carlo run whose particles
//! follow the local fiber orientation. The runs are spread over a worker pool
//! and their results are gathered into per-label connectivity maps and fiber
//! bundles.

mod bank;
mod data;
mod diffusion;
mod error;
mod fast_rng;
mod filter;
mod geometry;
mod likelihood;
mod model;
mod particle;
pub mod phantom;
mod prior;
mod proposal;
mod scheduler;
mod seed;
mod settings;
mod stats;
mod tally;
mod utilities;
mod volume;

pub use bank::ParticleSet;
pub use data::{fibonacci_hemisphere, fibonacci_sphere, SPHERE_DIRECTIONS};
pub use diffusion::{DiffusionModel, DiffusionSignal, SignalProfile};
pub use error::{Result, TractographyError};
pub use fast_rng::FastRng;
pub use filter::{
    FilterRun, FilterState, ParticleFilter, RunResult, SeedPropagator, Termination, Visit,
};
pub use geometry::ImageGeometry;
pub use likelihood::LikelihoodDensity;
pub use model::Tractography;
pub use particle::{Checkpoint, Particle, ParticleState};
pub use prior::PriorDensity;
pub use proposal::{Proposal, ProposalDensity};
pub use scheduler::{partition, SeedScheduler};
pub use seed::{enumerate_seeds, Seed};
pub use settings::{CoordinateConvention, Settings};
pub use stats::{angle_between, log_vmf_normalizer, AngularDistribution};
pub use tally::{
    ConnectivityMap, Fiber, FiberBundle, LabelStatistics, LabelTally, Tallies, TractographyOutput,
};
pub use utilities::{effective_sample_size, log_sum_exp};
pub use volume::{LabelVolume, Mask, Volume};
