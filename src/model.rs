use crate::diffusion::{DiffusionModel, DiffusionSignal};
use crate::error::{Result, TractographyError};
use crate::filter::{ParticleFilter, RunResult};
use crate::scheduler::SeedScheduler;
use crate::seed::{enumerate_seeds, Seed};
use crate::settings::Settings;
use crate::tally::TractographyOutput;
use crate::volume::{LabelVolume, Mask};
use log::info;

/// A tractography job: inputs, settings and the entry point that runs it.
///
/// Construction checks the settings and that the volumes line up, so a job
/// that exists can always be run.
pub struct Tractography<M, S> {
    model: M,
    signal: S,
    mask: Mask,
    labels: LabelVolume,
    settings: Settings,
}

impl<M, S> Tractography<M, S>
where
    M: DiffusionModel,
    S: DiffusionSignal,
{
    pub fn new(model: M, signal: S, mask: Mask, labels: LabelVolume, settings: Settings) -> Result<Self> {
        let job = Self {
            model,
            signal,
            mask,
            labels,
            settings,
        };
        job.validate()?;
        Ok(job)
    }

    fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        let domain = self.signal.domain();
        let mask = self.mask.geometry();
        if mask.size != domain.size {
            return Err(TractographyError::DimensionMismatch {
                what: "mask grid",
                expected: format!("{:?} (signal)", domain.size),
                found: format!("{:?}", mask.size),
            });
        }

        let labels = self.labels.geometry();
        let spacing = self.settings.seed_spacing;
        if labels
            .spacing
            .iter()
            .any(|s| (s - spacing).abs() > 1e-6 * spacing)
        {
            return Err(TractographyError::DimensionMismatch {
                what: "seed label spacing",
                expected: format!("{} (seed_spacing)", spacing),
                found: format!("{:?}", labels.spacing),
            });
        }

        let label_extent = labels.extent();
        let mask_extent = mask.extent();
        for axis in 0..3 {
            let tolerance = mask.spacing[axis];
            if (label_extent[axis] - mask_extent[axis]).abs() > tolerance
                || (labels.origin[axis] - mask.origin[axis]).abs() > tolerance
            {
                return Err(TractographyError::DimensionMismatch {
                    what: "seed label coverage",
                    expected: format!("origin {:?}, extent {:?}", mask.origin, mask_extent),
                    found: format!("origin {:?}, extent {:?}", labels.origin, label_extent),
                });
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Seeds the job will track, in voxel order.
    pub fn seeds(&self) -> Vec<Seed> {
        enumerate_seeds(&self.labels, &self.mask, &self.settings)
    }

    fn filter(&self) -> ParticleFilter<'_, M, S> {
        ParticleFilter::new(&self.model, &self.signal, &self.mask, &self.settings)
    }

    /// Track every seed and return the per-label maps, bundles and statistics.
    pub fn run(&self) -> Result<TractographyOutput> {
        let scheduler = SeedScheduler::new(self.settings.threads, self.settings.seed)?;
        let seeds = self.seeds();
        info!(
            "{} seeds over {} labels, {} particles each, {} workers",
            seeds.len(),
            self.labels.labels().len(),
            self.settings.particles,
            scheduler.workers()
        );

        let tallies = scheduler.run(&self.filter(), &seeds, self.signal.domain());
        let output = tallies.finalize(
            self.settings.coordinate_convention,
            self.settings.require_complete_bundles,
        );
        for statistics in output.statistics.values() {
            info!("{}", statistics);
        }
        Ok(output)
    }

    /// Track every seed and return the individual run results in seed order.
    pub fn run_seeds(&self) -> Result<Vec<RunResult>> {
        let scheduler = SeedScheduler::new(self.settings.threads, self.settings.seed)?;
        Ok(scheduler.run_batch(&self.filter(), &self.seeds()))
    }
}
