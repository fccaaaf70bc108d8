use std::f64::consts::PI;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serde::{Deserialize, Serialize};

use crate::average::{AverageCalculator, Kernel, Policy, SweepPoint};
use crate::error::Result;
use crate::sweep::QSweep;
use crate::trajectory::{DumpTrajectory, Trajectory};

/// Parameters of one P(Q) run over a trajectory file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// First wavenumber of the sweep
    pub q0: f64,
    /// Exclusive upper bound of the sweep
    pub qmax: f64,
    /// Number of steps between `q0` and `qmax`
    pub points: usize,
    pub policy: Policy,
    #[serde(default)]
    pub kernel: Kernel,
    /// Only read this many frames from the trajectory
    #[serde(default)]
    pub max_frames: Option<usize>,
    /// Draw a progress bar over the Q values
    #[serde(default)]
    pub progress: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            q0: 2.0 * PI,
            qmax: 400.0 * PI,
            points: 200,
            policy: Policy::Parallel { workers: 3 },
            kernel: Kernel::Dense,
            max_frames: None,
            progress: false,
        }
    }
}

impl SweepConfig {
    pub fn q_values(&self) -> Result<QSweep> {
        QSweep::new(self.q0, self.qmax, self.points)
    }
}

/// Read a trajectory file and compute its P(Q) table.
///
/// One [`AverageCalculator`] is built per file and dropped at the end of the
/// call, nothing is shared between files.
pub fn run_file(trajectory_path: &Path, config: &SweepConfig) -> Result<Vec<SweepPoint>> {
    let q_values = config.q_values()?;

    let frames = DumpTrajectory::new(trajectory_path).read_frames(config.max_frames)?;
    let atoms: usize = frames.iter().map(|frame| frame.atom_count()).sum();
    info!(
        "{}: {} frames, {} atoms in total",
        trajectory_path.display(),
        frames.len(),
        atoms
    );

    let mut calculator = AverageCalculator::new(frames, config.policy)?.with_kernel(config.kernel);

    let pb = if config.progress {
        ProgressBar::new(q_values.clone().count() as u64)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} Q values ({percent}%) | ETA: {eta}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    match calculator.sweep_with(q_values, |_| pb.inc(1)) {
        Ok(points) => {
            pb.finish_with_message("Sweep complete");
            Ok(points)
        }
        Err(e) => {
            pb.abandon();
            Err(e)
        }
    }
}
