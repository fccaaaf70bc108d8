use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{panic_message, Error, Result};
use crate::frame::Frame;
use crate::structure::PairDistanceCache;

/// How frame contributions are scheduled for each Q
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    /// Frames one after the other, summed in trajectory order
    Serial,
    /// Frames spread over a fixed pool of `workers` threads
    Parallel { workers: usize },
}

/// Which implementation of the per-frame reduction to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum Kernel {
    /// Dense N x N distance matrix, rebuilt for each Q
    #[default]
    Dense,
    /// Pair loop with distances memoized per frame across the sweep.
    ///
    /// The caches hold N(N-1)/2 entries per frame until the sweep ends, which
    /// for thousands of atoms over many frames runs into gigabytes.
    Pairwise,
}

/// One line of the P(Q) table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub q: f64,
    pub p: f64,
}

/// Average of the per-frame structure factor over a whole trajectory
pub struct AverageCalculator {
    frames: Vec<Frame>,
    // one cache per frame, only filled by the pairwise kernel
    caches: Vec<PairDistanceCache>,
    policy: Policy,
    kernel: Kernel,
    pool: Option<rayon::ThreadPool>,
}

impl AverageCalculator {
    pub fn new(frames: Vec<Frame>, policy: Policy) -> Result<Self> {
        let pool = match policy {
            Policy::Serial => None,
            Policy::Parallel { workers: 0 } => {
                return Err(Error::InvalidParameter(
                    "parallel policy needs at least one worker".to_string(),
                ));
            }
            Policy::Parallel { workers } => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|index| format!("frame-worker-{}", index))
                    .build()?,
            ),
        };

        let caches = vec![PairDistanceCache::new(); frames.len()];
        Ok(Self {
            frames,
            caches,
            policy,
            kernel: Kernel::default(),
            pool,
        })
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Mean of `Frame::compute(q)` over all frames.
    ///
    /// Every frame has to succeed: the first failing frame aborts the
    /// calculation for this Q and no partial average is returned.
    pub fn average(&mut self, q: f64) -> Result<f64> {
        if self.frames.is_empty() {
            return Err(Error::NoFrames);
        }

        let start = Instant::now();
        debug!("cal_begin Q = {:.15e} over {} frames", q, self.frames.len());

        let Self { frames, caches, kernel, pool, .. } = self;
        let kernel = *kernel;
        let total = match pool {
            None => {
                let mut total = 0.0;
                for (frame, cache) in frames.iter_mut().zip(caches.iter_mut()) {
                    total += run_task(frame, cache, kernel, q)?;
                }
                total
            }
            Some(pool) => pool.install(|| {
                frames
                    .par_iter_mut()
                    .zip(caches.par_iter_mut())
                    .map(|(frame, cache)| run_task(frame, cache, kernel, q))
                    .try_reduce(|| 0.0, |a, b| Ok(a + b))
            })?,
        };

        debug!("cal_end Q = {:.15e} in {:?}", q, start.elapsed());
        Ok(total / frames.len() as f64)
    }

    /// Compute P(Q) for every value of `q_values`, in order
    pub fn sweep<I>(&mut self, q_values: I) -> Result<Vec<SweepPoint>>
    where
        I: IntoIterator<Item = f64>,
    {
        self.sweep_with(q_values, |_| {})
    }

    /// Same as [`AverageCalculator::sweep`], calling `on_point` after each Q
    pub fn sweep_with<I, F>(&mut self, q_values: I, mut on_point: F) -> Result<Vec<SweepPoint>>
    where
        I: IntoIterator<Item = f64>,
        F: FnMut(&SweepPoint),
    {
        info!(
            "sweeping {} frames with {:?} policy and {:?} kernel",
            self.frames.len(),
            self.policy,
            self.kernel
        );

        let mut points = Vec::new();
        let mut result = Ok(());
        for q in q_values {
            match self.average(q) {
                Ok(p) => {
                    let point = SweepPoint { q, p };
                    on_point(&point);
                    points.push(point);
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        // distances are only reused within one sweep
        for cache in &mut self.caches {
            cache.clear();
        }

        result.map(|_| points)
    }
}

fn run_task(frame: &mut Frame, cache: &mut PairDistanceCache, kernel: Kernel, q: f64) -> Result<f64> {
    let frame_id = frame.frame_id();
    guarded(frame_id, q, || match kernel {
        Kernel::Dense => frame.compute(q),
        Kernel::Pairwise => frame.compute_pairwise(q, cache),
    })
}

/// Run one frame task, turning a panic into an error
fn guarded<F>(frame_id: i64, q: f64, task: F) -> Result<f64>
where
    F: FnOnce() -> Result<f64>,
{
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(value) => value,
        Err(payload) => Err(Error::Task {
            frame_id,
            q,
            message: panic_message(payload),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{Atom, Coordinate, SimulationBox};
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    /// Deterministic pseudo-random frame, positions may fall outside the box
    fn random_frame(frame_id: i64, atoms: usize, seed: u64) -> Frame {
        let mut state = seed;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };

        let cell = SimulationBox::new(-5.0, 15.0, 0.0, 20.0, 0.0, 20.0).unwrap();
        let mut frame = Frame::with_box(frame_id, cell);
        for id in 0..atoms {
            let position = Coordinate::new(30.0 * next() - 8.0, 25.0 * next(), 20.0 * next());
            frame.add_atom(Atom::new(id as i64 + 1, 1, position)).unwrap();
        }
        frame
    }

    fn trajectory(frames: usize) -> Vec<Frame> {
        (0..frames).map(|i| random_frame(i as i64, 40, 17 + i as u64)).collect()
    }

    #[test]
    fn test_serial_and_parallel_agree() {
        let q_values: Vec<f64> = (1..12).map(|i| i as f64 * 2.0 * PI).collect();

        let mut serial = AverageCalculator::new(trajectory(9), Policy::Serial).unwrap();
        let mut parallel =
            AverageCalculator::new(trajectory(9), Policy::Parallel { workers: 3 }).unwrap();

        let serial = serial.sweep(q_values.iter().copied()).unwrap();
        let parallel = parallel.sweep(q_values.iter().copied()).unwrap();

        assert_eq!(serial.len(), q_values.len());
        for ((s, p), q) in serial.iter().zip(&parallel).zip(&q_values) {
            assert_eq!(s.q, *q);
            assert_eq!(p.q, *q);
            assert_relative_eq!(s.p, p.p, epsilon = 1e-20, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_empty_sweep() {
        // would fail on the first Q if any frame was computed
        let mut calculator =
            AverageCalculator::new(vec![random_frame(0, 1, 3)], Policy::Serial).unwrap();
        assert!(calculator.sweep(Vec::<f64>::new()).unwrap().is_empty());
        assert_eq!(calculator.frames()[0].structure_factor(), None);
    }

    #[test]
    fn test_identical_frames_average() {
        let frame = random_frame(0, 25, 99);
        let expected = frame.clone().compute(13.0).unwrap();

        for policy in [Policy::Serial, Policy::Parallel { workers: 2 }] {
            let frames = vec![frame.clone(); 6];
            let mut calculator = AverageCalculator::new(frames, policy).unwrap();
            assert_relative_eq!(calculator.average(13.0).unwrap(), expected, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_failing_frame_aborts_q() {
        let mut frames = trajectory(5);
        frames.push(random_frame(42, 1, 5));

        for policy in [Policy::Serial, Policy::Parallel { workers: 3 }] {
            let mut calculator = AverageCalculator::new(frames.clone(), policy).unwrap();
            let error = calculator.sweep(vec![1.0, 2.0]).unwrap_err();
            assert!(matches!(error, Error::DegenerateFrame { frame_id: 42, atoms: 1, .. }));
        }
    }

    #[test]
    fn test_no_frames() {
        let mut calculator = AverageCalculator::new(Vec::new(), Policy::Serial).unwrap();
        assert!(matches!(calculator.average(1.0), Err(Error::NoFrames)));
        assert!(calculator.sweep(Vec::<f64>::new()).unwrap().is_empty());
    }

    #[test]
    fn test_zero_workers() {
        assert!(matches!(
            AverageCalculator::new(trajectory(2), Policy::Parallel { workers: 0 }),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_pairwise_kernel_agrees() {
        let q_values = [2.0 * PI, 5.5, 80.0];
        let mut dense = AverageCalculator::new(trajectory(4), Policy::Serial).unwrap();
        let mut pairwise = AverageCalculator::new(trajectory(4), Policy::Parallel { workers: 2 })
            .unwrap()
            .with_kernel(Kernel::Pairwise);
        assert_eq!(pairwise.kernel(), Kernel::Pairwise);

        let dense = dense.sweep(q_values).unwrap();
        let pairwise = pairwise.sweep(q_values).unwrap();
        for (d, p) in dense.iter().zip(&pairwise) {
            assert_relative_eq!(d.p, p.p, epsilon = 1e-20, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_sweep_reports_each_point() {
        let mut calculator = AverageCalculator::new(trajectory(2), Policy::Serial).unwrap();
        let mut seen = Vec::new();
        let points = calculator.sweep_with(vec![3.0, 1.0, 2.0], |point| seen.push(point.q)).unwrap();
        assert_eq!(seen, vec![3.0, 1.0, 2.0]);
        assert_eq!(points.iter().map(|p| p.q).collect::<Vec<_>>(), seen);
    }

    #[test]
    fn test_failure_reports_q() {
        let frames = vec![random_frame(1, 2, 11), random_frame(7, 1, 12)];
        let mut calculator = AverageCalculator::new(frames, Policy::Parallel { workers: 2 }).unwrap();

        let error = calculator.sweep(vec![12.5]).unwrap_err();
        assert!(matches!(error, Error::DegenerateFrame { frame_id: 7, q, atoms: 1 } if q == 12.5));
        assert!(error.to_string().contains("Q = 12.5"));
    }

    #[test]
    fn test_mid_sweep_failure_reports_q() {
        // Q = 0 zeroes every scaled distance, the kernel divides 0 by 0
        let mut calculator = AverageCalculator::new(trajectory(3), Policy::Serial).unwrap();
        let mut seen = Vec::new();
        let error = calculator.sweep_with(vec![4.0, 0.0, 8.0], |point| seen.push(point.q)).unwrap_err();

        assert_eq!(seen, vec![4.0]);
        assert!(matches!(error, Error::NonFiniteResult { frame_id: 0, q, .. } if q == 0.0));
    }

    #[test]
    fn test_panicking_task_becomes_error() {
        let error = guarded(3, 1.5, || panic!("kernel exploded")).unwrap_err();
        match error {
            Error::Task { frame_id, q, message } => {
                assert_eq!(frame_id, 3);
                assert_eq!(q, 1.5);
                assert_eq!(message, "kernel exploded");
            }
            other => panic!("expected a task error, got {:?}", other),
        }

        // same inside a worker thread of the pool
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let results: Vec<Result<f64>> = pool.install(|| {
            (0..4)
                .into_par_iter()
                .map(|i| guarded(i, 2.0, || if i == 2 { panic!("frame {}", i) } else { Ok(1.0) }))
                .collect()
        });
        assert!(matches!(&results[2], Err(Error::Task { frame_id: 2, message, .. }) if message == "frame 2"));
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    }

    #[test]
    fn test_pair_caches_are_released_after_sweep() {
        let mut calculator = AverageCalculator::new(trajectory(2), Policy::Serial)
            .unwrap()
            .with_kernel(Kernel::Pairwise);

        calculator.sweep(vec![1.0, 2.0]).unwrap();
        assert!(calculator.caches.iter().all(|cache| cache.is_empty()));

        // and after a failed sweep
        calculator.sweep(vec![3.0, 0.0]).unwrap_err();
        assert!(calculator.caches.iter().all(|cache| cache.is_empty()));
    }
}
