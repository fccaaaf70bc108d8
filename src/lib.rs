pub mod average;
pub mod driver;
pub mod error;
pub mod frame;
pub mod output;
pub mod structure;
pub mod sweep;
pub mod trajectory;

#[cfg(feature = "python")]
pub mod python_bindings;

// Re-export commonly used types and traits
pub use average::{AverageCalculator, Kernel, Policy, SweepPoint};
pub use driver::{run_file, SweepConfig};
pub use error::{Error, Result};
pub use frame::Frame;
pub use output::{format_scientific, result_file_name, save_csv, save_result};
pub use structure::{Atom, Coordinate, PairDistanceCache, SimulationBox};
pub use sweep::QSweep;
pub use trajectory::{DumpTrajectory, Trajectory};
