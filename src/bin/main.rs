use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use structure_factor_rs::{
    result_file_name, run_file, save_csv, save_result, DumpTrajectory, Kernel, Policy,
    SweepConfig, Trajectory,
};

/// Command-line tool computing the structure factor P(Q) of MD trajectories
#[derive(Parser)]
#[command(name = "structure-factor")]
#[command(about = "Compute structure factor curves from LAMMPS-style trajectory dumps", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute P(Q) over a Q sweep for each trajectory file
    Sweep {
        /// Trajectory files to process
        #[arg(short, long, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Also process every `.atom` file in this directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Directory receiving the `.dat` result tables
        #[arg(short, long, default_value = "result")]
        result_dir: PathBuf,

        /// First Q value (default: 2π)
        #[arg(long, default_value_t = 2.0 * PI)]
        q0: f64,

        /// Exclusive upper bound of the sweep (default: 400π)
        #[arg(long, default_value_t = 400.0 * PI)]
        qmax: f64,

        /// Number of steps between q0 and qmax (default: 200)
        #[arg(short = 'm', long, default_value_t = 200)]
        points: usize,

        /// Spread frames over a pool of worker threads
        #[arg(long)]
        parallel: bool,

        /// Size of the worker pool used with --parallel (default: 3)
        #[arg(short, long, default_value_t = 3)]
        workers: usize,

        /// Per-frame kernel
        #[arg(long, value_enum, default_value_t = Kernel::Dense)]
        kernel: Kernel,

        /// Maximum number of frames to read per file (default: all frames)
        #[arg(long)]
        max_frames: Option<usize>,

        /// Also write a `q,p` CSV next to each result table
        #[arg(long)]
        csv: bool,
    },

    /// Copy the first frames of a trajectory into a smaller file
    Truncate {
        /// Trajectory file to read
        #[arg(short, long)]
        input: PathBuf,

        /// Output trajectory file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of frames to keep (default: 20)
        #[arg(short, long, default_value_t = 20)]
        frames: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Sweep {
            input,
            data_dir,
            result_dir,
            q0,
            qmax,
            points,
            parallel,
            workers,
            kernel,
            max_frames,
            csv,
        } => {
            let mut files = input;
            if let Some(dir) = data_dir {
                match list_trajectories(&dir) {
                    Ok(found) => files.extend(found),
                    Err(e) => {
                        eprintln!("❌ Error listing {:?}: {}", dir, e);
                        std::process::exit(1);
                    }
                }
            }
            if files.is_empty() {
                eprintln!("❌ No trajectory files given, use --input or --data-dir");
                std::process::exit(1);
            }

            let config = SweepConfig {
                q0,
                qmax,
                points,
                policy: if parallel { Policy::Parallel { workers } } else { Policy::Serial },
                kernel,
                max_frames,
                progress: true,
            };
            info!("Sweep configuration: {:?}", config);

            for trajectory in files {
                println!("Processing trajectory: {:?}", trajectory);

                let results = match run_file(&trajectory, &config) {
                    Ok(r) => {
                        println!("✅ Computed P(Q) for {} Q values", r.len());
                        r
                    }
                    Err(e) => {
                        eprintln!("❌ Error processing {:?}: {}", trajectory, e);
                        std::process::exit(1);
                    }
                };

                let output_path = result_dir.join(result_file_name(&trajectory));
                if let Err(e) = save_result(&output_path, &results) {
                    eprintln!("❌ Error saving results: {}", e);
                    std::process::exit(1);
                }
                println!("📄 Results saved to: {:?}", output_path);

                if csv {
                    let csv_path = output_path.with_extension("csv");
                    if let Err(e) = save_csv(&csv_path, &results) {
                        eprintln!("❌ Error saving CSV: {}", e);
                        std::process::exit(1);
                    }
                    println!("📄 CSV saved to: {:?}", csv_path);
                }
            }
        }

        Commands::Truncate { input, output, frames } => {
            println!("Truncating trajectory: {:?}", input);

            match DumpTrajectory::new(&input).truncate(&output, frames) {
                Ok(written) => {
                    println!("✅ Kept {} frames", written);
                    println!("📄 Trajectory saved to: {:?}", output);
                }
                Err(e) => {
                    eprintln!("❌ Error truncating trajectory: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Every `.atom` file of `dir`, sorted by name
fn list_trajectories(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "atom") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
