use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use log::{info, warn};

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::structure::{Atom, Coordinate, SimulationBox};

/// Number of header lines before the atom records of each frame
const HEADER_LINES: usize = 9;

/// Trait for reading trajectory files into frames
pub trait Trajectory {
    /// Read frames in file order
    ///
    /// # Arguments
    /// * `max_frames` - Maximum number of frames to read (None for all frames)
    ///
    /// # Returns
    /// Frames with their box set and all atoms wrapped into it
    fn read_frames(&self, max_frames: Option<usize>) -> Result<Vec<Frame>>;

    /// Copy the first `frames` frames of the trajectory to `output_path`.
    ///
    /// Useful to cut a small test input out of a long production run.
    ///
    /// # Returns
    /// Number of frames written
    fn truncate(&self, output_path: &Path, frames: usize) -> Result<usize>;
}

/// Text dump with one block per frame:
///
/// ```text
/// ITEM: TIMESTEP
/// <frame id>
/// ITEM: NUMBER OF ATOMS
/// <N>
/// ITEM: BOX BOUNDS pp pp pp
/// <x_min> <x_max>
/// <y_min> <y_max>
/// <z_min> <z_max>
/// ITEM: ATOMS id type x y z
/// <id> <type> <x> <y> <z>     (N lines)
/// ```
pub struct DumpTrajectory {
    file_path: String,
}

impl DumpTrajectory {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
        }
    }

    pub fn file_path(&self) -> &Path {
        Path::new(&self.file_path)
    }

    fn open(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.file_path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open trajectory file {}: {}", self.file_path, e),
            ))
        })?;
        Ok(BufReader::new(file))
    }
}

impl Trajectory for DumpTrajectory {
    fn read_frames(&self, max_frames: Option<usize>) -> Result<Vec<Frame>> {
        let reader = self.open()?;

        let mut frames: Vec<Frame> = Vec::new();
        let mut line_index = 0;
        let mut bounds = [0.0; 6];

        for (number, line_result) in reader.lines().enumerate() {
            let line_number = number + 1;
            let line = line_result?;
            let line = line.trim();

            if line_index == 0 {
                if line.is_empty() {
                    continue;
                }
                if max_frames.map_or(false, |max| frames.len() >= max) {
                    break;
                }
                frames.push(Frame::new(-1));
            }

            let Some(frame) = frames.last_mut() else {
                continue;
            };

            match line_index {
                0 | 2 | 4 | 8 => {}
                1 => frame.set_frame_id(parse_field(line, line_number, "frame id")?),
                3 => frame.set_declared_atom_count(parse_field(line, line_number, "atom count")?),
                5..=7 => {
                    let axis = 2 * (line_index - 5);
                    let (min, max) = parse_bounds(line, line_number)?;
                    bounds[axis] = min;
                    bounds[axis + 1] = max;

                    if line_index == 7 {
                        let cell = SimulationBox::new(
                            bounds[0], bounds[1], bounds[2], bounds[3], bounds[4], bounds[5],
                        )
                        .map_err(|e| Error::Parse { line: line_number, message: e.to_string() })?;
                        frame.set_box(cell)?;
                    }
                }
                _ => frame.add_atom(parse_atom(line, line_number)?)?,
            }

            line_index += 1;
            if line_index == frame.declared_atom_count() + HEADER_LINES {
                line_index = 0;
            }
        }

        if line_index != 0 {
            if let Some(frame) = frames.last() {
                if frame.simulation_box().is_none() {
                    warn!(
                        "{}: dropping frame {} with incomplete header",
                        self.file_path,
                        frame.frame_id()
                    );
                    frames.pop();
                } else {
                    warn!(
                        "{}: last frame {} is truncated, keeping {} of {} atoms",
                        self.file_path,
                        frame.frame_id(),
                        frame.atom_count(),
                        frame.declared_atom_count()
                    );
                }
            }
        }

        info!("read {} frames from {}", frames.len(), self.file_path);
        Ok(frames)
    }

    fn truncate(&self, output_path: &Path, frames: usize) -> Result<usize> {
        let reader = self.open()?;

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(output_path)?);

        let mut written = 0;
        let mut line_index = 0;
        let mut declared = 0;
        for (number, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line_index == 0 {
                if written == frames {
                    break;
                }
                if line.trim().is_empty() {
                    continue;
                }
            }
            if line_index == 3 {
                declared = parse_field(line.trim(), number + 1, "atom count")?;
            }

            writeln!(writer, "{}", line)?;

            line_index += 1;
            if line_index >= HEADER_LINES && line_index == declared + HEADER_LINES {
                line_index = 0;
                written += 1;
            }
        }
        writer.flush()?;

        info!("wrote {} frames to {}", written, output_path.display());
        Ok(written)
    }
}

fn parse_field<T>(value: &str, line: usize, what: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| Error::Parse {
        line,
        message: format!("failed to parse {} from '{}': {}", what, value, e),
    })
}

fn parse_bounds(line: &str, line_number: usize) -> Result<(f64, f64)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(Error::Parse {
            line: line_number,
            message: format!("expected two box bounds, got '{}'", line),
        });
    }
    let min = parse_field(parts[0], line_number, "box lower bound")?;
    let max = parse_field(parts[1], line_number, "box upper bound")?;
    Ok((min, max))
}

fn parse_atom(line: &str, line_number: usize) -> Result<Atom> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(Error::Parse {
            line: line_number,
            message: format!("expected 'id type x y z', got '{}'", line),
        });
    }

    let atom_id = parse_field(parts[0], line_number, "atom id")?;
    let atom_type = parse_field(parts[1], line_number, "atom type")?;
    let x = parse_field(parts[2], line_number, "x")?;
    let y = parse_field(parts[3], line_number, "y")?;
    let z = parse_field(parts[4], line_number, "z")?;

    Ok(Atom::new(atom_id, atom_type, Coordinate::new(x, y, z)))
}
