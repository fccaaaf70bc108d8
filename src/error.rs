use std::fmt;

/// Errors produced while parsing trajectories or computing P(Q)
#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    /// Box with a non-positive or non-finite extent along one axis
    InvalidBox(String),
    /// Got an invalid parameter value in a function
    InvalidParameter(String),
    /// An atom was added to a frame before its box was set
    MissingBox { frame_id: i64 },
    /// The box of a frame can only be set once
    BoxAlreadySet { frame_id: i64 },
    /// Fewer than two atoms: the kernel divides by a zero total distance
    DegenerateFrame { frame_id: i64, q: f64, atoms: usize },
    /// The kernel produced NaN or an infinity
    NonFiniteResult { frame_id: i64, q: f64, value: f64 },
    /// The N x N distance matrix could not be allocated
    Allocation { frame_id: i64, q: f64, atoms: usize },
    /// A worker failed while computing one frame
    Task { frame_id: i64, q: f64, message: String },
    /// Averaging over an empty trajectory
    NoFrames,
    /// Malformed trajectory file
    Parse { line: usize, message: String },
    /// Thread pool creation failed
    ThreadPool(String),
    Io(std::io::Error),
    Csv(csv::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidBox(e) => write!(f, "invalid box: {}", e),
            Error::InvalidParameter(e) => write!(f, "invalid parameter: {}", e),
            Error::MissingBox { frame_id } => {
                write!(f, "frame {}: atom added before the box was set", frame_id)
            }
            Error::BoxAlreadySet { frame_id } => {
                write!(f, "frame {}: box is already set", frame_id)
            }
            Error::DegenerateFrame { frame_id, q, atoms } => write!(
                f,
                "frame {} at Q = {}: cannot compute structure factor with {} atom(s), need at least 2",
                frame_id, q, atoms
            ),
            Error::NonFiniteResult { frame_id, q, value } => write!(
                f,
                "frame {}: structure factor at Q = {} is not finite ({})",
                frame_id, q, value
            ),
            Error::Allocation { frame_id, q, atoms } => write!(
                f,
                "frame {} at Q = {}: failed to allocate {}x{} distance matrix",
                frame_id, q, atoms, atoms
            ),
            Error::Task { frame_id, q, message } => {
                write!(f, "frame {} at Q = {}: worker failed: {}", frame_id, q, message)
            }
            Error::NoFrames => write!(f, "no frames to average over"),
            Error::Parse { line, message } => write!(f, "line {}: {}", line, message),
            Error::ThreadPool(e) => write!(f, "failed to build thread pool: {}", e),
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Csv(e) => write!(f, "csv error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        Error::Io(error)
    }
}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Error {
        Error::Csv(error)
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(error: rayon::ThreadPoolBuildError) -> Error {
        Error::ThreadPool(error.to_string())
    }
}

/// Extract the message of a caught panic payload
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send + 'static>) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else {
        "unknown panic".to_string()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
