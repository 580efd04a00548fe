use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;

use crate::{initialization::RandErr, params::ParamKey};

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, NetErr>;

/// The network builder's error type.
#[derive(Debug)]
pub enum NetErr {
    /// The configuration was rejected before building anything.
    InvalidConfig(String),
    ChannelMismatch {
        expected: usize,
        got: usize,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    LabelShape {
        head: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },
    MissingLabels {
        head: &'static str,
    },
    /// A pretrained value doesn't have the shape its layer expects.
    ShapeMismatch {
        param: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    DuplicateParam(ParamKey),
    Shape(ShapeError),
    NotBuilt,
    StaleStep,
    Pretrained(String),
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for NetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            NetErr::ChannelMismatch { expected, got } => write!(
                f,
                "the image batch has {got} channels, expected {expected} (blue, green, red)"
            ),
            NetErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            NetErr::LabelShape {
                head,
                expected,
                got,
            } => write!(
                f,
                "the {head} label batch has shape {got:?}, expected {expected:?}"
            ),
            NetErr::MissingLabels { head } => {
                write!(f, "the {head} head is trainable but no label batch was given")
            }
            NetErr::ShapeMismatch {
                param,
                expected,
                got,
            } => write!(
                f,
                "pretrained value for {param} has shape {got:?}, expected {expected:?}"
            ),
            NetErr::DuplicateParam(key) => write!(f, "parameter {key} was registered twice"),
            NetErr::Shape(e) => write!(f, "shape error: {e}"),
            NetErr::NotBuilt => write!(f, "the network has not been built yet"),
            NetErr::StaleStep => write!(
                f,
                "the optimizer step belongs to an evaluation that is no longer current"
            ),
            NetErr::Pretrained(msg) => write!(f, "pretrained weights: {msg}"),
            NetErr::Io(e) => write!(f, "io error: {e}"),
            NetErr::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for NetErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NetErr::Io(e) => Some(e),
            NetErr::Json(e) => Some(e),
            NetErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NetErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for NetErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<ShapeError> for NetErr {
    fn from(e: ShapeError) -> Self {
        Self::Shape(e)
    }
}

impl From<RandErr> for NetErr {
    fn from(e: RandErr) -> Self {
        Self::InvalidConfig(e.to_string())
    }
}

impl From<safetensors::SafeTensorError> for NetErr {
    fn from(e: safetensors::SafeTensorError) -> Self {
        Self::Pretrained(e.to_string())
    }
}
