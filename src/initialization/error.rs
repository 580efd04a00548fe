use std::{
    error::Error,
    fmt::{self, Display},
};

use rand_distr::{BernoulliError, NormalError};

/// Error returned when a random distribution can't be created from the given arguments.
#[derive(Debug)]
pub struct RandErr(String);

impl RandErr {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<NormalError> for RandErr {
    fn from(value: NormalError) -> Self {
        Self(value.to_string())
    }
}

impl From<BernoulliError> for RandErr {
    fn from(value: BernoulliError) -> Self {
        Self(value.to_string())
    }
}

impl Display for RandErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for RandErr {}
