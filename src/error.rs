use crate::codec::DecodeFailure;
use crate::embed::frame::FrameError;
use crate::package::Field;
use crate::store::StorageError;
use crate::validation::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that reach the command line
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid app url {url:?}: {source}")]
    AppUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("{}", describe_problems(.0))]
    Invalid(Vec<(Field, ValidationError)>),

    #[error("this link is broken: {0}")]
    Decode(#[from] DecodeFailure),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cannot show the portfolio: {0}")]
    Frame(#[from] FrameError),
}

impl From<Vec<(Field, ValidationError)>> for Error {
    fn from(problems: Vec<(Field, ValidationError)>) -> Self {
        Error::Invalid(problems)
    }
}

fn describe_problems(problems: &[(Field, ValidationError)]) -> String {
    problems
        .iter()
        .map(|(field, problem)| format!("{field}: {problem}"))
        .collect::<Vec<_>>()
        .join("; ")
}
