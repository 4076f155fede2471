use std::num::ParseIntError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{text:?} is not a valid id: {source}")]
    InvalidId {
        text: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Unable to load store config: {}", _0)]
    Config(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
