use std::path::PathBuf;

use crate::{addr::Addr, hints::HintError, image::ImageError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("call depth limit of {limit} exceeded at {addr} (call stack: {stack})")]
    DepthLimit {
        addr: Addr,
        limit: u32,
        stack: String,
    },
    #[error("bad program image: {0}")]
    Image(#[from] ImageError),
    #[error("bad hint file: {0}")]
    Hint(#[from] HintError),
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
