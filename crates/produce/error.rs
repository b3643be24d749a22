use arbor_collections::VecError;
use thiserror::Error;

use crate::dispatch::Kind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProduceError {
    #[error(transparent)]
    Index(#[from] VecError),
    #[error("a {found} draft does not support {op}")]
    KindMismatch { op: &'static str, found: Kind },
}

pub(crate) fn kind_mismatch(op: &'static str, found: Kind) -> ProduceError {
    ProduceError::KindMismatch { op, found }
}
