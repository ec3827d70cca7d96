//! Recorded result of one task execution
//!
//! An [`Outcome`] is what gets persisted in the build cache: either the value
//! the task returned or the error it failed with. Replaying an outcome hands
//! the caller the same `Result` the first execution produced.

use crate::error::{DkrError, DkrResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Result of exactly one task execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "payload", rename_all = "lowercase")]
pub enum Outcome<T, E> {
    /// The task returned a value
    Normal(T),
    /// The task failed
    Abrupt(E),
}

impl<T, E> Outcome<T, E> {
    pub fn from_result(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Normal(value),
            Err(error) => Self::Abrupt(error),
        }
    }

    /// Replay the outcome as the result the task first produced
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Normal(value) => Ok(value),
            Self::Abrupt(error) => Err(error),
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal(_))
    }

    pub fn is_abrupt(&self) -> bool {
        matches!(self, Self::Abrupt(_))
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Normal(_) => None,
            Self::Abrupt(error) => Some(error),
        }
    }
}

impl<T: Serialize, E: Serialize> Outcome<T, E> {
    /// Serialize to the bytes served to the build by the listener.
    ///
    /// MessagePack keeps non-finite floats and non-string map keys intact,
    /// so whatever serializes here decodes to an equal outcome.
    pub fn to_bytes(&self) -> DkrResult<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(DkrError::OutcomeSerialize)
    }
}

impl<T: DeserializeOwned, E: DeserializeOwned> Outcome<T, E> {
    /// Decode the output of a stored image. `image` is only used for reporting.
    pub fn from_bytes(image: &str, bytes: &[u8]) -> DkrResult<Self> {
        rmp_serde::from_slice(bytes).map_err(|source| DkrError::OutcomeDeserialize {
            image: image.to_string(),
            source,
        })
    }
}

/// Stock policies for [`ExpensiveTask::run_with`](crate::ExpensiveTask::run_with)
pub mod policy {
    use super::Outcome;

    /// True for outcomes of tasks that succeeded
    pub fn normal<T, E>(outcome: &Outcome<T, E>) -> bool {
        outcome.is_normal()
    }

    /// True for outcomes of tasks that failed
    pub fn abrupt<T, E>(outcome: &Outcome<T, E>) -> bool {
        outcome.is_abrupt()
    }

    pub fn always<T, E>(_: &Outcome<T, E>) -> bool {
        true
    }

    pub fn never<T, E>(_: &Outcome<T, E>) -> bool {
        false
    }
}
