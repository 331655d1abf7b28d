//! Plain-record form of a result for serialization.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::Kind;
use crate::errors::ResultflowError;

/// A result as a tagged record: `{"kind":"ok","value":..}` or
/// `{"kind":"error","error":..}`.
///
/// The tag is authoritative: a record tagged `ok` must carry `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResultRecord<T, E> {
    /// Success payload.
    Ok {
        /// The success value.
        value: T,
    },
    /// Error payload.
    Error {
        /// The domain error.
        error: E,
    },
}

impl<T, E> ResultRecord<T, E> {
    /// Returns the variant tag.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Ok { .. } => Kind::Ok,
            Self::Error { .. } => Kind::Error,
        }
    }

    /// Converts back into a `Result`.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Ok { value } => Ok(value),
            Self::Error { error } => Err(error),
        }
    }
}

impl<T: Serialize, E: Serialize> ResultRecord<T, E> {
    /// Serializes the record to a JSON string.
    pub fn to_json(&self) -> Result<String, ResultflowError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<T: DeserializeOwned, E: DeserializeOwned> ResultRecord<T, E> {
    /// Parses a record from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ResultflowError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<T, E> From<Result<T, E>> for ResultRecord<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ok { value },
            Err(error) => Self::Error { error },
        }
    }
}

impl<T, E> From<ResultRecord<T, E>> for Result<T, E> {
    fn from(record: ResultRecord<T, E>) -> Self {
        record.into_result()
    }
}
