//! The Result value and its plain-record form.
//!
//! The Result value itself is `std::result::Result`. This module adds the
//! `Kind` discriminator and the serde record used to move results across
//! a serialization boundary.

mod record;

pub use record::ResultRecord;

use serde::{Deserialize, Serialize};

/// Which variant a result holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// The success variant.
    Ok,
    /// The domain-error variant.
    Error,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Discriminator inspection for `Result`.
pub trait ResultKind {
    /// Returns the variant tag.
    fn kind(&self) -> Kind;
}

impl<T, E> ResultKind for Result<T, E> {
    fn kind(&self) -> Kind {
        match self {
            Ok(_) => Kind::Ok,
            Err(_) => Kind::Error,
        }
    }
}
