//! Sluice Core - domain types shared by the ingestion pipeline and its stores.

mod error;
mod key;
mod types;

pub use error::{Error, Result};
pub use key::CanonicalKey;
pub use types::*;
