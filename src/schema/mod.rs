//! Platform-side record schema
//!
//! This module defines the raw, platform-shaped inputs of the sync engine:
//! typed raw records and the incremental change feed that carries them.

mod change;
mod record;

pub use change::*;
pub use record::*;
