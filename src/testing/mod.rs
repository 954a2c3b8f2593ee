//! Testing support
//!
//! Seeded observation generators for unit tests and CLI demos.

pub mod generators;

pub use generators::ObservationGenerator;
