//! Library surface of the Kiln command-line driver.
//!
//! Only the JSON graph-description parser lives here; it is split out
//! of the binary so fuzzing and integration tests can reach it.

pub mod desc;
