//! On-disk artifacts: naming conventions and age-based rotation.

pub mod artifact;
pub mod retention;
