//! All the interface bits for the supported architectures.
pub mod arm;
