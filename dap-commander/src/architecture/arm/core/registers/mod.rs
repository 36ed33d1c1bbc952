//! Register tables of the supported cores.
pub mod cortex_m;
