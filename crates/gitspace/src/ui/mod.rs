//! Terminal presentation helpers

pub mod spinner;
