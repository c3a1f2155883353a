//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

pub mod down;
pub mod shared;
pub mod status;
pub mod stop;
pub mod up;
