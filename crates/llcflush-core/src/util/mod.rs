//! Utility types and functions used throughout llcflush.
//!
//! This module provides:
//! - [`Size`] - Memory size representation
//! - Constants for memory geometry ([`PAGE_SIZE`], [`CL_SIZE`], [`LLC_SIZE`], etc.)
//! - [`pin_to_core`] for keeping a run on one logical core

mod affinity;
mod constants;
mod size;

pub use self::affinity::pin_to_core;
pub use self::constants::*;
pub use self::size::Size;
