//! The bullseye: a tree of Targets mirroring matched DOM elements.
//!
//! Targets are usually mapped 1:1 with elements. The top-level Target
//! never maps to an element itself; its children do.

pub mod tree;

pub use tree::{Bullseye, Target, Tier};
