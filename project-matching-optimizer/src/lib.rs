//! Project matching and presentation scheduling as mixed-integer programs.
//!
//! A run enumerates the dataset into dense indices ([`enumerate`]), derives
//! coefficient matrices ([`matrices`]), builds a solver-independent model
//! ([`matching`], [`model`]), hands it to a [`solver`] backend or writes it out
//! ([`lp_format`]) and decodes the result into records ([`decode`]). [`job`] strings
//! these together.

pub mod attempt;
pub mod decode;
pub mod entities;
pub mod enumerate;
pub mod error;
pub mod index;
pub mod job;
pub mod lp_format;
pub mod matching;
pub mod matrices;
pub mod model;
pub mod pair_slots;
pub mod params;
pub mod progress;
pub mod schedule;
pub mod solver;
pub mod sparse;

pub use error::{OptimizerError, Result};
