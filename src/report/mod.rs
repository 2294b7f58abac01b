//! Text and JSON rendering of catalog views.

pub mod generator;

pub use generator::*;
