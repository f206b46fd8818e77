//! Contracts of the two backends a pipeline talks to.

pub mod catalog;
pub mod object;
