//! Text-generation service contract and its local HTTP implementation.

pub mod config;
pub mod generator;

pub use generator::{Generator, GeneratorError, GeneratorInfo};
