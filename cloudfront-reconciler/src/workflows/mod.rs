//! Multi-step workflows built on the engine primitives.

pub mod certificate;
pub mod delete;
