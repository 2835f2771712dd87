//! Core synthesis logic.

pub mod codegen;
pub mod inputs;
pub mod intrinsic;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod settings;
pub mod state;
pub mod types;
