//! Stack builders for the ScanSafeGuard platform.
//!
//! Each builder validates its inputs, declares its resources into a fresh
//! [`Stack`], and returns handles (export references) for dependent stacks.
//! [`root::build_app`] wires them together in dependency order.

pub mod api;
pub mod batch;
pub mod eb_rules;
pub mod github;
pub mod network;
pub mod parameters;
pub mod registry;
pub mod relay;
pub mod root;
pub mod scheduler;
pub mod secrets;
pub mod stripe;
pub mod zone;

use crate::core::inputs::DeploymentInputs;
use crate::core::settings::Tunables;
use crate::core::types::Stack;

pub const PROJECT_TAG: &str = "ScanSafeGuard";

/// Shared inputs every stack builder reads.
#[derive(Debug, Clone, Copy)]
pub struct StackContext<'a> {
    pub tunables: &'a Tunables,
    pub inputs: &'a DeploymentInputs,
}

impl<'a> StackContext<'a> {
    pub fn new(tunables: &'a Tunables, inputs: &'a DeploymentInputs) -> Self {
        Self { tunables, inputs }
    }

    /// A new stack carrying the project, environment and owner tags.
    pub fn stack(&self, name: &str, description: &str) -> Stack {
        let mut stack = Stack::new(name, description);
        stack.add_tag("Project", PROJECT_TAG);
        stack.add_tag("Environment", &self.inputs.environment);
        stack.add_tag("Owner", &self.inputs.owner);
        stack
    }
}
