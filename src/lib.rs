//! ssg-infra: CloudFormation synthesis for the ScanSafeGuard platform.
//!
//! Typed stack builders declare the network, registries, batch scanning,
//! Stripe webhook relay, job scheduling, and job API stacks. Synthesis
//! renders one template per stack, records BLAKE3 hashes in a manifest,
//! and orders stacks by their cross-stack imports.

pub mod cli;
pub mod constructs;
pub mod core;
pub mod stacks;
pub mod tripwire;
