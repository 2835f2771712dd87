//! Tripwire: template hashing, the synthesis event log and drift detection.

pub mod drift;
pub mod eventlog;
pub mod hasher;
