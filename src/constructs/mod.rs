//! Reusable resource builders shared by every stack.

pub mod http_api;
pub mod iam;
pub mod lambda;
pub mod messaging;
