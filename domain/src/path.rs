//! Random path code generation.

use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;

use crate::PathGenerator;

/// Draws path codes uniformly from `[A-Za-z0-9]` using the operating
/// system's CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomPathGenerator;

impl RandomPathGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl PathGenerator for RandomPathGenerator {
    fn generate(&self, length: usize) -> String {
        let path = generate_path(length);
        tracing::trace!(length, "generated path code");
        path
    }
}

/// Length-`n` alphanumeric code from `OsRng`.
pub fn generate_path(n: usize) -> String {
    Alphanumeric.sample_string(&mut OsRng, n)
}
