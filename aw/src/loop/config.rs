//! Loop configuration types

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Limits for one tool execution loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Maximum tool rounds per request
    #[serde(default = "default_loop_budget")]
    pub loop_budget: u32,

    /// Capacity of the provider chunk channel
    #[serde(default = "default_chunk_buffer")]
    pub chunk_buffer: usize,
}

fn default_loop_budget() -> u32 {
    debug!("default_loop_budget: called");
    10
}

fn default_chunk_buffer() -> usize {
    debug!("default_chunk_buffer: called");
    32
}

impl Default for LoopConfig {
    fn default() -> Self {
        debug!("LoopConfig::default: called");
        Self {
            loop_budget: default_loop_budget(),
            chunk_buffer: default_chunk_buffer(),
        }
    }
}
