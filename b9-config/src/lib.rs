//! B9 Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all B9 crates.

use serde::{Deserialize, Serialize};

/// Top-level virtual machine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Emit per-instruction trace events while interpreting
    pub debug: bool,
    /// Run the bytecode verifier when a module is loaded
    pub verify_on_load: bool,
    /// Execution limits
    pub limits: LimitConfig,
    /// Reference object heap tuning
    pub heap: HeapConfig,
}

/// Configuration for execution limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum number of values on the operand stack
    pub max_stack_size: usize,
    /// Maximum nesting of function calls
    pub max_recursion_depth: usize,
}

/// Configuration for the reference object heap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Live object count at which allocation triggers a collection
    pub collect_threshold: usize,
}

/// Execution phase enum for phase-specific configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loader,
    Verify,
    Vm,
    Interp,
}

impl Phase {
    /// All phases, in pipeline order
    pub const ALL: [Phase; 4] = [Phase::Loader, Phase::Verify, Phase::Vm, Phase::Interp];

    /// Get the string name of the phase
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Loader => "loader",
            Phase::Verify => "verify",
            Phase::Vm => "vm",
            Phase::Interp => "interp",
        }
    }

    /// Get the log target name for this phase
    pub const fn target(&self) -> &'static str {
        match self {
            Phase::Loader => "b9::loader",
            Phase::Verify => "b9::verify",
            Phase::Vm => "b9::vm",
            Phase::Interp => "b9::interp",
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 10240,
            max_recursion_depth: 256,
        }
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            collect_threshold: 4096,
        }
    }
}
