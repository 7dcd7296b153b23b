//! Configuration for VM frames.

/// Per-frame VM configuration.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Pace execution through a [`Debugger`](crate::Debugger).
    /// Default: false
    pub debug: bool,

    /// Initial operand stack reservation.
    /// Default: 64
    pub stack_capacity: usize,

    /// Emit a `trace` event for every executed instruction.
    /// Default: false
    pub trace_instructions: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            debug: false,
            stack_capacity: 64,
            trace_instructions: false,
        }
    }
}

impl VmConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config with the step controller enabled.
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Default::default()
        }
    }

    /// Create config that traces every instruction.
    pub fn traced() -> Self {
        Self {
            trace_instructions: true,
            ..Default::default()
        }
    }

    /// Enable or disable the step controller.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set the initial operand stack reservation.
    pub fn stack_capacity(mut self, capacity: usize) -> Self {
        self.stack_capacity = capacity;
        self
    }

    /// Enable or disable per-instruction tracing.
    pub fn trace_instructions(mut self, enabled: bool) -> Self {
        self.trace_instructions = enabled;
        self
    }
}
