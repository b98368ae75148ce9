//! Engine configuration.

/// Default bound on nested calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Default bound on host re-entry (natives calling back into user code, and
/// comprehension regions). Each level costs several native stack frames.
pub const DEFAULT_MAX_NATIVE_DEPTH: usize = 64;

/// Knobs for one [`Vm`](super::vm::Vm) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Nested call limit; exceeding it is a fault.
    pub max_call_depth: usize,
    /// Nested re-entry limit; exceeding it is a fault.
    pub max_native_depth: usize,
    /// Write a `[TRACE]` line to stderr for every dispatched instruction.
    pub trace: bool,
    /// Print `Program finished.` when a halt instruction runs.
    pub announce_halt: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_native_depth: DEFAULT_MAX_NATIVE_DEPTH,
            trace: false,
            announce_halt: false,
        }
    }
}

impl VmConfig {
    /// Defaults overridden by `PLASMA_TRACE`, `PLASMA_MAX_CALL_DEPTH`,
    /// `PLASMA_MAX_NATIVE_DEPTH` and `PLASMA_ANNOUNCE_HALT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_call_depth: depth_setting(&lookup, "PLASMA_MAX_CALL_DEPTH")
                .unwrap_or(defaults.max_call_depth),
            max_native_depth: depth_setting(&lookup, "PLASMA_MAX_NATIVE_DEPTH")
                .unwrap_or(defaults.max_native_depth),
            trace: lookup("PLASMA_TRACE")
                .map(|v| flag_enabled(&v))
                .unwrap_or(defaults.trace),
            announce_halt: lookup("PLASMA_ANNOUNCE_HALT")
                .map(|v| flag_enabled(&v))
                .unwrap_or(defaults.announce_halt),
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_native_depth(mut self, depth: usize) -> Self {
        self.max_native_depth = depth;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_announce_halt(mut self, announce: bool) -> Self {
        self.announce_halt = announce;
        self
    }
}

// A positive integer, or nothing.
fn depth_setting(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .filter(|depth| *depth > 0)
}

// Set unless explicitly "false" or "0".
fn flag_enabled(value: &str) -> bool {
    let value = value.trim();
    value != "false" && value != "0"
}
