//! Machine configuration and promotion thresholds

/// Operand stack capacity in words; also the frame stack capacity and the
/// multiplier sizing the flat memory array.
pub const STACK_SIZE: usize = 256;

/// Calls after which an interpreted block is compiled by the baseline JIT.
pub const CALL_HOTNESS: u32 = 40;

/// Traversals of one backward jump after which the loop is bounced into
/// baseline code.
pub const BACKEDGE_HOTNESS: u32 = 40;

/// Calls from the interpreter after which a baseline block is recompiled
/// by the optimizing JIT.
pub const OPTIMIZE_HOTNESS: u32 = 2 * CALL_HOTNESS;

/// Configuration of a [`Machine`](crate::Machine)
///
/// # Example
///
/// ```
/// use interpreter::VmConfig;
///
/// let config = VmConfig::default().with_jit(false).with_call_hotness(10);
/// assert!(!config.jit_enabled);
/// assert_eq!(config.call_hotness, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Operand stack and frame stack capacity
    pub stack_size: usize,
    /// Baseline promotion threshold for calls
    pub call_hotness: u32,
    /// Baseline promotion threshold for backward jumps
    pub backedge_hotness: u32,
    /// Optimizing promotion threshold for native calls from the interpreter
    pub optimize_hotness: u32,
    /// Tracked cell count that triggers a collection
    pub gc_threshold: usize,
    /// Whether hot code is compiled at all
    pub jit_enabled: bool,
    /// Whether the optimizing tier may be used
    pub optimize_enabled: bool,
}

impl VmConfig {
    /// Configuration with the default thresholds
    pub fn new() -> Self {
        Self {
            stack_size: STACK_SIZE,
            call_hotness: CALL_HOTNESS,
            backedge_hotness: BACKEDGE_HOTNESS,
            optimize_hotness: OPTIMIZE_HOTNESS,
            gc_threshold: memory_manager::GC_THRESHOLD,
            jit_enabled: true,
            optimize_enabled: true,
        }
    }

    /// Enable or disable JIT compilation
    pub fn with_jit(mut self, enabled: bool) -> Self {
        self.jit_enabled = enabled;
        self
    }

    /// Enable or disable the optimizing tier
    pub fn with_optimizer(mut self, enabled: bool) -> Self {
        self.optimize_enabled = enabled;
        self
    }

    /// Set the call promotion threshold
    pub fn with_call_hotness(mut self, hotness: u32) -> Self {
        self.call_hotness = hotness;
        self
    }

    /// Set the backedge promotion threshold
    pub fn with_backedge_hotness(mut self, hotness: u32) -> Self {
        self.backedge_hotness = hotness;
        self
    }

    /// Set the optimizing promotion threshold
    pub fn with_optimize_hotness(mut self, hotness: u32) -> Self {
        self.optimize_hotness = hotness;
        self
    }

    /// Set the collection trigger
    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold;
        self
    }

    /// Set the stack capacity
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new()
    }
}
