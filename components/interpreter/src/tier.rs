//! The seam between the interpreter and the JIT tiers

use bytecode_system::{BlockId, JitTier, NativeCode, Program};
use core_types::VmResult;
use serde::Serialize;

/// A throwaway baseline routine entering a block mid-way
#[derive(Debug)]
pub struct EntryRoutine {
    /// The routine; dropping it releases the code
    pub code: NativeCode,
    /// Blocks compiled and installed along the way, the entered block
    /// included
    pub installed: usize,
}

/// Code generator used by the machine to promote hot blocks
///
/// Implementations install compiled code into the program themselves,
/// including any callees compiled on the way, and perform the global
/// call-site linking that follows a baseline promotion.
pub trait JitBackend {
    /// Compile `block` at `tier` and install it
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of blocks installed, callees included
    /// * `Err(VmError)` - On an unsupported opcode or a callee that does
    ///   not meet the tier's precondition
    fn compile(&mut self, program: &mut Program, block: BlockId, tier: JitTier)
        -> VmResult<usize>;

    /// Compile a baseline routine for `block` that starts at `start_ip`
    ///
    /// The routine runs in the caller's activation and is not installed.
    /// Implementations may install the block itself at the basic tier on
    /// the way, so that recursive calls inside the routine have a target.
    fn compile_entry(
        &mut self,
        program: &mut Program,
        block: BlockId,
        start_ip: usize,
    ) -> VmResult<EntryRoutine>;

    /// Whether `compile(block, Optimizing)` would succeed right now
    fn can_optimize(&self, program: &Program, block: BlockId) -> bool;
}

/// Counters describing what the machine promoted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PromotionStats {
    /// Blocks installed at the basic tier
    pub baseline_compiles: u64,
    /// Blocks installed at the optimizing tier
    pub optimizing_compiles: u64,
    /// Hot backedges bounced into native code
    pub backedge_bounces: u64,
}
