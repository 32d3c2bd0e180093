//! Cranelift module management
//!
//! Every compiled routine gets its own [`JITModule`], so its machine code
//! can be released independently: the module travels inside the
//! [`NativeCode`] owner and frees its memory when the code is dropped.

use bytecode_system::NativeCode;
use cranelift_codegen::ir::{types, AbiParam, Signature};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_frontend::FunctionBuilderContext;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use core_types::{NativeFn, VmError, VmResult};
use interpreter::{AbiType, RuntimeHelper};
use target_lexicon::Triple;

/// Cranelift-based code generation backend
///
/// Holds the host ISA; hands out one [`RoutineModule`] per routine.
pub struct CraneliftBackend {
    isa: OwnedTargetIsa,
    routines: u64,
}

impl CraneliftBackend {
    /// Create a backend for the host machine
    ///
    /// # Returns
    ///
    /// * `Err(VmError)` - If the host ISA is not supported by Cranelift
    pub fn new() -> VmResult<Self> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", "speed")
            .map_err(|e| VmError::compile(e.to_string()))?;
        flag_builder
            .set("is_pic", "false")
            .map_err(|e| VmError::compile(e.to_string()))?;

        let isa_builder = cranelift_native::builder().map_err(VmError::compile)?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| VmError::compile(e.to_string()))?;

        Ok(Self { isa, routines: 0 })
    }

    /// Number of routines opened so far
    pub fn routines(&self) -> u64 {
        self.routines
    }

    /// Target the backend generates code for
    pub fn triple(&self) -> &Triple {
        self.isa.triple()
    }

    /// Open a fresh module with every runtime helper importable
    pub(crate) fn routine(&mut self, name: &str) -> VmResult<RoutineModule> {
        let mut builder =
            JITBuilder::with_isa(self.isa.clone(), cranelift_module::default_libcall_names());
        for helper in RuntimeHelper::ALL {
            builder.symbol(helper.symbol(), helper.address());
        }
        let mut module = JITModule::new(builder);

        let mut helpers = Vec::with_capacity(RuntimeHelper::ALL.len());
        for helper in RuntimeHelper::ALL {
            let sig = helper_signature(&module, helper);
            let id = module
                .declare_function(helper.symbol(), Linkage::Import, &sig)
                .map_err(|e| VmError::compile(e.to_string()))?;
            helpers.push(id);
        }

        let signature = routine_signature(&module);
        self.routines += 1;
        let symbol = format!("norn_{}_{}", sanitize(name), self.routines);
        let id = module
            .declare_function(&symbol, Linkage::Export, &signature)
            .map_err(|e| VmError::compile(e.to_string()))?;

        let mut ctx = module.make_context();
        ctx.func.signature = signature.clone();

        Ok(RoutineModule {
            module,
            helpers,
            id,
            signature,
            ctx,
            builder_ctx: FunctionBuilderContext::new(),
        })
    }
}

impl std::fmt::Debug for CraneliftBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CraneliftBackend")
            .field("target", &self.triple().to_string())
            .field("routines", &self.routines)
            .finish()
    }
}

/// One routine under construction
pub(crate) struct RoutineModule {
    pub(crate) module: JITModule,
    pub(crate) helpers: Vec<FuncId>,
    pub(crate) id: FuncId,
    pub(crate) signature: Signature,
    pub(crate) ctx: Context,
    pub(crate) builder_ctx: FunctionBuilderContext,
}

impl RoutineModule {
    /// Compile the built function and hand out its entry point
    pub(crate) fn finish(mut self) -> VmResult<NativeCode> {
        self.module
            .define_function(self.id, &mut self.ctx)
            .map_err(|e| VmError::compile(format!("code generation failed: {:?}", e)))?;
        self.module.clear_context(&mut self.ctx);
        self.module
            .finalize_definitions()
            .map_err(|e| VmError::compile(e.to_string()))?;

        let code = self.module.get_finalized_function(self.id);
        // SAFETY: the function was declared with the routine signature,
        // which is the C ABI form of `NativeFn`.
        let entry = unsafe { std::mem::transmute::<*const u8, NativeFn>(code) };
        Ok(NativeCode::new(entry, Box::new(ModuleOwner(Some(self.module)))))
    }
}

/// Keeps a finalized module alive; frees its code on drop
struct ModuleOwner(Option<JITModule>);

impl Drop for ModuleOwner {
    fn drop(&mut self) {
        if let Some(module) = self.0.take() {
            // SAFETY: the owning NativeCode is being dropped, so no entry
            // point into this module is reachable any more.
            unsafe { module.free_memory() };
        }
    }
}

/// `fn(*mut NativeContext) -> i64`
pub(crate) fn routine_signature(module: &JITModule) -> Signature {
    let pointer = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(pointer));
    sig.returns.push(AbiParam::new(types::I64));
    sig
}

fn helper_signature(module: &JITModule, helper: RuntimeHelper) -> Signature {
    let abi = |ty: AbiType| match ty {
        AbiType::I64 => AbiParam::new(types::I64),
        AbiType::F64 => AbiParam::new(types::F64),
    };
    let mut sig = module.make_signature();
    sig.params.extend(helper.params().iter().copied().map(abi));
    sig.returns.extend(helper.returns().map(abi));
    sig
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
