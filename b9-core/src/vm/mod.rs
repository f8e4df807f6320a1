//! 虚拟机
//!
//! [`VirtualMachine`] 持有已加载的模块与紧凑区、按函数索引缓存的已编译入口点、
//! 原语表、对象内存和原语输出。`run` 把调用分派给已编译入口点或解释器，
//! 两条路径对外表现一致。

mod context;
mod execution;
pub mod operators;
mod stack;

pub use context::ExecutionContext;
pub use stack::{OperandStack, StackCursor};

use std::io::Write;

use b9_config::VmConfig;
use tracing::{debug, warn};

use crate::arena::PackedArena;
use crate::binary;
use crate::codegen::{CodeGenerator, EntryPoint};
use crate::error::{InterpreterFault, ModuleError, VmError};
use crate::memory::{ObjectHeap, ObjectMemory};
use crate::module::Module;
use crate::primitives::PrimitiveTable;
use crate::value::Value;
use crate::verify;
use crate::TARGET_VM;

/// `run` 的调用目标
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FunctionRef {
    Index(usize),
    Name(String),
}

impl From<usize> for FunctionRef {
    fn from(index: usize) -> Self {
        FunctionRef::Index(index)
    }
}

impl From<&str> for FunctionRef {
    fn from(name: &str) -> Self {
        FunctionRef::Name(name.to_string())
    }
}

impl From<String> for FunctionRef {
    fn from(name: String) -> Self {
        FunctionRef::Name(name)
    }
}

/// 已加载的模块
struct Loaded {
    module: Module,
    arena: PackedArena,
    entry_points: Vec<Option<EntryPoint>>,
}

/// 虚拟机
pub struct VirtualMachine {
    config: VmConfig,
    loaded: Option<Loaded>,
    primitives: PrimitiveTable,
    memory: Box<dyn ObjectMemory>,
    code_generator: Option<Box<dyn CodeGenerator>>,
    output: Box<dyn Write + Send>,
}

impl VirtualMachine {
    /// 创建虚拟机：标准原语表、参考对象堆、输出到 stdout
    pub fn new(config: VmConfig) -> Self {
        let memory = Box::new(ObjectHeap::new(&config.heap));
        Self {
            config,
            loaded: None,
            primitives: PrimitiveTable::standard(),
            memory,
            code_generator: None,
            output: Box::new(std::io::stdout()),
        }
    }

    // ==================== 构建 ====================

    pub fn with_memory(mut self, memory: Box<dyn ObjectMemory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_code_generator(mut self, generator: Box<dyn CodeGenerator>) -> Self {
        self.code_generator = Some(generator);
        self
    }

    pub fn with_primitives(mut self, primitives: PrimitiveTable) -> Self {
        self.primitives = primitives;
        self
    }

    /// 原语输出目标
    pub fn with_output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = output;
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn memory(&self) -> &dyn ObjectMemory {
        self.memory.as_ref()
    }

    // ==================== 加载 ====================

    /// 加载模块与紧凑区
    ///
    /// 两者的函数数必须一致，每个函数以唯一的 `END_SECTION` 结束；
    /// `verify_on_load` 时再做完整的字节码校验。
    pub fn load(&mut self, module: Module, arena: PackedArena) -> Result<(), VmError> {
        if module.function_count() != arena.function_count() {
            return Err(ModuleError::ArenaMismatch {
                module: module.function_count(),
                arena: arena.function_count(),
            }
            .into());
        }
        for func in module.functions() {
            func.check_end_section()?;
        }
        if self.config.verify_on_load {
            verify::verify(&module, self.primitives.len())?;
        }

        debug!(
            target: TARGET_VM,
            functions = module.function_count(),
            strings = module.string_count(),
            "module loaded"
        );
        let entry_points = vec![None; module.function_count()];
        self.loaded = Some(Loaded {
            module,
            arena,
            entry_points,
        });
        Ok(())
    }

    /// 从结构化模块加载（紧凑区由模块构建）
    pub fn load_module(&mut self, module: Module) -> Result<(), VmError> {
        let arena = PackedArena::from_module(&module);
        self.load(module, arena)
    }

    /// 解码并加载字节流
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        let (module, arena) = binary::deserialize(bytes)?;
        self.load(module, arena)
    }

    pub fn module(&self) -> Option<&Module> {
        self.loaded.as_ref().map(|l| &l.module)
    }

    fn loaded(&self) -> Result<&Loaded, VmError> {
        self.loaded.as_ref().ok_or(VmError::NoModuleLoaded)
    }

    // ==================== 查询 ====================

    pub fn function_count(&self) -> usize {
        self.loaded.as_ref().map_or(0, |l| l.module.function_count())
    }

    pub fn string_at(&self, index: usize) -> Result<&str, VmError> {
        Ok(self.loaded()?.arena.string_view(index)?)
    }

    /// 按名称或索引解析函数
    pub fn resolve(&self, target: &FunctionRef) -> Result<usize, VmError> {
        let loaded = self.loaded()?;
        match target {
            FunctionRef::Index(index) => {
                loaded
                    .module
                    .function_by_index(*index)
                    .map_err(|_| VmError::FunctionNotFound(format!("#{}", index)))?;
                Ok(*index)
            }
            FunctionRef::Name(name) => loaded
                .module
                .function_index_by_name(name)
                .map_err(|_| VmError::FunctionNotFound(name.clone())),
        }
    }

    // ==================== 编译入口点 ====================

    /// 为函数安装已编译入口点
    pub fn set_entry_point(&mut self, index: usize, entry: EntryPoint) -> Result<(), VmError> {
        let loaded = self.loaded.as_mut().ok_or(VmError::NoModuleLoaded)?;
        let count = loaded.entry_points.len();
        let slot = loaded
            .entry_points
            .get_mut(index)
            .ok_or(ModuleError::FunctionIndexOutOfRange { index, count })?;
        *slot = Some(entry);
        Ok(())
    }

    pub fn has_entry_point(&self, index: usize) -> bool {
        self.loaded
            .as_ref()
            .and_then(|l| l.entry_points.get(index))
            .is_some_and(Option::is_some)
    }

    /// 编译单个函数；失败时记录警告，该函数继续解释执行
    ///
    /// 返回是否安装了入口点。
    pub fn generate_code(&mut self, index: usize) -> Result<bool, VmError> {
        let generator = self
            .code_generator
            .as_mut()
            .ok_or(VmError::NoCodeGenerator)?;
        let loaded = self.loaded.as_mut().ok_or(VmError::NoModuleLoaded)?;
        let count = loaded.entry_points.len();
        if index >= count {
            return Err(ModuleError::FunctionIndexOutOfRange { index, count }.into());
        }

        match generator.generate(&loaded.module, index) {
            Ok(entry) => {
                loaded.entry_points[index] = Some(entry);
                Ok(true)
            }
            Err(e) => {
                warn!(target: TARGET_VM, error = %e, "falling back to interpreter");
                Ok(false)
            }
        }
    }

    /// 编译全部函数，返回成功编译的数量
    pub fn generate_all_code(&mut self) -> Result<usize, VmError> {
        if self.code_generator.is_none() {
            return Err(VmError::NoCodeGenerator);
        }
        let mut compiled = 0;
        for index in 0..self.function_count() {
            if self.generate_code(index)? {
                compiled += 1;
            }
        }
        debug!(
            target: TARGET_VM,
            compiled,
            total = self.function_count(),
            "code generation finished"
        );
        Ok(compiled)
    }

    // ==================== 执行 ====================

    /// 以 `args` 调用函数
    ///
    /// 参数按逆序压栈：`params[0]` 是最后一个实参。
    pub fn run(
        &mut self,
        target: impl Into<FunctionRef>,
        args: &[Value],
    ) -> Result<Value, VmError> {
        let target = target.into();
        let index = self.resolve(&target)?;

        let loaded = self.loaded.as_ref().ok_or(VmError::NoModuleLoaded)?;
        let func = loaded.module.function_by_index(index)?;
        if args.len() != func.nparams as usize {
            return Err(VmError::BadFunctionCall {
                function: func.name.clone(),
                expected: func.nparams as usize,
                got: args.len(),
            });
        }

        debug!(target: TARGET_VM, function = %func.name, args = args.len(), "run");

        let mut ctx = ExecutionContext::new(
            &loaded.module,
            &loaded.arena,
            &loaded.entry_points,
            &self.primitives,
            self.memory.as_mut(),
            self.output.as_mut(),
            &self.config.limits,
            self.config.debug,
        );
        for arg in args.iter().rev() {
            ctx.push(*arg)?;
        }
        let result = ctx.call_function(index)?;
        ctx.output()
            .flush()
            .map_err(|e| InterpreterFault::Output(e.to_string()))?;

        debug!(target: TARGET_VM, function = %func.name, %result, "run finished");
        Ok(result)
    }
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl std::fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("config", &self.config)
            .field("functions", &self.function_count())
            .field("primitives", &self.primitives)
            .field("code_generator", &self.code_generator.is_some())
            .finish()
    }
}
