//! B9 Core - Stack virtual machine (pure logic, no IO)
//!
//! Contains the module wire format, the packed arena, the interpreter and the
//! virtual machine. Only operates on in-memory data structures; primitive
//! output goes to the writer handed to the VM.
//!
//! Configuration is passed explicitly via parameters, not via global state.

pub mod arena;
pub mod binary;
pub mod codegen;
pub mod error;
pub mod instruction;
pub mod memory;
pub mod module;
pub mod primitives;
pub mod value;
pub mod verify;
pub mod vm;

use b9_config::Phase;

// 日志 target
pub(crate) const TARGET_LOADER: &str = Phase::Loader.target();
pub(crate) const TARGET_VERIFY: &str = Phase::Verify.target();
pub(crate) const TARGET_VM: &str = Phase::Vm.target();
pub(crate) const TARGET_INTERP: &str = Phase::Interp.target();

// Re-export common types
pub use arena::{FunctionRecord, PackedArena};
pub use binary::{deserialize, serialize};
pub use codegen::{CodeGenerator, CompiledFunction, EntryPoint};
pub use error::{
    CompilationError, DeserializeError, InterpreterFault, MemoryError, ModuleError,
    SerializeError, VerifyError, VerifyErrorKind, VmError,
};
pub use instruction::{Instruction, OpCode, END_SECTION};
pub use memory::{ObjectHeap, ObjectMemory};
pub use module::{FunctionDef, Module};
pub use primitives::PrimitiveTable;
pub use value::{ObjectRef, Value};
pub use vm::{ExecutionContext, FunctionRef, VirtualMachine};

// Re-export config types from b9-config
pub use b9_config::{HeapConfig, LimitConfig, VmConfig};
