//! 错误类型
//!
//! 按检测时机划分：
//! - 加载期：`DeserializeError`、`ModuleError`、`VerifyError`
//! - 调用入口：`VmError::FunctionNotFound`、`VmError::BadFunctionCall`
//! - 执行期：`InterpreterFault`
//! - 可恢复：`CompilationError`（回退到解释执行）

use crate::instruction::OpCode;
use thiserror::Error;

/// 模块反序列化错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeserializeError {
    /// 输入为空
    #[error("empty input")]
    EmptyInput,

    /// 文件头魔数不匹配
    #[error("corrupt header")]
    CorruptHeader,

    /// 读取字段时数据不足
    #[error("truncated input while reading {field} at offset {offset}")]
    Truncated { field: &'static str, offset: usize },

    /// 未知 section 代码
    #[error("invalid section code {0}")]
    InvalidSectionCode(u32),

    /// 字符串不是合法的 UTF-8
    #[error("invalid utf-8 in {field} at offset {offset}")]
    InvalidUtf8 { field: &'static str, offset: usize },
}

/// 模块序列化错误
#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{field} too large: {len}")]
    TooLarge { field: &'static str, len: usize },

    /// 哨兵出现在指令流中间，解码器会在此处截断函数
    #[error("END_SECTION inside {function} at instruction {index}")]
    EmbeddedEndSection { function: String, index: usize },
}

/// 模块查询错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("function index {index} out of range (count {count})")]
    FunctionIndexOutOfRange { index: usize, count: usize },

    #[error("string index {index} out of range (count {count})")]
    StringIndexOutOfRange { index: usize, count: usize },

    /// 紧凑区访问越界或内容损坏
    #[error("module corrupt at offset {offset}: {reason}")]
    Corrupt { offset: usize, reason: &'static str },

    #[error("function {function} does not end with END_SECTION")]
    MissingEndSection { function: String },

    #[error("END_SECTION inside {function} at instruction {index}")]
    EmbeddedEndSection { function: String, index: usize },

    /// 结构化视图与紧凑区不一致
    #[error("module has {module} functions but arena has {arena}")]
    ArenaMismatch { module: usize, arena: usize },
}

/// 对象内存错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("dangling object reference #{index}.{generation}")]
    DanglingReference { index: u32, generation: u32 },

    #[error("invalid field descriptor {slot} for object #{index}")]
    InvalidDescriptor { index: u32, slot: u32 },
}

/// 解释器致命错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpreterFault {
    #[error("unknown opcode {byte:#04x} at {function}+{ip}")]
    UnknownOpcode { function: String, ip: usize, byte: u8 },

    #[error("type error in {op}: expected {expected}, found {found}")]
    TypeMismatch {
        op: OpCode,
        expected: &'static str,
        found: String,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow (limit {limit})")]
    StackOverflow { limit: usize },

    #[error("invalid stack restore to {cursor} (height {height})")]
    InvalidRestore { cursor: usize, height: usize },

    #[error("fell off end of function {function}")]
    FellOffEnd { function: String },

    #[error("{0} is not implemented")]
    NotImplemented(OpCode),

    #[error("call depth exceeded (limit {limit})")]
    CallDepthExceeded { limit: usize },

    #[error("param {index} out of range (nparams {count})")]
    ParamOutOfRange { index: usize, count: usize },

    #[error("local {index} out of range (nlocals {count})")]
    LocalOutOfRange { index: usize, count: usize },

    #[error("object has no field {0}")]
    MissingField(u32),

    #[error("unknown primitive {index} (table size {count})")]
    UnknownPrimitive { index: usize, count: usize },

    #[error("instruction pointer {ip} out of bounds in {function}")]
    InstructionOutOfBounds { function: String, ip: i64 },

    #[error("primitive output failed: {0}")]
    Output(String),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// 代码生成失败（可恢复）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to compile {function}: {reason}")]
pub struct CompilationError {
    pub function: String,
    pub reason: String,
}

impl CompilationError {
    pub fn new(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            reason: reason.into(),
        }
    }
}

/// 字节码校验失败的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyErrorKind {
    #[error("instruction stream does not end with end_section")]
    MissingEndSection,

    #[error("end_section before the end of the stream")]
    EarlyEndSection,

    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("call to unknown function {0}")]
    BadFunctionIndex(u32),

    #[error("call to unknown primitive {0}")]
    BadPrimitiveIndex(u32),

    #[error("param {0} out of range")]
    BadParamIndex(u32),

    #[error("local {0} out of range")]
    BadLocalIndex(u32),

    #[error("string {0} out of range")]
    BadStringIndex(u32),

    #[error("jump target {0} outside function")]
    BadJumpTarget(i64),
}

/// 字节码校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("verify failed in {function} at instruction {index}: {kind}")]
pub struct VerifyError {
    pub function: String,
    pub index: usize,
    pub kind: VerifyErrorKind,
}

/// 虚拟机错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("no module loaded")]
    NoModuleLoaded,

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("{function} - got {got} arguments, expected {expected}")]
    BadFunctionCall {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("no code generator installed")]
    NoCodeGenerator,

    #[error("load failed: {0}")]
    Deserialize(#[from] DeserializeError),

    #[error("load failed: {0}")]
    Load(#[from] ModuleError),

    #[error("load failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("runtime error: {0}")]
    Fault(#[from] InterpreterFault),
}
