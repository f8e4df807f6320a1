//! 代码生成能力
//!
//! 代码生成器把一个函数编译为可直接调用的入口点。入口点与解释执行
//! 必须对所有输入给出相同结果；生成失败时虚拟机记录警告并回退到解释执行。

use std::sync::Arc;

use crate::error::{CompilationError, InterpreterFault};
use crate::module::Module;
use crate::value::Value;
use crate::vm::ExecutionContext;

/// 已编译函数
pub trait CompiledFunction: Send + Sync {
    /// 以声明顺序的参数副本调用；嵌套调用经由 `ctx` 进行
    fn invoke(
        &self,
        ctx: &mut ExecutionContext<'_>,
        params: &[Value],
    ) -> Result<Value, InterpreterFault>;
}

/// 入口点
pub type EntryPoint = Arc<dyn CompiledFunction>;

/// 代码生成器
pub trait CodeGenerator: Send {
    fn generate(&mut self, module: &Module, index: usize) -> Result<EntryPoint, CompilationError>;
}
