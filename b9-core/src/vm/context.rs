//! 执行上下文
//!
//! 一次 `run` 的全部可变状态：操作数栈、调用深度，以及对虚拟机持有的
//! 模块、入口点表、原语表、对象内存和输出的借用。原语与已编译函数都通过它
//! 操作栈和发起嵌套调用。

use std::io::Write;

use b9_config::LimitConfig;
use tracing::trace;

use super::stack::OperandStack;
use crate::arena::PackedArena;
use crate::codegen::EntryPoint;
use crate::error::InterpreterFault;
use crate::memory::ObjectMemory;
use crate::module::Module;
use crate::primitives::PrimitiveTable;
use crate::value::Value;
use crate::TARGET_INTERP;

/// 执行上下文
pub struct ExecutionContext<'vm> {
    pub(crate) module: &'vm Module,
    pub(crate) arena: &'vm PackedArena,
    pub(crate) entry_points: &'vm [Option<EntryPoint>],
    pub(crate) primitives: &'vm PrimitiveTable,
    pub(crate) memory: &'vm mut dyn ObjectMemory,
    pub(crate) output: &'vm mut dyn Write,
    pub(crate) stack: OperandStack,
    pub(crate) max_depth: usize,
    pub(crate) depth: usize,
    pub(crate) debug: bool,
}

impl<'vm> ExecutionContext<'vm> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        module: &'vm Module,
        arena: &'vm PackedArena,
        entry_points: &'vm [Option<EntryPoint>],
        primitives: &'vm PrimitiveTable,
        memory: &'vm mut dyn ObjectMemory,
        output: &'vm mut dyn Write,
        limits: &LimitConfig,
        debug: bool,
    ) -> Self {
        Self {
            module,
            arena,
            entry_points,
            primitives,
            memory,
            output,
            stack: OperandStack::new(limits.max_stack_size),
            max_depth: limits.max_recursion_depth,
            depth: 0,
            debug,
        }
    }

    // ==================== 栈 ====================

    #[inline]
    pub fn push(&mut self, value: Value) -> Result<(), InterpreterFault> {
        self.stack.push(value)
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Value, InterpreterFault> {
        self.stack.pop()
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut OperandStack {
        &mut self.stack
    }

    // ==================== 借用的虚拟机状态 ====================

    pub fn module(&self) -> &'vm Module {
        self.module
    }

    pub fn arena(&self) -> &'vm PackedArena {
        self.arena
    }

    pub fn string_at(&self, index: usize) -> Result<&'vm str, InterpreterFault> {
        let arena = self.arena;
        Ok(arena.string_view(index)?)
    }

    pub fn memory(&mut self) -> &mut dyn ObjectMemory {
        &mut *self.memory
    }

    pub fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    /// 当前调用深度
    pub fn depth(&self) -> usize {
        self.depth
    }

    // ==================== 调用 ====================

    /// 调用函数 `index`，参数已由调用方压栈
    ///
    /// 返回时栈恢复到参数之下，返回值不入栈。
    pub fn call_function(&mut self, index: usize) -> Result<Value, InterpreterFault> {
        if self.depth >= self.max_depth {
            return Err(InterpreterFault::CallDepthExceeded {
                limit: self.max_depth,
            });
        }

        self.depth += 1;
        let entry = self.entry_points.get(index).and_then(Option::clone);
        let result = match entry {
            Some(entry) => self.call_compiled(index, entry),
            None => self.interpret(index),
        };
        self.depth -= 1;
        result
    }

    /// 压入参数并调用（供已编译函数使用）
    ///
    /// `args[i]` 即被调函数的 `params[i]`。
    pub fn invoke(&mut self, index: usize, args: &[Value]) -> Result<Value, InterpreterFault> {
        for arg in args {
            self.stack.push(*arg)?;
        }
        self.call_function(index)
    }

    fn call_compiled(&mut self, index: usize, entry: EntryPoint) -> Result<Value, InterpreterFault> {
        let arena = self.arena;
        let record = arena.function_record(index)?;
        let base = self
            .stack
            .len()
            .checked_sub(record.nparams as usize)
            .ok_or(InterpreterFault::StackUnderflow)?;
        let params = self.stack.as_slice()[base..].to_vec();

        trace!(target: TARGET_INTERP, function = record.name, "compiled call");
        let result = entry.invoke(self, &params)?;

        let cursor = self.stack.cursor_at(base)?;
        self.stack.restore(cursor)?;
        Ok(result)
    }

    /// 调用原语 `index`
    pub(crate) fn call_primitive(&mut self, index: usize) -> Result<(), InterpreterFault> {
        let primitive = self
            .primitives
            .get(index)
            .ok_or(InterpreterFault::UnknownPrimitive {
                index,
                count: self.primitives.len(),
            })?;
        primitive(self)
    }
}
