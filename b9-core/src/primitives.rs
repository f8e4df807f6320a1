//! 宿主原语表
//!
//! `PRIMITIVE_CALL n` 调用表中第 n 个原语。原语自行负责栈约定：
//! 解释器不会替它弹出参数或压入返回值。

use crate::error::InterpreterFault;
use crate::instruction::OpCode;
use crate::value::Value;
use crate::vm::ExecutionContext;

/// 原语函数
pub type PrimitiveFn = fn(&mut ExecutionContext<'_>) -> Result<(), InterpreterFault>;

/// 原语表（由虚拟机持有，固定大小）
#[derive(Clone)]
pub struct PrimitiveTable {
    entries: Vec<(&'static str, PrimitiveFn)>,
}

impl PrimitiveTable {
    /// 空表
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// 标准表：0 = print_string, 1 = print_number, 2 = print_stack
    pub fn standard() -> Self {
        Self {
            entries: vec![
                ("print_string", print_string as PrimitiveFn),
                ("print_number", print_number),
                ("print_stack", print_stack),
            ],
        }
    }

    /// 追加原语，返回其索引
    pub fn register(&mut self, name: &'static str, f: PrimitiveFn) -> usize {
        self.entries.push((name, f));
        self.entries.len() - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<PrimitiveFn> {
        self.entries.get(index).map(|(_, f)| *f)
    }

    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.entries.get(index).map(|(name, _)| *name)
    }
}

impl Default for PrimitiveTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for PrimitiveTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}

fn output_fault(e: std::io::Error) -> InterpreterFault {
    InterpreterFault::Output(e.to_string())
}

// ==================== 标准原语 ====================

/// 弹出字符串，输出一行，压入 0
pub fn print_string(ctx: &mut ExecutionContext<'_>) -> Result<(), InterpreterFault> {
    let value = ctx.pop()?;
    let index = value.as_uint().ok_or_else(|| InterpreterFault::TypeMismatch {
        op: OpCode::PrimitiveCall,
        expected: "uint48",
        found: value.type_name().to_string(),
    })?;
    let arena = ctx.arena();
    let s = arena.string_view(index as usize)?;
    writeln!(ctx.output(), "{}", s).map_err(output_fault)?;
    ctx.push(Value::ZERO)
}

/// 弹出整数，输出一行，压入 0
pub fn print_number(ctx: &mut ExecutionContext<'_>) -> Result<(), InterpreterFault> {
    let value = ctx.pop()?;
    let n = value.as_int().ok_or_else(|| InterpreterFault::TypeMismatch {
        op: OpCode::PrimitiveCall,
        expected: "int48",
        found: value.type_name().to_string(),
    })?;
    writeln!(ctx.output(), "{}", n).map_err(output_fault)?;
    ctx.push(Value::ZERO)
}

/// 从栈底到栈顶逐行输出整个栈，压入 0
pub fn print_stack(ctx: &mut ExecutionContext<'_>) -> Result<(), InterpreterFault> {
    let lines: Vec<String> = ctx
        .stack()
        .as_slice()
        .iter()
        .enumerate()
        .map(|(i, v)| format!("{:>4}: {}", i, v))
        .collect();
    let out = ctx.output();
    for line in &lines {
        writeln!(out, "{}", line).map_err(output_fault)?;
    }
    ctx.push(Value::ZERO)
}
