//! 模块的结构化视图
//!
//! `Module` 保存按加载顺序排列的函数与字符串表，并维护函数名到索引的映射。
//! 用于名称查找和反汇编；解释器实际执行的是 [`PackedArena`](crate::arena::PackedArena)。

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::error::ModuleError;
use crate::instruction::{Instruction, END_SECTION};
use crate::TARGET_LOADER;

/// 函数定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub nparams: u32,
    pub nlocals: u32,
    /// 指令流，最后一条为 `END_SECTION`
    pub instructions: Vec<Instruction>,
}

impl FunctionDef {
    /// 创建函数定义
    ///
    /// 指令流在第一个 `END_SECTION` 处截断，缺少哨兵时自动补上。
    pub fn new(
        name: impl Into<String>,
        nparams: u32,
        nlocals: u32,
        body: impl IntoIterator<Item = Instruction>,
    ) -> Self {
        let mut instructions: Vec<Instruction> = body
            .into_iter()
            .take_while(|insn| !insn.is_end_section())
            .collect();
        instructions.push(END_SECTION);
        Self {
            name: name.into(),
            nparams,
            nlocals,
            instructions,
        }
    }

    /// 指令数（含哨兵）
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// 检查哨兵：最后一条是 `END_SECTION`，之前没有
    pub fn check_end_section(&self) -> Result<(), ModuleError> {
        let Some((last, body)) = self.instructions.split_last() else {
            return Err(ModuleError::MissingEndSection {
                function: self.name.clone(),
            });
        };
        if let Some(index) = body.iter().position(Instruction::is_end_section) {
            return Err(ModuleError::EmbeddedEndSection {
                function: self.name.clone(),
                index,
            });
        }
        if !last.is_end_section() {
            return Err(ModuleError::MissingEndSection {
                function: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// 模块
#[derive(Debug, Clone, Default)]
pub struct Module {
    functions: Vec<FunctionDef>,
    strings: Vec<String>,
    /// 函数名 -> 索引
    function_index: HashMap<String, usize>,
}

impl Module {
    /// 从函数与字符串构建模块
    ///
    /// 函数名重复时后者覆盖前者的名称映射，按索引仍可访问两者。
    pub fn new(functions: Vec<FunctionDef>, strings: Vec<String>) -> Self {
        let mut function_index = HashMap::with_capacity(functions.len());
        for (index, func) in functions.iter().enumerate() {
            if let Some(previous) = function_index.insert(func.name.clone(), index) {
                warn!(
                    target: TARGET_LOADER,
                    name = %func.name,
                    previous,
                    index,
                    "duplicate function name, later definition wins"
                );
            }
        }
        Self {
            functions,
            strings,
            function_index,
        }
    }

    // ==================== 查询 ====================

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    /// 按名称查找函数索引
    pub fn function_index_by_name(&self, name: &str) -> Result<usize, ModuleError> {
        self.function_index
            .get(name)
            .copied()
            .ok_or_else(|| ModuleError::FunctionNotFound(name.to_string()))
    }

    /// 按索引获取函数
    pub fn function_by_index(&self, index: usize) -> Result<&FunctionDef, ModuleError> {
        self.functions
            .get(index)
            .ok_or(ModuleError::FunctionIndexOutOfRange {
                index,
                count: self.functions.len(),
            })
    }

    /// 按索引获取字符串
    pub fn string_at(&self, index: usize) -> Result<&str, ModuleError> {
        self.strings
            .get(index)
            .map(String::as_str)
            .ok_or(ModuleError::StringIndexOutOfRange {
                index,
                count: self.strings.len(),
            })
    }

    pub fn functions(&self) -> &[FunctionDef] {
        &self.functions
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }
}

/// 反汇编文本
///
/// ```text
/// (function "add_args" 2 0
///   0  (push_from_param 0)
///   ...
/// )
/// (string "hi")
/// ```
impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.functions {
            writeln!(
                f,
                "(function {:?} {} {}",
                func.name, func.nparams, func.nlocals
            )?;
            for (i, insn) in func.instructions.iter().enumerate() {
                writeln!(f, "  {}  {}", i, insn)?;
            }
            writeln!(f, ")")?;
        }
        for s in &self.strings {
            writeln!(f, "(string {:?})", s)?;
        }
        Ok(())
    }
}
