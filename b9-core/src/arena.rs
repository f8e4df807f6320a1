//! 紧凑区（Packed Arena）
//!
//! 一块连续可增长的字节缓冲区，按与线格式相邻的布局保存函数与字符串，
//! 通过偏移表寻址。只在解码（或 [`PackedArena::from_module`]）时顺序写入一次，
//! 之后只读。所有访问都做边界检查，越界返回 [`ModuleError::Corrupt`]。
//!
//! 函数记录布局（小端）：
//!
//! ```text
//! ┌─────────┬────────────┬─────────┬─────────┬──────────────────────┐
//! │ nameLen │ name bytes │ nparams │ nlocals │ words ... END_SECTION│
//! │  u32    │  nameLen   │  u32    │  u32    │  u32 × code_len      │
//! └─────────┴────────────┴─────────┴─────────┴──────────────────────┘
//! ```
//!
//! 字符串记录为 `len: u32` 加 `len` 字节。

use crate::error::ModuleError;
use crate::instruction::Instruction;
use crate::module::Module;

const WORD: usize = 4;

/// 函数记录的借用视图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionRecord<'a> {
    pub index: usize,
    pub name: &'a str,
    pub nparams: u32,
    pub nlocals: u32,
    /// 指令流起始字节偏移
    pub code_start: usize,
    /// 指令数（含哨兵）
    pub code_len: usize,
}

/// 紧凑区
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedArena {
    buffer: Vec<u8>,
    /// 函数记录的字节偏移，单调递增
    function_offsets: Vec<usize>,
    /// 与 function_offsets 平行：每个函数的指令数
    code_lengths: Vec<usize>,
    /// 字符串记录的字节偏移
    string_offsets: Vec<usize>,
}

impl PackedArena {
    /// 从结构化视图构建紧凑区
    pub fn from_module(module: &Module) -> Self {
        let mut builder = ArenaBuilder::default();
        for func in module.functions() {
            builder.push_function(&func.name, func.nparams, func.nlocals, &func.instructions);
        }
        for s in module.strings() {
            builder.push_string(s);
        }
        builder.finish()
    }

    pub fn function_count(&self) -> usize {
        self.function_offsets.len()
    }

    pub fn string_count(&self) -> usize {
        self.string_offsets.len()
    }

    /// 缓冲区字节数
    pub fn byte_len(&self) -> usize {
        self.buffer.len()
    }

    /// 读取函数记录
    pub fn function_record(&self, index: usize) -> Result<FunctionRecord<'_>, ModuleError> {
        let offset = *self
            .function_offsets
            .get(index)
            .ok_or(ModuleError::FunctionIndexOutOfRange {
                index,
                count: self.function_offsets.len(),
            })?;
        let code_len = self.code_lengths.get(index).copied().ok_or(ModuleError::Corrupt {
            offset,
            reason: "missing code length",
        })?;

        let name_len = self.read_u32(offset)? as usize;
        let name_start = offset + WORD;
        let name = self.read_str(name_start, name_len)?;
        let nparams = self.read_u32(name_start + name_len)?;
        let nlocals = self.read_u32(name_start + name_len + WORD)?;
        let code_start = name_start + name_len + 2 * WORD;

        if code_start + code_len * WORD > self.buffer.len() {
            return Err(ModuleError::Corrupt {
                offset: code_start,
                reason: "instruction stream past end of arena",
            });
        }

        Ok(FunctionRecord {
            index,
            name,
            nparams,
            nlocals,
            code_start,
            code_len,
        })
    }

    /// 读取函数记录中的第 `ip` 条指令
    #[inline]
    pub fn instruction(
        &self,
        record: &FunctionRecord<'_>,
        ip: usize,
    ) -> Result<Instruction, ModuleError> {
        if ip >= record.code_len {
            return Err(ModuleError::Corrupt {
                offset: record.code_start + ip * WORD,
                reason: "instruction index out of range",
            });
        }
        self.read_u32(record.code_start + ip * WORD)
            .map(Instruction::from_raw)
    }

    /// 字符串视图
    pub fn string_view(&self, index: usize) -> Result<&str, ModuleError> {
        let offset = *self
            .string_offsets
            .get(index)
            .ok_or(ModuleError::StringIndexOutOfRange {
                index,
                count: self.string_offsets.len(),
            })?;
        let len = self.read_u32(offset)? as usize;
        self.read_str(offset + WORD, len)
    }

    // ==================== 内部读取 ====================

    fn read_u32(&self, offset: usize) -> Result<u32, ModuleError> {
        let bytes = self
            .buffer
            .get(offset..offset + WORD)
            .ok_or(ModuleError::Corrupt {
                offset,
                reason: "read past end of arena",
            })?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_str(&self, offset: usize, len: usize) -> Result<&str, ModuleError> {
        let bytes = self
            .buffer
            .get(offset..offset + len)
            .ok_or(ModuleError::Corrupt {
                offset,
                reason: "string past end of arena",
            })?;
        std::str::from_utf8(bytes).map_err(|_| ModuleError::Corrupt {
            offset,
            reason: "invalid utf-8",
        })
    }
}

/// 紧凑区构建器
///
/// 只追加：每次 push 把一条记录写到缓冲区末尾并登记偏移。
#[derive(Debug, Default)]
pub struct ArenaBuilder {
    arena: PackedArena,
}

impl ArenaBuilder {
    /// 按预估字节数预留容量
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            arena: PackedArena {
                buffer: Vec::with_capacity(bytes),
                ..PackedArena::default()
            },
        }
    }

    /// 追加一条函数记录，返回其索引
    pub fn push_function(
        &mut self,
        name: &str,
        nparams: u32,
        nlocals: u32,
        instructions: &[Instruction],
    ) -> usize {
        let arena = &mut self.arena;
        let index = arena.function_offsets.len();
        arena.function_offsets.push(arena.buffer.len());
        arena.code_lengths.push(instructions.len());

        put_u32(&mut arena.buffer, name.len() as u32);
        arena.buffer.extend_from_slice(name.as_bytes());
        put_u32(&mut arena.buffer, nparams);
        put_u32(&mut arena.buffer, nlocals);
        arena.buffer.reserve(instructions.len() * WORD);
        for insn in instructions {
            put_u32(&mut arena.buffer, insn.raw());
        }
        index
    }

    /// 追加一条字符串记录，返回其索引
    pub fn push_string(&mut self, s: &str) -> usize {
        let arena = &mut self.arena;
        let index = arena.string_offsets.len();
        arena.string_offsets.push(arena.buffer.len());
        put_u32(&mut arena.buffer, s.len() as u32);
        arena.buffer.extend_from_slice(s.as_bytes());
        index
    }

    pub fn finish(self) -> PackedArena {
        self.arena
    }
}

#[inline]
fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
