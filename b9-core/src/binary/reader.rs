//! 模块解码器
//!
//! 单遍顺序读取字节流，同时构建结构化的 [`Module`] 与可执行的 [`PackedArena`]。

use tracing::{debug, trace, warn};

use super::{strip_nul, SectionCode, MAGIC};
use crate::arena::{ArenaBuilder, PackedArena};
use crate::error::DeserializeError;
use crate::instruction::Instruction;
use crate::module::{FunctionDef, Module};
use crate::TARGET_LOADER;

/// 解码字节流
pub fn deserialize(bytes: &[u8]) -> Result<(Module, PackedArena), DeserializeError> {
    ModuleReader::new(bytes).read()
}

/// 模块读取器（游标）
pub struct ModuleReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ModuleReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// 当前读取位置
    pub fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// 读取整个模块
    pub fn read(mut self) -> Result<(Module, PackedArena), DeserializeError> {
        if self.data.is_empty() {
            return Err(DeserializeError::EmptyInput);
        }

        let module_size = self.read_u32("module size")? as usize;
        self.read_header()?;

        let mut builder = ArenaBuilder::with_capacity(module_size.min(self.remaining()));
        let mut functions = Vec::new();
        let mut strings = Vec::new();

        while !self.at_end() {
            let code = self.read_u32("section code")?;
            match SectionCode::from_u32(code) {
                Some(SectionCode::Functions) => {
                    self.read_function_section(&mut functions, &mut builder)?
                }
                Some(SectionCode::Strings) => {
                    self.read_string_section(&mut strings, &mut builder)?
                }
                None => return Err(DeserializeError::InvalidSectionCode(code)),
            }
        }

        let payload = self.data.len() - 4;
        if module_size != payload {
            warn!(
                target: TARGET_LOADER,
                declared = module_size,
                actual = payload,
                "module size field does not match payload"
            );
        }

        let module = Module::new(functions, strings);
        let arena = builder.finish();
        debug!(
            target: TARGET_LOADER,
            functions = module.function_count(),
            strings = module.string_count(),
            bytes = arena.byte_len(),
            "module decoded"
        );
        Ok((module, arena))
    }

    // ==================== Section ====================

    fn read_header(&mut self) -> Result<(), DeserializeError> {
        let magic = self
            .take(MAGIC.len(), "header")
            .map_err(|_| DeserializeError::CorruptHeader)?;
        if magic != &MAGIC[..] {
            return Err(DeserializeError::CorruptHeader);
        }
        Ok(())
    }

    fn read_function_section(
        &mut self,
        functions: &mut Vec<FunctionDef>,
        builder: &mut ArenaBuilder,
    ) -> Result<(), DeserializeError> {
        let count = self.read_u32("function count")? as usize;
        // 计数不可信，按剩余字节估算上限
        functions.reserve(count.min(self.remaining() / 16));

        for _ in 0..count {
            let name = self.read_string("function name")?;
            let nparams = self.read_u32("nparams")?;
            let nlocals = self.read_u32("nlocals")?;

            let mut instructions = Vec::new();
            loop {
                let insn = Instruction::from_raw(self.read_u32("instruction")?);
                instructions.push(insn);
                if insn.is_end_section() {
                    break;
                }
            }

            trace!(
                target: TARGET_LOADER,
                name = %name,
                nparams,
                nlocals,
                instructions = instructions.len(),
                "function record"
            );
            builder.push_function(&name, nparams, nlocals, &instructions);
            functions.push(FunctionDef {
                name,
                nparams,
                nlocals,
                instructions,
            });
        }
        Ok(())
    }

    fn read_string_section(
        &mut self,
        strings: &mut Vec<String>,
        builder: &mut ArenaBuilder,
    ) -> Result<(), DeserializeError> {
        let count = self.read_u32("string count")? as usize;
        strings.reserve(count.min(self.remaining() / 4));

        for _ in 0..count {
            let s = self.read_string("string")?;
            builder.push_string(&s);
            strings.push(s);
        }
        Ok(())
    }

    // ==================== 基本读取 ====================

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DeserializeError> {
        if len > self.remaining() {
            return Err(DeserializeError::Truncated {
                field,
                offset: self.pos,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, DeserializeError> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// 长度前缀字符串，去掉一个结尾 NUL
    fn read_string(&mut self, field: &'static str) -> Result<String, DeserializeError> {
        let len = self.read_u32(field)? as usize;
        let offset = self.pos;
        let bytes = strip_nul(self.take(len, field)?);
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DeserializeError::InvalidUtf8 { field, offset })
    }
}
