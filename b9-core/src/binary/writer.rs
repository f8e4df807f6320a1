//! 模块编码器

use std::io::Write;

use tracing::debug;

use super::{strip_nul, SectionCode, MAGIC};
use crate::error::SerializeError;
use crate::instruction::END_SECTION;
use crate::module::Module;
use crate::TARGET_LOADER;

/// 编码为字节数组
pub fn serialize(module: &Module) -> Result<Vec<u8>, SerializeError> {
    let mut writer = ModuleWriter::new();
    writer.write_module(module)?;
    writer.finish()
}

/// 编码并写入输出流
pub fn write_module<W: Write>(module: &Module, out: &mut W) -> Result<(), SerializeError> {
    let bytes = serialize(module)?;
    out.write_all(&bytes)?;
    Ok(())
}

/// 模块写入器
pub struct ModuleWriter {
    buffer: Vec<u8>,
}

impl Default for ModuleWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleWriter {
    pub fn new() -> Self {
        let mut buffer = Vec::with_capacity(256);
        // 预留 moduleSize，finish 时回填
        buffer.extend_from_slice(&[0; 4]);
        buffer.extend_from_slice(&MAGIC);
        Self { buffer }
    }

    /// 写入函数段与字符串段，空段省略
    pub fn write_module(&mut self, module: &Module) -> Result<(), SerializeError> {
        if module.function_count() > 0 {
            self.put_u32(SectionCode::Functions as u32);
            self.put_len(module.function_count(), "function count")?;
            for func in module.functions() {
                self.put_bytes(func.name.as_bytes(), "function name")?;
                self.put_u32(func.nparams);
                self.put_u32(func.nlocals);
                // 末尾的哨兵可省略（写入时补上），中间的不行
                let body = match func.instructions.split_last() {
                    Some((last, body)) if last.is_end_section() => body,
                    _ => &func.instructions[..],
                };
                if let Some(index) = body.iter().position(|insn| insn.is_end_section()) {
                    return Err(SerializeError::EmbeddedEndSection {
                        function: func.name.clone(),
                        index,
                    });
                }
                for insn in body {
                    self.put_u32(insn.raw());
                }
                self.put_u32(END_SECTION.raw());
            }
        }

        if module.string_count() > 0 {
            self.put_u32(SectionCode::Strings as u32);
            self.put_len(module.string_count(), "string count")?;
            for s in module.strings() {
                self.put_bytes(s.as_bytes(), "string")?;
            }
        }
        Ok(())
    }

    /// 回填 moduleSize 并返回字节
    pub fn finish(mut self) -> Result<Vec<u8>, SerializeError> {
        let payload = self.buffer.len() - 4;
        let size = u32::try_from(payload).map_err(|_| SerializeError::TooLarge {
            field: "module",
            len: payload,
        })?;
        self.buffer[..4].copy_from_slice(&size.to_le_bytes());
        debug!(target: TARGET_LOADER, bytes = self.buffer.len(), "module encoded");
        Ok(self.buffer)
    }

    // ==================== 基本写入 ====================

    fn put_u32(&mut self, v: u32) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    fn put_len(&mut self, len: usize, field: &'static str) -> Result<(), SerializeError> {
        let v = u32::try_from(len).map_err(|_| SerializeError::TooLarge { field, len })?;
        self.put_u32(v);
        Ok(())
    }

    /// 长度前缀字节串，去掉一个结尾 NUL
    fn put_bytes(&mut self, bytes: &[u8], field: &'static str) -> Result<(), SerializeError> {
        let bytes = strip_nul(bytes);
        self.put_len(bytes.len(), field)?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }
}
