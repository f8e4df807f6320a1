//! B9 模块二进制格式
//!
//! 所有定长字段均为小端序。
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ moduleSize: u32   (其后字节数，仅作提示)      │
//! ├──────────────────────────────────────────────┤
//! │ magic: "b9module" (8 bytes)                  │
//! ├──────────────────────────────────────────────┤
//! │ section*  直到输入结束                        │
//! │   code: u32   1 = 函数, 2 = 字符串            │
//! │   count: u32                                 │
//! │   records ...                                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! 函数记录：`nameLen, name, nparams, nlocals, words...`，指令字读到
//! `END_SECTION`（含）为止。字符串记录：`len, bytes`。
//!
//! # 示例
//!
//! ```rust,ignore
//! use b9_core::binary::{deserialize, serialize};
//!
//! let bytes = serialize(&module)?;
//! let (module, arena) = deserialize(&bytes)?;
//! ```

mod reader;
mod writer;

pub use reader::{deserialize, ModuleReader};
pub use writer::{serialize, write_module, ModuleWriter};

/// 文件魔数
pub const MAGIC: [u8; 8] = *b"b9module";

/// Section 代码
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionCode {
    Functions = 1,
    Strings = 2,
}

impl SectionCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(SectionCode::Functions),
            2 => Some(SectionCode::Strings),
            _ => None,
        }
    }
}

/// 去掉一个结尾的 NUL（编码与解码两端一致）
#[inline]
pub(crate) fn strip_nul(bytes: &[u8]) -> &[u8] {
    match bytes.split_last() {
        Some((&0, rest)) => rest,
        _ => bytes,
    }
}
