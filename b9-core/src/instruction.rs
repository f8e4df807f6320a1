//! 指令编码
//!
//! 每条指令是一个 32 位字：高 8 位为操作码，低 24 位为立即数。
//!
//! ```text
//! 31        24 23                              0
//! ┌──────────┬─────────────────────────────────┐
//! │  opcode  │            immediate            │
//! └──────────┴─────────────────────────────────┘
//! ```
//!
//! 跳转与 `INT_PUSH_CONSTANT` 的立即数按有符号解释，其余均为无符号索引。

use std::fmt;

/// 原始指令字
pub type RawInstruction = u32;

/// 操作码位移
pub const OPCODE_SHIFT: u32 = 24;
/// 立即数掩码
pub const IMMEDIATE_MASK: RawInstruction = 0x00FF_FFFF;
/// 有符号立即数的取值范围
pub const IMMEDIATE_MIN: i32 = -(1 << 23);
pub const IMMEDIATE_MAX: i32 = (1 << 23) - 1;

/// 操作码
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    // ===== 结构 =====
    EndSection = 0x00,

    // ===== 调用 =====
    FunctionCall = 0x01,
    FunctionReturn = 0x02,
    PrimitiveCall = 0x03,

    // ===== 控制流 =====
    Jmp = 0x04,

    // ===== 栈操作 =====
    Duplicate = 0x05,
    Drop = 0x06,
    PushFromLocal = 0x07,
    PopIntoLocal = 0x08,
    PushFromParam = 0x09,
    PopIntoParam = 0x0a,

    // ===== 整数 =====
    IntPushConstant = 0x0b,
    IntSub = 0x0c,
    IntAdd = 0x0d,
    IntMul = 0x0e,
    IntDiv = 0x0f,
    IntNot = 0x10,

    // ===== 条件跳转 =====
    JmpEq = 0x11,
    JmpNeq = 0x12,
    JmpGt = 0x13,
    JmpGe = 0x14,
    JmpLt = 0x15,
    JmpLe = 0x16,

    // ===== 字符串 =====
    StrPushConstant = 0x17,

    // ===== 对象 =====
    NewObject = 0x20,
    PushFromObject = 0x21,
    PopIntoObject = 0x22,
    CallIndirect = 0x23,
    SystemCollect = 0x24,
}

impl OpCode {
    /// 从字节解码操作码，未知字节返回 None
    pub fn from_u8(byte: u8) -> Option<Self> {
        use OpCode::*;
        let op = match byte {
            0x00 => EndSection,
            0x01 => FunctionCall,
            0x02 => FunctionReturn,
            0x03 => PrimitiveCall,
            0x04 => Jmp,
            0x05 => Duplicate,
            0x06 => Drop,
            0x07 => PushFromLocal,
            0x08 => PopIntoLocal,
            0x09 => PushFromParam,
            0x0a => PopIntoParam,
            0x0b => IntPushConstant,
            0x0c => IntSub,
            0x0d => IntAdd,
            0x0e => IntMul,
            0x0f => IntDiv,
            0x10 => IntNot,
            0x11 => JmpEq,
            0x12 => JmpNeq,
            0x13 => JmpGt,
            0x14 => JmpGe,
            0x15 => JmpLt,
            0x16 => JmpLe,
            0x17 => StrPushConstant,
            0x20 => NewObject,
            0x21 => PushFromObject,
            0x22 => PopIntoObject,
            0x23 => CallIndirect,
            0x24 => SystemCollect,
            _ => return None,
        };
        Some(op)
    }

    /// 操作码名称（反汇编用）
    pub fn name(&self) -> &'static str {
        use OpCode::*;
        match self {
            EndSection => "end_section",
            FunctionCall => "function_call",
            FunctionReturn => "function_return",
            PrimitiveCall => "primitive_call",
            Jmp => "jmp",
            Duplicate => "duplicate",
            Drop => "drop",
            PushFromLocal => "push_from_local",
            PopIntoLocal => "pop_into_local",
            PushFromParam => "push_from_param",
            PopIntoParam => "pop_into_param",
            IntPushConstant => "int_push_constant",
            IntSub => "int_sub",
            IntAdd => "int_add",
            IntMul => "int_mul",
            IntDiv => "int_div",
            IntNot => "int_not",
            JmpEq => "jmp_eq",
            JmpNeq => "jmp_neq",
            JmpGt => "jmp_gt",
            JmpGe => "jmp_ge",
            JmpLt => "jmp_lt",
            JmpLe => "jmp_le",
            StrPushConstant => "str_push_constant",
            NewObject => "new_object",
            PushFromObject => "push_from_object",
            PopIntoObject => "pop_into_object",
            CallIndirect => "call_indirect",
            SystemCollect => "system_collect",
        }
    }

    /// 是否携带立即数
    pub fn has_immediate(&self) -> bool {
        use OpCode::*;
        matches!(
            self,
            FunctionCall
                | PrimitiveCall
                | Jmp
                | PushFromLocal
                | PopIntoLocal
                | PushFromParam
                | PopIntoParam
                | IntPushConstant
                | JmpEq
                | JmpNeq
                | JmpGt
                | JmpGe
                | JmpLt
                | JmpLe
                | StrPushConstant
                | PushFromObject
                | PopIntoObject
        )
    }

    /// 立即数是否按有符号解释
    pub fn has_signed_immediate(&self) -> bool {
        use OpCode::*;
        matches!(
            self,
            Jmp | JmpEq | JmpNeq | JmpGt | JmpGe | JmpLt | JmpLe | IntPushConstant
        )
    }

    /// 是否为跳转指令
    pub fn is_jump(&self) -> bool {
        use OpCode::*;
        matches!(self, Jmp | JmpEq | JmpNeq | JmpGt | JmpGe | JmpLt | JmpLe)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 一条已打包的指令
///
/// 相等比较是逐位比较。
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(RawInstruction);

/// 指令流终止哨兵
pub const END_SECTION: Instruction = Instruction(0);

impl Instruction {
    /// 编码指令，立即数截断到低 24 位
    #[inline]
    pub const fn new(op: OpCode, immediate: i32) -> Self {
        Self(((op as RawInstruction) << OPCODE_SHIFT) | (immediate as RawInstruction & IMMEDIATE_MASK))
    }

    /// 不带立即数的指令
    #[inline]
    pub const fn op(op: OpCode) -> Self {
        Self::new(op, 0)
    }

    /// 编码指令，立即数越界时返回 None
    pub fn checked_new(op: OpCode, immediate: i64) -> Option<Self> {
        let fits = if op.has_signed_immediate() {
            (IMMEDIATE_MIN as i64..=IMMEDIATE_MAX as i64).contains(&immediate)
        } else {
            (0..=IMMEDIATE_MASK as i64).contains(&immediate)
        };
        fits.then(|| Self::new(op, immediate as i32))
    }

    /// 从原始字构造
    #[inline]
    pub const fn from_raw(raw: RawInstruction) -> Self {
        Self(raw)
    }

    /// 原始字
    #[inline]
    pub const fn raw(&self) -> RawInstruction {
        self.0
    }

    /// 操作码字节
    #[inline]
    pub const fn opcode_byte(&self) -> u8 {
        (self.0 >> OPCODE_SHIFT) as u8
    }

    /// 解码操作码，未知操作码返回 None
    #[inline]
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.opcode_byte())
    }

    /// 零扩展的立即数（用作索引）
    #[inline]
    pub const fn index(&self) -> u32 {
        self.0 & IMMEDIATE_MASK
    }

    /// 符号扩展的立即数（用作偏移或常量）
    #[inline]
    pub const fn signed_immediate(&self) -> i32 {
        ((self.0 << 8) as i32) >> 8
    }

    /// 解码为 (操作码, 立即数)，立即数按操作码的约定解释
    pub fn decode(&self) -> Option<(OpCode, i64)> {
        let op = self.opcode()?;
        let imm = if op.has_signed_immediate() {
            self.signed_immediate() as i64
        } else {
            self.index() as i64
        };
        Some((op, imm))
    }

    #[inline]
    pub fn is_end_section(&self) -> bool {
        *self == END_SECTION
    }
}

impl From<RawInstruction> for Instruction {
    fn from(raw: RawInstruction) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instruction({:#010x} {})", self.0, self)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Some((op, imm)) if op.has_immediate() => write!(f, "({} {})", op, imm),
            Some((op, _)) => write!(f, "({})", op),
            None => write!(f, "(unknown {:#04x})", self.opcode_byte()),
        }
    }
}
