//! 栈值
//!
//! 操作数栈上的每个元素都带有类型标签：48 位有符号整数、48 位无符号整数
//! （配合字符串指令时作为字符串表索引）、对象引用、或不透明的 64 位原始值。

use std::fmt;

/// 48 位整数的位宽
const INT48_BITS: u32 = 48;
/// 48 位无符号整数掩码
const UINT48_MASK: u64 = (1 << INT48_BITS) - 1;

/// 对象引用（由对象内存能力分配和解释的句柄）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// 槽位索引
    pub index: u32,
    /// 槽位代数，用于识别悬空引用
    pub generation: u32,
}

impl ObjectRef {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// 栈值
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    /// 48 位有符号整数
    Int48(i64),
    /// 48 位无符号整数
    Uint48(u64),
    /// 对象引用
    Ref(ObjectRef),
    /// 原始 64 位值
    Raw64(u64),
}

impl Default for Value {
    fn default() -> Self {
        Value::Int48(0)
    }
}

impl Value {
    /// 整数 0，局部变量槽位的初始值
    pub const ZERO: Value = Value::Int48(0);

    /// 创建整数（截断到 48 位并符号扩展）
    #[inline]
    pub fn int(n: i64) -> Self {
        Value::Int48(wrap_int48(n))
    }

    /// 创建无符号整数（截断到 48 位）
    #[inline]
    pub fn uint(n: u64) -> Self {
        Value::Uint48(n & UINT48_MASK)
    }

    /// 创建字符串表索引
    #[inline]
    pub fn string(index: u32) -> Self {
        Value::Uint48(index as u64)
    }

    /// 创建对象引用
    #[inline]
    pub fn object(r: ObjectRef) -> Self {
        Value::Ref(r)
    }

    // ==================== 类型判断 ====================

    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int48(_))
    }

    #[inline]
    pub fn is_uint(&self) -> bool {
        matches!(self, Value::Uint48(_))
    }

    #[inline]
    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    // ==================== 取值 ====================

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int48(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint48(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// 类型名称（用于错误信息）
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int48(_) => "int48",
            Value::Uint48(_) => "uint48",
            Value::Ref(_) => "ref",
            Value::Raw64(_) => "raw64",
        }
    }
}

/// 截断到 48 位并符号扩展
#[inline]
pub(crate) fn wrap_int48(n: i64) -> i64 {
    (n << (64 - INT48_BITS)) >> (64 - INT48_BITS)
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::int(n)
    }
}

impl From<ObjectRef> for Value {
    fn from(r: ObjectRef) -> Self {
        Value::Ref(r)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int48(n) => write!(f, "{}", n),
            Value::Uint48(n) => write!(f, "uint48({})", n),
            Value::Ref(r) => write!(f, "ref({})", r),
            Value::Raw64(bits) => write!(f, "raw({:#018x})", bits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_wraps_to_48_bits() {
        assert_eq!(Value::int(1 << 47), Value::Int48(-(1 << 47)));
        assert_eq!(Value::int(-1), Value::Int48(-1));
        assert_eq!(Value::int((1 << 47) - 1).as_int(), Some((1 << 47) - 1));
    }

    #[test]
    fn test_uint_masks_to_48_bits() {
        assert_eq!(Value::uint(u64::MAX), Value::Uint48(UINT48_MASK));
    }

    #[test]
    fn test_accessors_respect_tags() {
        let s = Value::string(3);
        assert!(s.is_uint());
        assert_eq!(s.as_int(), None);
        assert_eq!(s.as_uint(), Some(3));

        let r = Value::object(ObjectRef::new(1, 0));
        assert!(r.is_ref());
        assert_eq!(r.as_object(), Some(ObjectRef::new(1, 0)));
    }

    #[test]
    fn test_default_is_zero_int() {
        assert_eq!(Value::default(), Value::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::int(-5).to_string(), "-5");
        assert_eq!(Value::string(2).to_string(), "uint48(2)");
        assert_eq!(Value::object(ObjectRef::new(4, 1)).to_string(), "ref(#4.1)");
    }
}
