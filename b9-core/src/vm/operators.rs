//! 运算符实现 (整数运算与条件跳转的比较)

use std::cmp::Ordering;

use crate::arena::PackedArena;
use crate::error::InterpreterFault;
use crate::instruction::OpCode;
use crate::value::Value;

fn expect_int(op: OpCode, v: Value) -> Result<i64, InterpreterFault> {
    v.as_int().ok_or_else(|| InterpreterFault::TypeMismatch {
        op,
        expected: "int48",
        found: v.type_name().to_string(),
    })
}

/// 整数二元运算（结果截断到 48 位）
pub fn int_binary(op: OpCode, left: Value, right: Value) -> Result<Value, InterpreterFault> {
    let a = expect_int(op, left)?;
    let b = expect_int(op, right)?;
    let n = match op {
        OpCode::IntAdd => a.wrapping_add(b),
        OpCode::IntSub => a.wrapping_sub(b),
        OpCode::IntMul => a.wrapping_mul(b),
        OpCode::IntDiv => {
            if b == 0 {
                return Err(InterpreterFault::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        _ => {
            return Err(InterpreterFault::TypeMismatch {
                op,
                expected: "integer operator",
                found: op.name().to_string(),
            })
        }
    };
    Ok(Value::int(n))
}

/// 逻辑非：0 -> 1，其余 -> 0
pub fn int_not(value: Value) -> Result<Value, InterpreterFault> {
    let n = expect_int(OpCode::IntNot, value)?;
    Ok(Value::int((n == 0) as i64))
}

/// 比较两个同类值
///
/// 整数按有符号数值比较；字符串索引解析为字符串表中的内容后按字节字典序比较。
pub fn compare(
    op: OpCode,
    left: Value,
    right: Value,
    arena: &PackedArena,
) -> Result<Ordering, InterpreterFault> {
    match (left, right) {
        (Value::Int48(a), Value::Int48(b)) => Ok(a.cmp(&b)),
        (Value::Uint48(a), Value::Uint48(b)) => {
            let a = arena.string_view(a as usize)?;
            let b = arena.string_view(b as usize)?;
            Ok(a.as_bytes().cmp(b.as_bytes()))
        }
        (Value::Int48(_), other) | (Value::Uint48(_), other) => {
            Err(InterpreterFault::TypeMismatch {
                op,
                expected: left.type_name(),
                found: other.type_name().to_string(),
            })
        }
        (other, _) => Err(InterpreterFault::TypeMismatch {
            op,
            expected: "int48 or uint48",
            found: other.type_name().to_string(),
        }),
    }
}

/// 条件跳转是否成立
pub fn jump_taken(
    op: OpCode,
    left: Value,
    right: Value,
    arena: &PackedArena,
) -> Result<bool, InterpreterFault> {
    let ord = compare(op, left, right, arena)?;
    let taken = match op {
        OpCode::JmpEq => ord == Ordering::Equal,
        OpCode::JmpNeq => ord != Ordering::Equal,
        OpCode::JmpGt => ord == Ordering::Greater,
        OpCode::JmpGe => ord != Ordering::Less,
        OpCode::JmpLt => ord == Ordering::Less,
        OpCode::JmpLe => ord != Ordering::Greater,
        _ => false,
    };
    Ok(taken)
}
