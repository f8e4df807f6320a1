//! 字节码校验
//!
//! 加载期的静态检查，把会在执行中途才暴露的错误提前到加载时：
//! 每个函数的指令流以唯一的 `END_SECTION` 结束，操作码均已知，
//! 所有索引类立即数在范围内，跳转目标落在函数内部。

use tracing::debug;

use crate::error::{VerifyError, VerifyErrorKind};
use crate::instruction::OpCode;
use crate::module::{FunctionDef, Module};
use crate::TARGET_VERIFY;

/// 校验整个模块
pub fn verify(module: &Module, primitive_count: usize) -> Result<(), VerifyError> {
    for func in module.functions() {
        verify_function(module, func, primitive_count)?;
    }
    debug!(
        target: TARGET_VERIFY,
        functions = module.function_count(),
        "module verified"
    );
    Ok(())
}

fn verify_function(
    module: &Module,
    func: &FunctionDef,
    primitive_count: usize,
) -> Result<(), VerifyError> {
    let fail = |index: usize, kind: VerifyErrorKind| VerifyError {
        function: func.name.clone(),
        index,
        kind,
    };

    let len = func.instructions.len();
    match func.instructions.last() {
        Some(last) if last.is_end_section() => {}
        _ => return Err(fail(len, VerifyErrorKind::MissingEndSection)),
    }

    for (index, insn) in func.instructions[..len - 1].iter().enumerate() {
        if insn.is_end_section() {
            return Err(fail(index, VerifyErrorKind::EarlyEndSection));
        }
        let (op, imm) = insn
            .decode()
            .filter(|(op, _)| *op != OpCode::EndSection)
            .ok_or_else(|| fail(index, VerifyErrorKind::UnknownOpcode(insn.opcode_byte())))?;
        let operand = insn.index();

        let kind = match op {
            OpCode::FunctionCall if operand as usize >= module.function_count() => {
                Some(VerifyErrorKind::BadFunctionIndex(operand))
            }
            OpCode::PrimitiveCall if operand as usize >= primitive_count => {
                Some(VerifyErrorKind::BadPrimitiveIndex(operand))
            }
            OpCode::PushFromParam | OpCode::PopIntoParam if operand >= func.nparams => {
                Some(VerifyErrorKind::BadParamIndex(operand))
            }
            OpCode::PushFromLocal | OpCode::PopIntoLocal if operand >= func.nlocals => {
                Some(VerifyErrorKind::BadLocalIndex(operand))
            }
            OpCode::StrPushConstant if operand as usize >= module.string_count() => {
                Some(VerifyErrorKind::BadStringIndex(operand))
            }
            op if op.is_jump() => {
                let target = index as i64 + 1 + imm;
                // 目标不能是哨兵
                (target < 0 || target >= (len - 1) as i64)
                    .then_some(VerifyErrorKind::BadJumpTarget(target))
            }
            _ => None,
        };
        if let Some(kind) = kind {
            return Err(fail(index, kind));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Instruction, END_SECTION};

    fn module_with(body: Vec<Instruction>) -> Module {
        Module::new(
            vec![FunctionDef {
                name: "f".into(),
                nparams: 1,
                nlocals: 1,
                instructions: body,
            }],
            vec!["s".into()],
        )
    }

    fn kind_of(body: Vec<Instruction>) -> VerifyErrorKind {
        verify(&module_with(body), 3).unwrap_err().kind
    }

    #[test]
    fn test_valid_function() {
        let body = vec![
            Instruction::new(OpCode::PushFromParam, 0),
            Instruction::new(OpCode::PopIntoLocal, 0),
            Instruction::new(OpCode::StrPushConstant, 0),
            Instruction::new(OpCode::PrimitiveCall, 0),
            Instruction::new(OpCode::Jmp, 0),
            Instruction::new(OpCode::FunctionCall, 0),
            Instruction::op(OpCode::FunctionReturn),
            END_SECTION,
        ];
        assert!(verify(&module_with(body), 3).is_ok());
    }

    #[test]
    fn test_missing_and_early_end_section() {
        assert_eq!(
            kind_of(vec![Instruction::op(OpCode::FunctionReturn)]),
            VerifyErrorKind::MissingEndSection
        );
        assert_eq!(kind_of(vec![]), VerifyErrorKind::MissingEndSection);
        assert_eq!(
            kind_of(vec![END_SECTION, END_SECTION]),
            VerifyErrorKind::EarlyEndSection
        );
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(
            kind_of(vec![Instruction::from_raw(0xFF00_0000), END_SECTION]),
            VerifyErrorKind::UnknownOpcode(0xFF)
        );
        assert_eq!(
            kind_of(vec![Instruction::from_raw(0x0000_0001), END_SECTION]),
            VerifyErrorKind::UnknownOpcode(0x00)
        );
    }

    #[test]
    fn test_index_operands() {
        let cases = [
            (OpCode::FunctionCall, 1, VerifyErrorKind::BadFunctionIndex(1)),
            (OpCode::PrimitiveCall, 3, VerifyErrorKind::BadPrimitiveIndex(3)),
            (OpCode::PushFromParam, 1, VerifyErrorKind::BadParamIndex(1)),
            (OpCode::PopIntoLocal, 1, VerifyErrorKind::BadLocalIndex(1)),
            (OpCode::StrPushConstant, 1, VerifyErrorKind::BadStringIndex(1)),
        ];
        for (op, imm, expected) in cases {
            assert_eq!(kind_of(vec![Instruction::new(op, imm), END_SECTION]), expected);
        }
    }

    #[test]
    fn test_jump_targets() {
        // 跳到哨兵
        assert_eq!(
            kind_of(vec![Instruction::new(OpCode::Jmp, 0), END_SECTION]),
            VerifyErrorKind::BadJumpTarget(1)
        );
        assert_eq!(
            kind_of(vec![Instruction::new(OpCode::JmpLt, -2), END_SECTION]),
            VerifyErrorKind::BadJumpTarget(-1)
        );
        // 跳回自身
        let body = vec![Instruction::new(OpCode::Jmp, -1), END_SECTION];
        assert!(verify(&module_with(body), 0).is_ok());
    }

    #[test]
    fn test_error_location() {
        let err = verify(
            &module_with(vec![
                Instruction::op(OpCode::Duplicate),
                Instruction::new(OpCode::PushFromLocal, 9),
                END_SECTION,
            ]),
            0,
        )
        .unwrap_err();
        assert_eq!(err.function, "f");
        assert_eq!(err.index, 1);
    }
}
