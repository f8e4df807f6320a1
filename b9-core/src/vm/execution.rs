//! 解释执行主循环

use tracing::trace;

use super::context::ExecutionContext;
use super::operators;
use crate::error::InterpreterFault;
use crate::instruction::OpCode::{self, *};
use crate::memory::FieldSpec;
use crate::value::{ObjectRef, Value};
use crate::TARGET_INTERP;

impl ExecutionContext<'_> {
    /// 解释执行函数 `index`
    ///
    /// 参数已在栈顶；局部变量紧接其上分配，初值为整数 0。
    pub(crate) fn interpret(&mut self, index: usize) -> Result<Value, InterpreterFault> {
        let arena = self.arena;
        let record = arena.function_record(index)?;
        let nparams = record.nparams as usize;
        let nlocals = record.nlocals as usize;

        let params_base = self
            .stack
            .len()
            .checked_sub(nparams)
            .ok_or(InterpreterFault::StackUnderflow)?;
        let frame = self.stack.cursor_at(params_base)?;
        let locals_base = params_base + nparams;
        self.stack.push_n(nlocals)?;

        trace!(
            target: TARGET_INTERP,
            function = record.name,
            depth = self.depth,
            base = params_base,
            "enter"
        );

        let mut ip: i64 = 0;
        loop {
            if ip < 0 || ip as usize >= record.code_len {
                return Err(InterpreterFault::InstructionOutOfBounds {
                    function: record.name.to_string(),
                    ip,
                });
            }
            let insn = arena.instruction(&record, ip as usize)?;
            if insn.is_end_section() {
                return Err(InterpreterFault::FellOffEnd {
                    function: record.name.to_string(),
                });
            }
            let unknown = || InterpreterFault::UnknownOpcode {
                function: record.name.to_string(),
                ip: ip as usize,
                byte: insn.opcode_byte(),
            };
            let (op, imm) = insn.decode().ok_or_else(unknown)?;

            if self.debug {
                trace!(
                    target: TARGET_INTERP,
                    function = record.name,
                    ip,
                    insn = %insn,
                    height = self.stack.len(),
                    "execute"
                );
            }

            let mut next = ip + 1;
            match op {
                // ===== 调用 =====
                FunctionCall => {
                    let result = self.call_function(imm as usize)?;
                    self.stack.push(result)?;
                }
                FunctionReturn => {
                    let result = self.stack.pop()?;
                    self.stack.restore(frame)?;
                    trace!(target: TARGET_INTERP, function = record.name, %result, "return");
                    return Ok(result);
                }
                PrimitiveCall => self.call_primitive(imm as usize)?,
                CallIndirect => return Err(InterpreterFault::NotImplemented(CallIndirect)),

                // ===== 控制流 =====
                Jmp => next += imm,
                JmpEq | JmpNeq | JmpGt | JmpGe | JmpLt | JmpLe => {
                    let (left, right) = self.stack.pop_two()?;
                    if operators::jump_taken(op, left, right, arena)? {
                        next += imm;
                    }
                }

                // ===== 栈操作 =====
                Duplicate => {
                    let v = self.stack.peek()?;
                    self.stack.push(v)?;
                }
                Drop => {
                    self.stack.pop()?;
                }
                PushFromLocal => {
                    let slot = local_slot(locals_base, nlocals, imm)?;
                    let v = self.stack.get(slot)?;
                    self.stack.push(v)?;
                }
                PopIntoLocal => {
                    let slot = local_slot(locals_base, nlocals, imm)?;
                    let v = self.stack.pop()?;
                    self.stack.set(slot, v)?;
                }
                PushFromParam => {
                    let slot = param_slot(params_base, nparams, imm)?;
                    let v = self.stack.get(slot)?;
                    self.stack.push(v)?;
                }
                PopIntoParam => {
                    let slot = param_slot(params_base, nparams, imm)?;
                    let v = self.stack.pop()?;
                    self.stack.set(slot, v)?;
                }

                // ===== 整数 =====
                IntPushConstant => self.stack.push(Value::int(imm))?,
                IntAdd | IntSub | IntMul | IntDiv => {
                    let (left, right) = self.stack.pop_two()?;
                    let v = operators::int_binary(op, left, right)?;
                    self.stack.push(v)?;
                }
                IntNot => {
                    let v = self.stack.pop()?;
                    self.stack.push(operators::int_not(v)?)?;
                }

                // ===== 字符串 =====
                StrPushConstant => self.stack.push(Value::string(imm as u32))?,

                // ===== 对象 =====
                NewObject => {
                    let obj = self.memory.allocate_empty_object(self.stack.as_slice())?;
                    self.stack.push(Value::object(obj))?;
                }
                PushFromObject => {
                    let target = self.stack.pop()?;
                    let obj = expect_object(op, target)?;
                    let id = imm as u32;
                    let desc = self
                        .memory
                        .lookup_field(obj, id)?
                        .ok_or(InterpreterFault::MissingField(id))?;
                    let v = self.memory.get_field(obj, desc)?;
                    self.stack.push(v)?;
                }
                PopIntoObject => {
                    // 对象与值在布局迁移期间留在栈上，作为根
                    let obj = expect_object(op, self.stack.peek()?)?;
                    let id = imm as u32;
                    let desc = match self.memory.lookup_field(obj, id)? {
                        Some(desc) => desc,
                        None => self.memory.transition_layout(
                            obj,
                            FieldSpec { id },
                            self.stack.as_slice(),
                        )?,
                    };
                    self.stack.pop()?;
                    let v = self.stack.pop()?;
                    self.memory.set_field(obj, desc, v)?;
                }
                SystemCollect => {
                    let freed = self.memory.collect(self.stack.as_slice());
                    trace!(target: TARGET_INTERP, freed, "system_collect");
                }

                // 操作码为 0 但立即数非零：不是哨兵，也不可执行
                EndSection => return Err(unknown()),
            }
            ip = next;
        }
    }
}

fn local_slot(base: usize, count: usize, imm: i64) -> Result<usize, InterpreterFault> {
    let index = imm as usize;
    if index >= count {
        return Err(InterpreterFault::LocalOutOfRange { index, count });
    }
    Ok(base + index)
}

fn param_slot(base: usize, count: usize, imm: i64) -> Result<usize, InterpreterFault> {
    let index = imm as usize;
    if index >= count {
        return Err(InterpreterFault::ParamOutOfRange { index, count });
    }
    Ok(base + index)
}

fn expect_object(op: OpCode, v: Value) -> Result<ObjectRef, InterpreterFault> {
    v.as_object().ok_or_else(|| InterpreterFault::TypeMismatch {
        op,
        expected: "ref",
        found: v.type_name().to_string(),
    })
}
