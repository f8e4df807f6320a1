//! VM 执行测试
//!
//! 端到端测试：构建模块并在虚拟机中执行

mod common;
use common::{func, insn, load, load_with_config, module, op, run};

use b9_core::{
    ExecutionContext, FunctionRef, InterpreterFault, LimitConfig, ModuleError, OpCode,
    PackedArena, PrimitiveTable, Value, VirtualMachine, VmConfig, VmError,
};
use OpCode::*;

fn add_args() -> b9_core::FunctionDef {
    func(
        "add_args",
        2,
        0,
        vec![
            insn(PushFromParam, 0),
            insn(PushFromParam, 1),
            op(IntAdd),
            op(FunctionReturn),
        ],
    )
}

// ===== 基础场景 =====

#[test]
fn test_add_args() {
    let result = run(module(vec![add_args()], &[]), "add_args", &[1, 2]).unwrap();
    assert_eq!(result, Value::int(3));
}

#[test]
fn test_push_constant() {
    let m = module(
        vec![func("k", 0, 0, vec![insn(IntPushConstant, 0xdead), op(FunctionReturn)])],
        &[],
    );
    assert_eq!(run(m, "k", &[]).unwrap(), Value::int(0xdead));
}

#[test]
fn test_negative_constant() {
    let m = module(
        vec![func("k", 0, 0, vec![insn(IntPushConstant, -42), op(FunctionReturn)])],
        &[],
    );
    assert_eq!(run(m, "k", &[]).unwrap(), Value::int(-42));
}

#[test]
fn test_bad_function_call() {
    let err = run(module(vec![add_args()], &[]), "add_args", &[1]).unwrap_err();
    assert_eq!(
        err,
        VmError::BadFunctionCall {
            function: "add_args".to_string(),
            expected: 2,
            got: 1,
        }
    );
}

#[test]
fn test_function_not_found() {
    let err = run(module(vec![add_args()], &[]), "missing", &[]).unwrap_err();
    assert_eq!(err, VmError::FunctionNotFound("missing".to_string()));

    let (mut vm, _) = load(module(vec![add_args()], &[]));
    assert!(matches!(vm.run(5usize, &[]), Err(VmError::FunctionNotFound(_))));
}

#[test]
fn test_run_by_index() {
    let (mut vm, _) = load(module(vec![add_args()], &[]));
    let result = vm
        .run(FunctionRef::Index(0), &[Value::int(20), Value::int(22)])
        .unwrap();
    assert_eq!(result, Value::int(42));
}

#[test]
fn test_no_module_loaded() {
    let mut vm = VirtualMachine::default();
    assert_eq!(vm.run("main", &[]), Err(VmError::NoModuleLoaded));
    assert_eq!(vm.function_count(), 0);
}

#[test]
fn test_arena_mismatch() {
    let mut vm = VirtualMachine::default();
    let err = vm
        .load(module(vec![add_args()], &[]), PackedArena::default())
        .unwrap_err();
    assert_eq!(
        err,
        VmError::Load(ModuleError::ArenaMismatch { module: 1, arena: 0 })
    );
}

// ===== 参数与调用约定 =====

#[test]
fn test_arguments_pushed_last_first() {
    // params[0] 是最后一个实参
    let m = module(
        vec![func(
            "sub",
            2,
            0,
            vec![
                insn(PushFromParam, 0),
                insn(PushFromParam, 1),
                op(IntSub),
                op(FunctionReturn),
            ],
        )],
        &[],
    );
    assert_eq!(run(m, "sub", &[10, 3]).unwrap(), Value::int(-7));
}

#[test]
fn test_nested_call() {
    let m = module(
        vec![
            add_args(),
            func(
                "main",
                0,
                0,
                vec![
                    insn(IntPushConstant, 5),
                    insn(IntPushConstant, 6),
                    insn(FunctionCall, 0),
                    op(FunctionReturn),
                ],
            ),
        ],
        &[],
    );
    assert_eq!(run(m, "main", &[]).unwrap(), Value::int(11));
}

fn push_height(ctx: &mut ExecutionContext<'_>) -> Result<(), InterpreterFault> {
    let h = ctx.stack().len() as i64;
    ctx.push(Value::int(h))
}

#[test]
fn test_stack_height_after_return() {
    // 调用前高度为 1，返回后应为 2
    let m = module(
        vec![
            add_args(),
            func(
                "main",
                0,
                0,
                vec![
                    insn(IntPushConstant, 7),
                    insn(IntPushConstant, 1),
                    insn(IntPushConstant, 2),
                    insn(FunctionCall, 0),
                    insn(PrimitiveCall, 3),
                    op(FunctionReturn),
                ],
            ),
        ],
        &[],
    );
    let mut primitives = PrimitiveTable::standard();
    assert_eq!(primitives.register("push_height", push_height), 3);

    let mut vm = VirtualMachine::default().with_primitives(primitives);
    vm.load_module(m).unwrap();
    assert_eq!(vm.run("main", &[]).unwrap(), Value::int(2));
}

#[test]
fn test_recursive_fib() {
    let fib = func(
        "fib",
        1,
        0,
        vec![
            insn(PushFromParam, 0),
            insn(IntPushConstant, 2),
            insn(JmpLt, 10),
            insn(PushFromParam, 0),
            insn(IntPushConstant, 1),
            op(IntSub),
            insn(FunctionCall, 0),
            insn(PushFromParam, 0),
            insn(IntPushConstant, 2),
            op(IntSub),
            insn(FunctionCall, 0),
            op(IntAdd),
            op(FunctionReturn),
            insn(PushFromParam, 0),
            op(FunctionReturn),
        ],
    );
    let (mut vm, _) = load(module(vec![fib], &[]));
    for (n, expected) in [(0, 0), (1, 1), (2, 1), (10, 55), (15, 610)] {
        assert_eq!(vm.run("fib", &[Value::int(n)]).unwrap(), Value::int(expected));
    }
}

#[test]
fn test_loop_with_locals() {
    // acc = 0; while n > 0 { acc += n; n -= 1 }; return acc
    let sum = func(
        "sum",
        1,
        1,
        vec![
            insn(PushFromParam, 0),
            insn(IntPushConstant, 0),
            insn(JmpLe, 9),
            insn(PushFromLocal, 0),
            insn(PushFromParam, 0),
            op(IntAdd),
            insn(PopIntoLocal, 0),
            insn(PushFromParam, 0),
            insn(IntPushConstant, 1),
            op(IntSub),
            insn(PopIntoParam, 0),
            insn(Jmp, -12),
            insn(PushFromLocal, 0),
            op(FunctionReturn),
        ],
    );
    assert_eq!(run(module(vec![sum], &[]), "sum", &[10]).unwrap(), Value::int(55));
}

#[test]
fn test_locals_start_at_zero() {
    let m = module(
        vec![func("l", 0, 2, vec![insn(PushFromLocal, 1), op(FunctionReturn)])],
        &[],
    );
    assert_eq!(run(m, "l", &[]).unwrap(), Value::int(0));
}

#[test]
fn test_duplicate_and_drop() {
    let m = module(
        vec![func(
            "sq",
            0,
            0,
            vec![
                insn(IntPushConstant, 4),
                op(Duplicate),
                op(IntMul),
                insn(IntPushConstant, 9),
                op(Drop),
                op(FunctionReturn),
            ],
        )],
        &[],
    );
    assert_eq!(run(m, "sq", &[]).unwrap(), Value::int(16));
}

#[test]
fn test_int_not_and_div() {
    let m = module(
        vec![
            func("not", 1, 0, vec![insn(PushFromParam, 0), op(IntNot), op(FunctionReturn)]),
            func(
                "div",
                2,
                0,
                vec![
                    insn(PushFromParam, 0),
                    insn(PushFromParam, 1),
                    op(IntDiv),
                    op(FunctionReturn),
                ],
            ),
        ],
        &[],
    );
    let (mut vm, _) = load(m);
    assert_eq!(vm.run("not", &[Value::int(0)]).unwrap(), Value::int(1));
    assert_eq!(vm.run("not", &[Value::int(7)]).unwrap(), Value::int(0));
    // params[0] = 4, params[1] = 20
    assert_eq!(
        vm.run("div", &[Value::int(20), Value::int(4)]).unwrap(),
        Value::int(0)
    );
    assert_eq!(
        vm.run("div", &[Value::int(4), Value::int(20)]).unwrap(),
        Value::int(5)
    );
}

// ===== 比较与字符串 =====

fn compare_strings(jump: OpCode) -> b9_core::FunctionDef {
    // 条件成立返回 1，否则 0
    func(
        "cmp",
        0,
        0,
        vec![
            insn(StrPushConstant, 0),
            insn(StrPushConstant, 1),
            insn(jump, 2),
            insn(IntPushConstant, 0),
            op(FunctionReturn),
            insn(IntPushConstant, 1),
            op(FunctionReturn),
        ],
    )
}

#[test]
fn test_string_comparison_is_lexicographic() {
    let strings = ["apple", "banana"];
    let expect = [
        (JmpLt, 1),
        (JmpLe, 1),
        (JmpGt, 0),
        (JmpGe, 0),
        (JmpEq, 0),
        (JmpNeq, 1),
    ];
    for (jump, expected) in expect {
        let m = module(vec![compare_strings(jump)], &strings);
        assert_eq!(run(m, "cmp", &[]).unwrap(), Value::int(expected), "{}", jump);
    }
}

#[test]
fn test_equal_strings_at_different_indices() {
    let m = module(vec![compare_strings(JmpEq)], &["same", "same"]);
    assert_eq!(run(m, "cmp", &[]).unwrap(), Value::int(1));
}

#[test]
fn test_signed_integer_comparison() {
    let m = module(
        vec![func(
            "lt",
            2,
            0,
            vec![
                insn(PushFromParam, 0),
                insn(PushFromParam, 1),
                insn(JmpLt, 2),
                insn(IntPushConstant, 0),
                op(FunctionReturn),
                insn(IntPushConstant, 1),
                op(FunctionReturn),
            ],
        )],
        &[],
    );
    let (mut vm, _) = load(m);
    // params[0] 是最后一个实参：判断 b < a
    assert_eq!(vm.run("lt", &[Value::int(0), Value::int(-1)]).unwrap(), Value::int(1));
    assert_eq!(vm.run("lt", &[Value::int(-1), Value::int(0)]).unwrap(), Value::int(0));
}

#[test]
fn test_mixed_tag_comparison_faults() {
    let m = module(
        vec![func(
            "mixed",
            0,
            0,
            vec![
                insn(StrPushConstant, 0),
                insn(IntPushConstant, 0),
                insn(JmpEq, 0),
                op(FunctionReturn),
            ],
        )],
        &["s"],
    );
    assert!(matches!(
        run(m, "mixed", &[]),
        Err(VmError::Fault(InterpreterFault::TypeMismatch { op: JmpEq, .. }))
    ));
}

#[test]
fn test_string_at() {
    let (vm, _) = load(module(vec![add_args()], &["hi", "there"]));
    assert_eq!(vm.string_at(1).unwrap(), "there");
    assert!(vm.string_at(2).is_err());
}

// ===== 原语 =====

#[test]
fn test_print_primitives() {
    let m = module(
        vec![func(
            "main",
            0,
            0,
            vec![
                insn(StrPushConstant, 0),
                insn(PrimitiveCall, 0),
                op(Drop),
                insn(IntPushConstant, 42),
                insn(PrimitiveCall, 1),
                op(FunctionReturn),
            ],
        )],
        &["hello"],
    );
    let (mut vm, output) = load(m);
    assert_eq!(vm.run("main", &[]).unwrap(), Value::int(0));
    assert_eq!(output.contents(), "hello\n42\n");
}

#[test]
fn test_print_stack() {
    let m = module(
        vec![func(
            "main",
            0,
            0,
            vec![
                insn(IntPushConstant, 3),
                insn(StrPushConstant, 0),
                insn(PrimitiveCall, 2),
                op(FunctionReturn),
            ],
        )],
        &["s"],
    );
    let (mut vm, output) = load(m);
    assert_eq!(vm.run("main", &[]).unwrap(), Value::int(0));
    assert_eq!(output.contents(), "   0: 3\n   1: uint48(0)\n");
}

#[test]
fn test_unknown_primitive() {
    let m = module(
        vec![func("main", 0, 0, vec![insn(PrimitiveCall, 99), op(FunctionReturn)])],
        &[],
    );
    assert!(matches!(
        run(m, "main", &[]),
        Err(VmError::Fault(InterpreterFault::UnknownPrimitive { index: 99, .. }))
    ));
}

// ===== 致命错误 =====

fn fault_of(body: Vec<b9_core::Instruction>) -> InterpreterFault {
    match run(module(vec![func("f", 0, 1, body)], &[]), "f", &[]) {
        Err(VmError::Fault(fault)) => fault,
        other => panic!("expected fault, got {:?}", other),
    }
}

#[test]
fn test_division_by_zero() {
    let fault = fault_of(vec![
        insn(IntPushConstant, 1),
        insn(IntPushConstant, 0),
        op(IntDiv),
        op(FunctionReturn),
    ]);
    assert_eq!(fault, InterpreterFault::DivisionByZero);
}

#[test]
fn test_call_indirect_not_implemented() {
    let fault = fault_of(vec![op(CallIndirect), op(FunctionReturn)]);
    assert_eq!(fault, InterpreterFault::NotImplemented(CallIndirect));
}

#[test]
fn test_fell_off_end() {
    let fault = fault_of(vec![insn(IntPushConstant, 1)]);
    assert_eq!(
        fault,
        InterpreterFault::FellOffEnd {
            function: "f".to_string()
        }
    );
}

#[test]
fn test_unknown_opcode() {
    let fault = fault_of(vec![b9_core::Instruction::from_raw(0x7f00_0000)]);
    assert!(matches!(
        fault,
        InterpreterFault::UnknownOpcode { ip: 0, byte: 0x7f, .. }
    ));
}

#[test]
fn test_stack_underflow() {
    assert_eq!(
        fault_of(vec![op(Drop), op(Drop), op(FunctionReturn)]),
        InterpreterFault::StackUnderflow
    );
}

#[test]
fn test_type_mismatch_on_add() {
    let fault = fault_of(vec![
        insn(StrPushConstant, 0),
        insn(IntPushConstant, 1),
        op(IntAdd),
        op(FunctionReturn),
    ]);
    assert!(matches!(fault, InterpreterFault::TypeMismatch { op: IntAdd, .. }));
}

#[test]
fn test_out_of_range_local() {
    assert_eq!(
        fault_of(vec![insn(PushFromLocal, 4), op(FunctionReturn)]),
        InterpreterFault::LocalOutOfRange { index: 4, count: 1 }
    );
}

#[test]
fn test_jump_outside_function() {
    assert!(matches!(
        fault_of(vec![insn(Jmp, -5)]),
        InterpreterFault::InstructionOutOfBounds { ip: -4, .. }
    ));
}

#[test]
fn test_call_depth_limit() {
    let m = module(
        vec![func("forever", 0, 0, vec![insn(FunctionCall, 0), op(FunctionReturn)])],
        &[],
    );
    let config = VmConfig {
        limits: LimitConfig {
            max_recursion_depth: 8,
            ..LimitConfig::default()
        },
        ..VmConfig::default()
    };
    let (mut vm, _) = load_with_config(m, config);
    assert_eq!(
        vm.run("forever", &[]),
        Err(VmError::Fault(InterpreterFault::CallDepthExceeded { limit: 8 }))
    );
}

#[test]
fn test_stack_limit() {
    let m = module(
        vec![func("grow", 0, 0, vec![insn(IntPushConstant, 1), insn(Jmp, -2)])],
        &[],
    );
    let config = VmConfig {
        limits: LimitConfig {
            max_stack_size: 16,
            ..LimitConfig::default()
        },
        ..VmConfig::default()
    };
    let (mut vm, _) = load_with_config(m, config);
    assert_eq!(
        vm.run("grow", &[]),
        Err(VmError::Fault(InterpreterFault::StackOverflow { limit: 16 }))
    );
}

#[test]
fn test_vm_reusable_after_fault() {
    let m = module(
        vec![
            add_args(),
            func("bad", 0, 0, vec![op(Drop), op(FunctionReturn)]),
        ],
        &[],
    );
    let (mut vm, _) = load(m);
    assert!(vm.run("bad", &[]).is_err());
    assert_eq!(
        vm.run("add_args", &[Value::int(2), Value::int(3)]).unwrap(),
        Value::int(5)
    );
}

// ===== 加载期校验 =====

#[test]
fn test_load_rejects_missing_end_section() {
    // 结构体字面量绕过 FunctionDef::new
    let body = b9_core::FunctionDef {
        name: "f".to_string(),
        nparams: 0,
        nlocals: 0,
        instructions: vec![insn(IntPushConstant, 1)],
    };
    let mut vm = VirtualMachine::default();
    assert_eq!(
        vm.load_module(module(vec![body], &[])),
        Err(VmError::Load(ModuleError::MissingEndSection {
            function: "f".to_string(),
        }))
    );
    assert_eq!(vm.function_count(), 0);
}

#[test]
fn test_load_rejects_embedded_end_section() {
    let mut body = func("f", 0, 0, vec![insn(IntPushConstant, 1), op(FunctionReturn)]);
    body.instructions.insert(1, b9_core::END_SECTION);
    let mut vm = VirtualMachine::default();
    assert_eq!(
        vm.load_module(module(vec![body], &[])),
        Err(VmError::Load(ModuleError::EmbeddedEndSection {
            function: "f".to_string(),
            index: 1,
        }))
    );
}

#[test]
fn test_verify_on_load() {
    let m = module(
        vec![func("f", 0, 0, vec![insn(PushFromLocal, 0), op(FunctionReturn)])],
        &[],
    );
    let mut vm = VirtualMachine::new(VmConfig {
        verify_on_load: true,
        ..VmConfig::default()
    });
    assert!(matches!(vm.load_module(m), Err(VmError::Verify(_))));
    assert_eq!(vm.function_count(), 0);
}
