//! 测试辅助工具
//!
//! 提供构建模块、捕获原语输出和执行函数的辅助函数

#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};

use b9_core::{
    FunctionDef, Instruction, Module, OpCode, Value, VirtualMachine, VmConfig, VmError,
};

/// 带立即数的指令
pub fn insn(op: OpCode, imm: i32) -> Instruction {
    Instruction::new(op, imm)
}

/// 不带立即数的指令
pub fn op(op: OpCode) -> Instruction {
    Instruction::op(op)
}

/// 构建函数（自动补上 END_SECTION）
pub fn func(name: &str, nparams: u32, nlocals: u32, body: Vec<Instruction>) -> FunctionDef {
    FunctionDef::new(name, nparams, nlocals, body)
}

pub fn module(functions: Vec<FunctionDef>, strings: &[&str]) -> Module {
    Module::new(functions, strings.iter().map(|s| s.to_string()).collect())
}

/// 可共享的内存输出
#[derive(Clone, Default)]
pub struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 加载模块，返回虚拟机与其输出
pub fn load(module: Module) -> (VirtualMachine, SharedOutput) {
    load_with_config(module, VmConfig::default())
}

pub fn load_with_config(module: Module, config: VmConfig) -> (VirtualMachine, SharedOutput) {
    let output = SharedOutput::default();
    let mut vm = VirtualMachine::new(config).with_output(Box::new(output.clone()));
    vm.load_module(module).unwrap();
    (vm, output)
}

/// 加载并执行
pub fn run(module: Module, name: &str, args: &[i64]) -> Result<Value, VmError> {
    let (mut vm, _) = load(module);
    let args: Vec<Value> = args.iter().copied().map(Value::int).collect();
    vm.run(name, &args)
}
