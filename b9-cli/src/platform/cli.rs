//! CLI 格式化输出
//!
//! 提供命令行友好的错误显示和运行摘要。

use std::path::Path;

use b9_core::{Module, Value};

use crate::error::CliError;

/// 打印错误到 stderr
pub fn print_error(e: &CliError) {
    eprintln!("{}", e);
}

/// 打印运行摘要（`--verbose`）
pub fn print_run_header(module_path: &Path, args: &[Value], module: &Module) {
    println!("Module:       {}", module_path.display());
    print!("Arguments:    [ ");
    for arg in args {
        print!("{} ", arg);
    }
    println!("]");
    println!("Functions:    {}", module.function_count());
    println!("Strings:      {}", module.string_count());
}

/// 打印校验通过的摘要
pub fn print_verify_ok(module_path: &Path, module: &Module) {
    println!(
        "{}: ok ({} functions, {} strings)",
        module_path.display(),
        module.function_count(),
        module.string_count()
    );
}
