//! 平台相关输出

mod cli;

pub use cli::{print_error, print_run_header, print_verify_ok};
