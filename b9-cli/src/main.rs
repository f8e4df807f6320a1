//! B9 CLI - Command line interface
//!
//! Runs, disassembles and verifies binary B9 modules.

use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;

use tracing::{debug, info};

mod config;
mod error;
mod logging;
mod platform;

use crate::config::FileConfig;
use crate::error::CliError;
use crate::logging::{LogFormat, TARGET_CLI};
use crate::platform::{print_error, print_run_header, print_verify_ok};
use b9_core::{PrimitiveTable, Value, VirtualMachine};

#[derive(Parser)]
#[command(name = "b9", about = "B9 stack virtual machine", version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file (vm and log sections)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level: silent, error, warn, info, debug, trace
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a function from a module and print its result
    Run(RunArgs),
    /// Print the text form of a module (reads stdin when no file is given)
    Disasm {
        module: Option<PathBuf>,
    },
    /// Check a module's bytecode without running it
    Verify {
        module: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Binary module file
    module: PathBuf,

    /// Integer arguments passed to the function
    #[arg(allow_negative_numbers = true)]
    args: Vec<i64>,

    /// Function to run
    #[arg(short, long, default_value = "<script>")]
    function: String,

    /// Verify bytecode before running
    #[arg(long)]
    verify: bool,

    /// Trace every interpreted instruction
    #[arg(long)]
    debug: bool,

    /// Print module and argument summary before running
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = try_main(cli) {
        print_error(&e);
        process::exit(1);
    }
}

fn try_main(cli: Cli) -> Result<(), CliError> {
    let file_config = match &cli.config {
        Some(path) => FileConfig::read(path)?,
        None => FileConfig::default(),
    };
    let log_config = file_config.log_config(cli.log_level.as_deref())?;
    logging::init_with_file(&log_config, cli.log_format, cli.log_file.as_deref())?;

    match cli.command {
        Command::Run(args) => handle_run(file_config, args),
        Command::Disasm { module } => handle_disasm(module.as_deref()),
        Command::Verify { module } => handle_verify(&module),
    }
}

/// 读取模块文件，未给出路径时读取 stdin
fn read_input(path: Option<&Path>) -> Result<Vec<u8>, CliError> {
    let mut bytes = Vec::new();
    match path {
        Some(path) => {
            bytes = std::fs::read(path).map_err(|source| CliError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            debug!(target: TARGET_CLI, path = %path.display(), size = bytes.len(), "file read");
        }
        None => {
            std::io::stdin()
                .read_to_end(&mut bytes)
                .map_err(|source| CliError::Io {
                    path: PathBuf::from("<stdin>"),
                    source,
                })?;
        }
    }
    Ok(bytes)
}

fn handle_run(file_config: FileConfig, args: RunArgs) -> Result<(), CliError> {
    let mut config = file_config.vm;
    config.verify_on_load |= args.verify;
    config.debug |= args.debug;

    let bytes = read_input(Some(&args.module))?;
    let (module, arena) = b9_core::deserialize(&bytes)?;
    let values: Vec<Value> = args.args.iter().copied().map(Value::int).collect();

    if args.verbose {
        print_run_header(&args.module, &values, &module);
    }

    let mut vm = VirtualMachine::new(config);
    vm.load(module, arena)?;
    info!(
        target: TARGET_CLI,
        functions = vm.function_count(),
        function = %args.function,
        "running"
    );

    let result = vm.run(args.function.as_str(), &values)?;
    println!("=> {}", result);
    Ok(())
}

fn handle_disasm(path: Option<&Path>) -> Result<(), CliError> {
    let bytes = read_input(path)?;
    let (module, _) = b9_core::deserialize(&bytes)?;
    print!("{}", module);
    Ok(())
}

fn handle_verify(path: &Path) -> Result<(), CliError> {
    let bytes = read_input(Some(path))?;
    let (module, _) = b9_core::deserialize(&bytes)?;
    b9_core::verify::verify(&module, PrimitiveTable::standard().len())?;
    print_verify_ok(path, &module);
    Ok(())
}
