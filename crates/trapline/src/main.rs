use std::process;

use clap::{Args, Parser, Subcommand};
use trapline_utils::{init_logging_with, LogFormat, LogLevel, LoggingConfig};

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod session;

/// Run a program under ptrace, stop at breakpoints, and report every stop.
#[derive(Parser, Debug)]
#[command(name = "trapline")]
#[command(version)]
#[command(about = "Run a program under ptrace, stop at breakpoints, and report every stop", long_about = None)]
struct Cli
{
    /// Log verbosity; overrides RUST_LOG
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
    /// Log output format (pretty or json); overrides TRAPLINE_LOG_FORMAT
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

/// Where to stop and what to show when stopped
#[derive(Args, Debug, Clone, Default)]
struct StopOptions
{
    /// Stop at an address (0x-prefixed hex) or a section or symbol name; repeatable
    #[arg(short = 'b', long = "break", value_name = "ADDR|SYMBOL")]
    breakpoints: Vec<String>,
    /// Use debug registers instead of int3 (at most four breakpoints)
    #[arg(long, default_value_t = false)]
    hardware: bool,
    /// Print the general-purpose registers at every stop
    #[arg(long, default_value_t = false)]
    registers: bool,
    /// Write a register before the program first runs, e.g. `rdi=0x10`; repeatable
    #[arg(long = "set", value_name = "REG=VALUE")]
    register_writes: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Launch a program under debugger control and run it to completion
    Launch
    {
        #[command(flatten)]
        stops: StopOptions,
        /// Disable address space randomization for the program
        #[arg(long, default_value_t = false)]
        no_aslr: bool,
        /// Program to run; looked up on PATH if it contains no slash
        program: String,
        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Attach to a running process, follow it until it exits
    Attach
    {
        #[command(flatten)]
        stops: StopOptions,
        /// Process ID (PID) to attach to
        pid: u32,
    },
}

fn main()
{
    let cli = Cli::parse();

    let mut config = match LoggingConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };
    config.level = cli.log_level;
    if let Some(format) = cli.log_format {
        config.format = format;
    }
    let guard = match init_logging_with(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    let code = run(cli.command);
    // process::exit skips destructors; flush file logs first
    drop(guard);
    process::exit(code);
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn run(command: Commands) -> i32
{
    match session::run(command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
fn run(_command: Commands) -> i32
{
    eprintln!("Error: trapline only supports Linux on x86-64");
    1
}
