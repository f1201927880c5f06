//! Driving one traced process from the first stop to exit.

use nix::sys::signal::Signal;
use trapline_core::breakpoints::Stoppoint;
use trapline_core::registers::{register_info_by_name, register_infos, RegisterInfo, RegisterValue};
use trapline_core::symbols::{ElfImage, SymbolResolver};
use trapline_core::types::{ProcessId, ProcessState, StopReason, VirtualAddress};
use trapline_core::{DebuggerError, LaunchOptions, Process, Result};
use trapline_utils::{debug, info, warn};

use crate::{Commands, StopOptions};

/// `AT_ENTRY` auxiliary vector key: runtime address of the program entry point
const AT_ENTRY: u64 = 9;

/// Run a command to completion and return the exit code for trapline itself.
pub fn run(command: Commands) -> Result<i32>
{
    match command {
        Commands::Launch {
            stops,
            no_aslr,
            program,
            args,
        } => {
            let mut options = LaunchOptions::default().with_args(args);
            if no_aslr {
                options = options.with_aslr_disabled();
            }
            info!("Launching {}", program);
            let process = Process::launch_with(&program, options)?;
            println!("Launched {} as process {}", program, process.pid());
            follow(process, &stops)
        }
        Commands::Attach { stops, pid } => {
            info!("Attaching to process {}", pid);
            let process = Process::attach(ProcessId::from(pid))?;
            println!("Attached to process {}", pid);
            follow(process, &stops)
        }
    }
}

/// Symbol lookups for the traced executable, corrected by its load bias
struct Symbols
{
    image: ElfImage,
    bias: u64,
}

impl Symbols
{
    fn load(process: &Process) -> Option<Self>
    {
        let image = match ElfImage::open(format!("/proc/{}/exe", process.pid())) {
            Ok(image) => image,
            Err(e) => {
                warn!("No symbols for process {}: {}", process.pid(), e);
                return None;
            }
        };
        let runtime_entry = match process.auxv() {
            Ok(auxv) => auxv.get(&AT_ENTRY).copied()?,
            Err(e) => {
                warn!("Cannot read auxiliary vector of process {}: {}", process.pid(), e);
                return None;
            }
        };
        let bias = image.load_bias(VirtualAddress::new(runtime_entry));
        debug!("Load bias for process {} is {:#x}", process.pid(), bias);
        Some(Self { image, bias })
    }

    fn resolve(&self, name: &str) -> Option<VirtualAddress>
    {
        self.image.resolve(name).map(|location| location.address + self.bias)
    }

    fn describe(&self, address: VirtualAddress) -> Option<String>
    {
        let (name, offset) = self.image.symbol_containing(address - self.bias)?;
        Some(if offset == 0 {
            name
        } else {
            format!("{name}+{offset:#x}")
        })
    }
}

/// Parse a `0x`-prefixed hexadecimal address. Anything else is a name.
pub fn parse_address(text: &str) -> Option<VirtualAddress>
{
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok().map(VirtualAddress::new)
}

fn plant_breakpoints(process: &mut Process, stops: &StopOptions, symbols: Option<&Symbols>) -> Result<()>
{
    for location in &stops.breakpoints {
        let address = match parse_address(location) {
            Some(address) => address,
            None => symbols
                .and_then(|symbols| symbols.resolve(location))
                .ok_or_else(|| DebuggerError::InvalidArgument(format!("cannot resolve breakpoint location {location:?}")))?,
        };

        let id = process.create_breakpoint_site(address, stops.hardware, false)?.id();
        process.enable_breakpoint_site(id)?;
        println!("Breakpoint {id} set at {address} ({location})");
    }
    Ok(())
}

/// Split `name=value` and parse the value for that register.
fn parse_register_write(text: &str) -> Result<(&'static RegisterInfo, RegisterValue)>
{
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| DebuggerError::MalformedInput(format!("expected REG=VALUE, got {text:?}")))?;
    let info = register_info_by_name(name.trim())?;
    Ok((info, RegisterValue::parse(info, value.trim())?))
}

fn apply_register_writes(process: &mut Process, stops: &StopOptions) -> Result<()>
{
    for text in &stops.register_writes {
        let (info, value) = parse_register_write(text)?;
        process.write_register(info, value)?;
        println!("Set {} = {value}", info.name);
    }
    Ok(())
}

fn signal_name(number: u8) -> String
{
    Signal::try_from(i32::from(number)).map_or_else(|_| format!("signal {number}"), |signal| signal.as_str().to_string())
}

fn follow(mut process: Process, stops: &StopOptions) -> Result<i32>
{
    let symbols = Symbols::load(&process);
    plant_breakpoints(&mut process, stops, symbols.as_ref())?;
    apply_register_writes(&mut process, stops)?;

    loop {
        process.resume()?;
        let reason = process.wait_on_signal()?;

        match reason.reason {
            ProcessState::Exited => {
                println!("Process {} exited with status {}", process.pid(), reason.info);
                return Ok(i32::from(reason.info));
            }
            ProcessState::Terminated => {
                println!("Process {} terminated by {}", process.pid(), signal_name(reason.info));
                return Ok(128 + i32::from(reason.info));
            }
            ProcessState::Stopped => {
                report_stop(&process, reason, symbols.as_ref(), stops.registers)?;
                if !reason.is_trap() {
                    // Continuing would drop the signal and usually re-fault
                    println!("Ending session on {}", signal_name(reason.info));
                    return Ok(128 + i32::from(reason.info));
                }
            }
            ProcessState::Running => {}
        }
    }
}

fn report_stop(process: &Process, reason: StopReason, symbols: Option<&Symbols>, show_registers: bool) -> Result<()>
{
    let pc = process.get_pc()?;
    let location = symbols
        .and_then(|symbols| symbols.describe(pc))
        .map(|name| format!(" <{name}>"))
        .unwrap_or_default();
    let breakpoint = process
        .breakpoint_sites()
        .get_by_address(pc)
        .ok()
        .map(|site| format!(", breakpoint {} (hit {})", site.id(), site.hit_count()))
        .unwrap_or_default();

    println!(
        "Process {} stopped by {} at {pc}{location}{breakpoint}",
        process.pid(),
        signal_name(reason.info)
    );

    if show_registers {
        for info in register_infos().iter().filter(|info| info.is_full_gpr()) {
            println!("  {:<10} {}", info.name, process.registers().read(info)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_address()
    {
        assert_eq!(parse_address("0x401000"), Some(VirtualAddress::new(0x40_1000)));
        assert_eq!(parse_address("0XDEADbeef"), Some(VirtualAddress::new(0xdead_beef)));
        assert_eq!(parse_address("main"), None);
        // Bare hex-looking names stay symbols
        assert_eq!(parse_address("add"), None);
        assert_eq!(parse_address("0x"), None);
        assert_eq!(parse_address("0xnope"), None);
    }

    #[test]
    fn test_parse_register_write()
    {
        let (info, value) = parse_register_write("rax=0x1234").unwrap();
        assert_eq!(info.name, "rax");
        assert_eq!(value, RegisterValue::U64(0x1234));

        let (info, value) = parse_register_write(" al = 7f ").unwrap();
        assert_eq!(info.name, "al");
        assert_eq!(value, RegisterValue::U8(0x7f));

        assert!(matches!(parse_register_write("rax"), Err(DebuggerError::MalformedInput(_))));
        assert!(matches!(parse_register_write("rxx=1"), Err(DebuggerError::RegisterNotFound(_))));
        assert!(matches!(parse_register_write("al=0x100"), Err(DebuggerError::MalformedInput(_))));
    }

    #[test]
    fn test_signal_name()
    {
        assert_eq!(signal_name(5), "SIGTRAP");
        assert_eq!(signal_name(11), "SIGSEGV");
        assert_eq!(signal_name(200), "signal 200");
    }
}
