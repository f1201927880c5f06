//! Common module for library exports

pub use crate::breakpoints::{BreakpointSite, Stoppoint, StoppointCollection, StoppointId, StoppointMode};
pub use crate::error::{DebuggerError, Result};
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use crate::platform::linux::{LaunchOptions, Process};
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use crate::registers::{RegisterId, RegisterInfo, RegisterValue, Registers};
pub use crate::symbols::{ElfImage, SymbolLocation, SymbolResolver};
pub use crate::types::{ProcessId, ProcessState, StopReason, VirtualAddress};
