//! The x86-64 register catalog.
//!
//! Every register the debugger can name lives in one static table. Offsets
//! are byte offsets into the kernel's `struct user` (the same buffer the
//! [`Registers`](super::Registers) snapshot holds), computed with
//! `offset_of!` so they cannot drift from the C layout.
//!
//! ## Layout of `struct user` on x86-64
//!
//! | Range       | Contents                                  |
//! |-------------|-------------------------------------------|
//! | `regs`      | general-purpose registers (`PTRACE_GETREGS`) |
//! | `i387`      | x87/SSE state (`PTRACE_GETFPREGS`)        |
//! | `u_debugreg`| DR0-DR7 (`PTRACE_PEEKUSER`/`POKEUSER`)    |
//!
//! Sub-registers (`eax`, `ax`, `ah`, `al`, ...) alias bytes of their 64-bit
//! parent; the high-byte registers sit one byte above the parent's offset.

use std::collections::HashMap;
use std::mem::offset_of;

use once_cell::sync::Lazy;

use crate::error::{DebuggerError, Result};

/// Which register set a register belongs to, and so how it is flushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterClass
{
    /// Integer registers and their sub-registers (`PTRACE_SETREGS`)
    GeneralPurpose,
    /// x87, MMX and SSE state (`PTRACE_SETFPREGS`)
    FloatingPoint,
    /// Hardware debug registers (`PTRACE_POKEUSER`)
    Debug,
}

/// How the bytes of a register are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterFormat
{
    /// Little-endian unsigned integer of the register's width
    UnsignedInteger,
    /// IEEE-754 double
    Double,
    /// x87 80-bit extended precision, stored in 16 bytes
    ExtendedDouble,
    /// Raw bytes (8 for MMX, 16 for XMM)
    Vector,
}

/// Static description of one register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterInfo
{
    /// Catalog identifier
    pub id: RegisterId,
    /// Canonical lower-case name
    pub name: &'static str,
    /// DWARF register number, or -1 when DWARF has none
    pub dwarf_id: i32,
    /// Width in bytes
    pub size: usize,
    /// Byte offset into `struct user`
    pub offset: usize,
    /// Register set
    pub class: RegisterClass,
    /// Storage format
    pub format: RegisterFormat,
}

impl RegisterInfo
{
    /// `true` for the full-width general-purpose registers (not sub-registers).
    #[must_use]
    pub const fn is_full_gpr(&self) -> bool
    {
        matches!(self.class, RegisterClass::GeneralPurpose) && self.size == 8
    }
}

macro_rules! gpr {
    ($field:ident) => {
        offset_of!(libc::user, regs) + offset_of!(libc::user_regs_struct, $field)
    };
}

macro_rules! fpr {
    ($field:ident) => {
        offset_of!(libc::user, i387) + offset_of!(libc::user_fpregs_struct, $field)
    };
}

const fn st_offset(index: usize) -> usize
{
    fpr!(st_space) + index * 16
}

const fn xmm_offset(index: usize) -> usize
{
    fpr!(xmm_space) + index * 16
}

const fn debug_offset(index: usize) -> usize
{
    offset_of!(libc::user, u_debugreg) + index * 8
}

const fn gpr64(id: RegisterId, name: &'static str, dwarf_id: i32, offset: usize) -> RegisterInfo
{
    RegisterInfo {
        id,
        name,
        dwarf_id,
        size: 8,
        offset,
        class: RegisterClass::GeneralPurpose,
        format: RegisterFormat::UnsignedInteger,
    }
}

const fn sub_gpr(id: RegisterId, name: &'static str, size: usize, offset: usize) -> RegisterInfo
{
    RegisterInfo {
        id,
        name,
        dwarf_id: -1,
        size,
        offset,
        class: RegisterClass::GeneralPurpose,
        format: RegisterFormat::UnsignedInteger,
    }
}

const fn gpr32(id: RegisterId, name: &'static str, parent_offset: usize) -> RegisterInfo
{
    sub_gpr(id, name, 4, parent_offset)
}

const fn gpr16(id: RegisterId, name: &'static str, parent_offset: usize) -> RegisterInfo
{
    sub_gpr(id, name, 2, parent_offset)
}

const fn gpr8h(id: RegisterId, name: &'static str, parent_offset: usize) -> RegisterInfo
{
    sub_gpr(id, name, 1, parent_offset + 1)
}

const fn gpr8l(id: RegisterId, name: &'static str, parent_offset: usize) -> RegisterInfo
{
    sub_gpr(id, name, 1, parent_offset)
}

const fn fpr_control(id: RegisterId, name: &'static str, dwarf_id: i32, size: usize, offset: usize) -> RegisterInfo
{
    RegisterInfo {
        id,
        name,
        dwarf_id,
        size,
        offset,
        class: RegisterClass::FloatingPoint,
        format: RegisterFormat::UnsignedInteger,
    }
}

#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
const fn fp_st(id: RegisterId, name: &'static str, index: usize) -> RegisterInfo
{
    RegisterInfo {
        id,
        name,
        dwarf_id: 33 + index as i32,
        size: 16,
        offset: st_offset(index),
        class: RegisterClass::FloatingPoint,
        format: RegisterFormat::ExtendedDouble,
    }
}

// MMX registers alias the low 8 bytes of the x87 stack slots
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
const fn fp_mm(id: RegisterId, name: &'static str, index: usize) -> RegisterInfo
{
    RegisterInfo {
        id,
        name,
        dwarf_id: 41 + index as i32,
        size: 8,
        offset: st_offset(index),
        class: RegisterClass::FloatingPoint,
        format: RegisterFormat::Vector,
    }
}

#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
const fn fp_xmm(id: RegisterId, name: &'static str, index: usize) -> RegisterInfo
{
    RegisterInfo {
        id,
        name,
        dwarf_id: 17 + index as i32,
        size: 16,
        offset: xmm_offset(index),
        class: RegisterClass::FloatingPoint,
        format: RegisterFormat::Vector,
    }
}

const fn dr(id: RegisterId, name: &'static str, index: usize) -> RegisterInfo
{
    RegisterInfo {
        id,
        name,
        dwarf_id: -1,
        size: 8,
        offset: debug_offset(index),
        class: RegisterClass::Debug,
        format: RegisterFormat::UnsignedInteger,
    }
}

/// Declares `RegisterId` and the table in one pass so that the enum
/// discriminant of every register is its index in `REGISTER_INFOS`.
macro_rules! register_catalog {
    ($($variant:ident => $ctor:ident($name:literal $(, $arg:expr)*)),* $(,)?) => {
        /// Identifier of a register in the catalog
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[allow(missing_docs)]
        pub enum RegisterId
        {
            $($variant,)*
        }

        static REGISTER_INFOS: &[RegisterInfo] = &[
            $($ctor(RegisterId::$variant, $name $(, $arg)*),)*
        ];
    };
}

register_catalog! {
    Rax => gpr64("rax", 0, gpr!(rax)),
    Rdx => gpr64("rdx", 1, gpr!(rdx)),
    Rcx => gpr64("rcx", 2, gpr!(rcx)),
    Rbx => gpr64("rbx", 3, gpr!(rbx)),
    Rsi => gpr64("rsi", 4, gpr!(rsi)),
    Rdi => gpr64("rdi", 5, gpr!(rdi)),
    Rbp => gpr64("rbp", 6, gpr!(rbp)),
    Rsp => gpr64("rsp", 7, gpr!(rsp)),
    R8 => gpr64("r8", 8, gpr!(r8)),
    R9 => gpr64("r9", 9, gpr!(r9)),
    R10 => gpr64("r10", 10, gpr!(r10)),
    R11 => gpr64("r11", 11, gpr!(r11)),
    R12 => gpr64("r12", 12, gpr!(r12)),
    R13 => gpr64("r13", 13, gpr!(r13)),
    R14 => gpr64("r14", 14, gpr!(r14)),
    R15 => gpr64("r15", 15, gpr!(r15)),
    Rip => gpr64("rip", 16, gpr!(rip)),
    Eflags => gpr64("eflags", 49, gpr!(eflags)),
    Cs => gpr64("cs", 51, gpr!(cs)),
    Fs => gpr64("fs", 54, gpr!(fs)),
    Gs => gpr64("gs", 55, gpr!(gs)),
    Ss => gpr64("ss", 52, gpr!(ss)),
    Ds => gpr64("ds", 53, gpr!(ds)),
    Es => gpr64("es", 50, gpr!(es)),
    OrigRax => gpr64("orig_rax", -1, gpr!(orig_rax)),
    FsBase => gpr64("fs_base", 58, gpr!(fs_base)),
    GsBase => gpr64("gs_base", 59, gpr!(gs_base)),

    Eax => gpr32("eax", gpr!(rax)),
    Edx => gpr32("edx", gpr!(rdx)),
    Ecx => gpr32("ecx", gpr!(rcx)),
    Ebx => gpr32("ebx", gpr!(rbx)),
    Esi => gpr32("esi", gpr!(rsi)),
    Edi => gpr32("edi", gpr!(rdi)),
    Ebp => gpr32("ebp", gpr!(rbp)),
    Esp => gpr32("esp", gpr!(rsp)),
    R8d => gpr32("r8d", gpr!(r8)),
    R9d => gpr32("r9d", gpr!(r9)),
    R10d => gpr32("r10d", gpr!(r10)),
    R11d => gpr32("r11d", gpr!(r11)),
    R12d => gpr32("r12d", gpr!(r12)),
    R13d => gpr32("r13d", gpr!(r13)),
    R14d => gpr32("r14d", gpr!(r14)),
    R15d => gpr32("r15d", gpr!(r15)),

    Ax => gpr16("ax", gpr!(rax)),
    Dx => gpr16("dx", gpr!(rdx)),
    Cx => gpr16("cx", gpr!(rcx)),
    Bx => gpr16("bx", gpr!(rbx)),
    Si => gpr16("si", gpr!(rsi)),
    Di => gpr16("di", gpr!(rdi)),
    Bp => gpr16("bp", gpr!(rbp)),
    Sp => gpr16("sp", gpr!(rsp)),
    R8w => gpr16("r8w", gpr!(r8)),
    R9w => gpr16("r9w", gpr!(r9)),
    R10w => gpr16("r10w", gpr!(r10)),
    R11w => gpr16("r11w", gpr!(r11)),
    R12w => gpr16("r12w", gpr!(r12)),
    R13w => gpr16("r13w", gpr!(r13)),
    R14w => gpr16("r14w", gpr!(r14)),
    R15w => gpr16("r15w", gpr!(r15)),

    Ah => gpr8h("ah", gpr!(rax)),
    Dh => gpr8h("dh", gpr!(rdx)),
    Ch => gpr8h("ch", gpr!(rcx)),
    Bh => gpr8h("bh", gpr!(rbx)),

    Al => gpr8l("al", gpr!(rax)),
    Dl => gpr8l("dl", gpr!(rdx)),
    Cl => gpr8l("cl", gpr!(rcx)),
    Bl => gpr8l("bl", gpr!(rbx)),
    Sil => gpr8l("sil", gpr!(rsi)),
    Dil => gpr8l("dil", gpr!(rdi)),
    Bpl => gpr8l("bpl", gpr!(rbp)),
    Spl => gpr8l("spl", gpr!(rsp)),
    R8b => gpr8l("r8b", gpr!(r8)),
    R9b => gpr8l("r9b", gpr!(r9)),
    R10b => gpr8l("r10b", gpr!(r10)),
    R11b => gpr8l("r11b", gpr!(r11)),
    R12b => gpr8l("r12b", gpr!(r12)),
    R13b => gpr8l("r13b", gpr!(r13)),
    R14b => gpr8l("r14b", gpr!(r14)),
    R15b => gpr8l("r15b", gpr!(r15)),

    Fcw => fpr_control("fcw", 65, 2, fpr!(cwd)),
    Fsw => fpr_control("fsw", 66, 2, fpr!(swd)),
    Ftw => fpr_control("ftw", -1, 2, fpr!(ftw)),
    Fop => fpr_control("fop", -1, 2, fpr!(fop)),
    Frip => fpr_control("frip", -1, 8, fpr!(rip)),
    Frdp => fpr_control("frdp", -1, 8, fpr!(rdp)),
    Mxcsr => fpr_control("mxcsr", 64, 4, fpr!(mxcsr)),
    Mxcsrmask => fpr_control("mxcsrmask", -1, 4, fpr!(mxcr_mask)),

    St0 => fp_st("st0", 0),
    St1 => fp_st("st1", 1),
    St2 => fp_st("st2", 2),
    St3 => fp_st("st3", 3),
    St4 => fp_st("st4", 4),
    St5 => fp_st("st5", 5),
    St6 => fp_st("st6", 6),
    St7 => fp_st("st7", 7),

    Mm0 => fp_mm("mm0", 0),
    Mm1 => fp_mm("mm1", 1),
    Mm2 => fp_mm("mm2", 2),
    Mm3 => fp_mm("mm3", 3),
    Mm4 => fp_mm("mm4", 4),
    Mm5 => fp_mm("mm5", 5),
    Mm6 => fp_mm("mm6", 6),
    Mm7 => fp_mm("mm7", 7),

    Xmm0 => fp_xmm("xmm0", 0),
    Xmm1 => fp_xmm("xmm1", 1),
    Xmm2 => fp_xmm("xmm2", 2),
    Xmm3 => fp_xmm("xmm3", 3),
    Xmm4 => fp_xmm("xmm4", 4),
    Xmm5 => fp_xmm("xmm5", 5),
    Xmm6 => fp_xmm("xmm6", 6),
    Xmm7 => fp_xmm("xmm7", 7),
    Xmm8 => fp_xmm("xmm8", 8),
    Xmm9 => fp_xmm("xmm9", 9),
    Xmm10 => fp_xmm("xmm10", 10),
    Xmm11 => fp_xmm("xmm11", 11),
    Xmm12 => fp_xmm("xmm12", 12),
    Xmm13 => fp_xmm("xmm13", 13),
    Xmm14 => fp_xmm("xmm14", 14),
    Xmm15 => fp_xmm("xmm15", 15),

    Dr0 => dr("dr0", 0),
    Dr1 => dr("dr1", 1),
    Dr2 => dr("dr2", 2),
    Dr3 => dr("dr3", 3),
    Dr4 => dr("dr4", 4),
    Dr5 => dr("dr5", 5),
    Dr6 => dr("dr6", 6),
    Dr7 => dr("dr7", 7),
}

impl RegisterId
{
    /// The debug register `dr<index>`, for `index` in `0..8`.
    #[must_use]
    pub const fn debug(index: usize) -> Option<Self>
    {
        match index {
            0 => Some(Self::Dr0),
            1 => Some(Self::Dr1),
            2 => Some(Self::Dr2),
            3 => Some(Self::Dr3),
            4 => Some(Self::Dr4),
            5 => Some(Self::Dr5),
            6 => Some(Self::Dr6),
            7 => Some(Self::Dr7),
            _ => None,
        }
    }

    /// Catalog entry for this register.
    #[must_use]
    pub fn info(self) -> &'static RegisterInfo
    {
        register_info_by_id(self)
    }
}

static REGISTERS_BY_NAME: Lazy<HashMap<&'static str, RegisterId>> =
    Lazy::new(|| REGISTER_INFOS.iter().map(|info| (info.name, info.id)).collect());

/// All registers, in catalog order (64-bit GPRs first).
#[must_use]
pub fn register_infos() -> &'static [RegisterInfo]
{
    REGISTER_INFOS
}

/// Look up a register by id. Every id has an entry, so this cannot fail.
#[must_use]
pub fn register_info_by_id(id: RegisterId) -> &'static RegisterInfo
{
    &REGISTER_INFOS[id as usize]
}

/// Look up a register by its canonical name (`"rax"`, `"xmm3"`, `"dr7"`, ...).
///
/// ## Errors
///
/// [`DebuggerError::RegisterNotFound`] if no register has that name.
pub fn register_info_by_name(name: &str) -> Result<&'static RegisterInfo>
{
    REGISTERS_BY_NAME
        .get(name)
        .map(|id| register_info_by_id(*id))
        .ok_or_else(|| DebuggerError::RegisterNotFound(name.to_string()))
}

/// Look up a register by its DWARF register number.
///
/// ## Errors
///
/// [`DebuggerError::RegisterNotFound`] for negative or unknown numbers.
pub fn register_info_by_dwarf(dwarf_id: i32) -> Result<&'static RegisterInfo>
{
    REGISTER_INFOS
        .iter()
        .find(|info| dwarf_id >= 0 && info.dwarf_id == dwarf_id)
        .ok_or_else(|| DebuggerError::RegisterNotFound(format!("dwarf register {dwarf_id}")))
}
