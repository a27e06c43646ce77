use crate::virtual_machine::errors::VMError;
use std::cmp::Ordering;

/// Number of registers per thread.
pub const REGISTER_COUNT: usize = 21;

/// First argument and primary result register.
pub const X0: u8 = 0;
pub const X1: u8 = 1;
pub const X2: u8 = 2;
pub const X3: u8 = 3;
/// Holds the syscall index for `SYSCALL`.
pub const X15: u8 = 15;
/// Instruction pointer.
pub const IP: u8 = 16;
/// Frame pointer.
pub const FP: u8 = 17;
/// Stack pointer. The stack grows down from the top of memory.
pub const SP: u8 = 18;
/// Compare flag written by `CMP`.
pub const CP: u8 = 19;
/// Error code of the last failed syscall.
pub const ER: u8 = 20;

/// Register names indexed by register number.
pub const REGISTER_NAMES: [&str; REGISTER_COUNT] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13",
    "x14", "x15", "ip", "fp", "sp", "cp", "er",
];

/// Returns the name of register `index`, or `"?"` if there is none.
pub fn register_name(index: u8) -> &'static str {
    REGISTER_NAMES.get(index as usize).copied().unwrap_or("?")
}

/// Looks a register up by name, ignoring case.
pub fn register_index(name: &str) -> Option<u8> {
    REGISTER_NAMES
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(name))
        .map(|index| index as u8)
}

/// Value stored in `cp` by a compare.
#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    Eq = 0,
    Lt = 1,
    Gt = 2,
}

impl Flag {
    /// Unsigned comparison of `lhs` against `rhs`.
    pub fn compare(lhs: u64, rhs: u64) -> Self {
        match lhs.cmp(&rhs) {
            Ordering::Equal => Flag::Eq,
            Ordering::Less => Flag::Lt,
            Ordering::Greater => Flag::Gt,
        }
    }

    pub fn from_register(value: u64) -> Option<Self> {
        match value {
            0 => Some(Flag::Eq),
            1 => Some(Flag::Lt),
            2 => Some(Flag::Gt),
            _ => None,
        }
    }
}

/// Register file of one thread.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registers {
    regs: [u64; REGISTER_COUNT],
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value in register `idx`.
    ///
    /// Returns [`VMError::InvalidRegisterIndex`] if `idx` is out of bounds.
    pub fn get(&self, idx: u8) -> Result<u64, VMError> {
        self.regs
            .get(idx as usize)
            .copied()
            .ok_or(VMError::InvalidRegisterIndex {
                index: idx,
                available: REGISTER_COUNT,
            })
    }

    /// Stores a value into register `idx`.
    ///
    /// Returns [`VMError::InvalidRegisterIndex`] if `idx` is out of bounds.
    pub fn set(&mut self, idx: u8, value: u64) -> Result<(), VMError> {
        let slot = self
            .regs
            .get_mut(idx as usize)
            .ok_or(VMError::InvalidRegisterIndex {
                index: idx,
                available: REGISTER_COUNT,
            })?;
        *slot = value;
        Ok(())
    }

    // Fixed-index accessors for the special registers; the indices are in range.

    pub fn ip(&self) -> u64 {
        self.regs[IP as usize]
    }

    pub fn set_ip(&mut self, value: u64) {
        self.regs[IP as usize] = value;
    }

    pub fn sp(&self) -> u64 {
        self.regs[SP as usize]
    }

    pub fn set_sp(&mut self, value: u64) {
        self.regs[SP as usize] = value;
    }

    pub fn flag(&self) -> Option<Flag> {
        Flag::from_register(self.regs[CP as usize])
    }

    pub fn set_flag(&mut self, flag: Flag) {
        self.regs[CP as usize] = flag as u64;
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.regs
    }
}
