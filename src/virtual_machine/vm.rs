//! Multi-threaded register machine executing bytecode images.
//!
//! A [`Machine`] owns one flat [`Memory`] holding the image body followed by
//! zero padding, the image's address-to-width symbol table, and a registry of
//! [`Thread`]s. Each thread runs its own fetch-decode-execute loop over the
//! shared memory with a private 21-slot register file.
//!
//! # Execution model
//!
//! - Thread 0 starts at the image entry point with `sp = fp = memory size`.
//! - Every instruction is a 2-byte opcode followed by the operands listed in
//!   [`for_each_opcode!`](crate::for_each_opcode).
//! - Arithmetic wraps on u64; compares are unsigned and write `cp`.
//! - Memory-side widths come from the instruction's DataType, else from the
//!   symbol table at the address expression's base, else at the resolved
//!   address, else eight bytes.
//! - Corrupt bytecode, bad memory accesses and division by zero are host
//!   faults: they stop the faulting thread and surface from [`Machine::run`].
//!   Syscall failures are reported to the guest through `er` instead.

mod descriptors;
pub mod error_code;
pub mod memory;
pub mod registers;
mod syscalls;
pub mod thread;


pub use error_code::ErrorCode;
pub use memory::Memory;
pub use registers::{Flag, Registers};
pub use thread::{Thread, ThreadState};

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{OPCODE_SIZE, Opcode};
use crate::virtual_machine::operand::{DataType, Operator, ValueKind};
use crate::virtual_machine::program::Image;
use crate::{debug, error};
use dashmap::DashMap;
use descriptors::Descriptors;
use registers::{FP, register_name};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;

/// Memory size used when none is configured.
pub const DEFAULT_MEMORY_SIZE: usize = 1024;

/// Index of the thread created at load time.
pub const MAIN_THREAD: u64 = 0;

/// Width of absolute addresses, return addresses and offsets in bytecode.
const ADDRESS_WIDTH: usize = 8;

/// Bytes per line in [`Machine::dump_memory`].
const DUMP_LINE: usize = 16;

/// Load-time options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MachineConfig {
    /// Total memory in bytes, image included.
    pub memory_size: usize,
    /// Makes `BRK` a host fault.
    pub debug: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            debug: false,
        }
    }
}

type ThreadHandle = (u64, JoinHandle<Result<(), VMError>>);

/// A loaded program and its threads.
pub struct Machine {
    config: MachineConfig,
    memory: Memory,
    /// Address to element width, from the image header.
    symbol_table: HashMap<u64, DataType>,
    threads: DashMap<u64, Arc<Thread>>,
    next_thread: AtomicU64,
    /// OS threads started by `THREAD_START`, joined by [`run`](Self::run).
    handles: Mutex<Vec<ThreadHandle>>,
    descriptors: Descriptors,
    exit_status: OnceLock<u64>,
}

impl Machine {
    /// Parses `image` and prepares the main thread.
    pub fn load(image: &[u8], config: MachineConfig) -> Result<Arc<Self>, VMError> {
        Self::from_image(Image::from_bytes(image)?, config)
    }

    /// Prepares an already decoded image.
    pub fn from_image(image: Image, config: MachineConfig) -> Result<Arc<Self>, VMError> {
        let symbol_table = image.symbol_table();
        let body_len = image.body.len();
        let memory = Memory::new(image.body, config.memory_size)?;

        let top = memory.len() as u64;
        let mut registers = Registers::new();
        registers.set_ip(image.start);
        registers.set_sp(top);
        registers.set(FP, top)?;

        debug!(
            "loaded image: start={:#x}, {} body byte(s), {} symbol(s), memory {} byte(s)",
            image.start,
            body_len,
            symbol_table.len(),
            top
        );

        let threads = DashMap::new();
        threads.insert(MAIN_THREAD, Arc::new(Thread::new(MAIN_THREAD, registers)));
        Ok(Arc::new(Self {
            config,
            memory,
            symbol_table,
            threads,
            next_thread: AtomicU64::new(MAIN_THREAD + 1),
            handles: Mutex::new(Vec::new()),
            descriptors: Descriptors::new(),
            exit_status: OnceLock::new(),
        }))
    }

    /// Runs the main thread to completion, then waits for every started thread.
    ///
    /// Returns the first host fault. After a guest `EXIT` it returns without
    /// waiting; the status is available from [`exit_status`](Self::exit_status).
    pub fn run(self: &Arc<Self>) -> Result<(), VMError> {
        let main = self
            .thread(MAIN_THREAD)
            .ok_or(VMError::UnknownThread(MAIN_THREAD))?;
        main.mark_started()
            .map_err(|_| VMError::ThreadAlreadyStarted(MAIN_THREAD))?;

        let mut first_error = self.run_thread(&main).err();
        while self.exit_status().is_none() {
            let pending = std::mem::take(&mut *self.lock_handles());
            if pending.is_empty() {
                break;
            }
            for (index, handle) in pending {
                let result = handle
                    .join()
                    .unwrap_or(Err(VMError::ThreadPanicked(index)));
                if let Err(err) = result {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn symbol_table(&self) -> &HashMap<u64, DataType> {
        &self.symbol_table
    }

    /// Status passed to the `EXIT` syscall, if it was called.
    pub fn exit_status(&self) -> Option<u64> {
        self.exit_status.get().copied()
    }

    pub fn thread(&self, index: u64) -> Option<Arc<Thread>> {
        self.threads.get(&index).map(|entry| Arc::clone(entry.value()))
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<ThreadHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run_thread(self: &Arc<Self>, thread: &Arc<Thread>) -> Result<(), VMError> {
        debug!("thread {} running", thread.index());
        let result = {
            let mut registers = thread.lock_registers();
            Cpu::new(self, thread, &mut registers).run()
        };
        thread.mark_finished();

        match &result {
            Ok(()) => debug!("thread {} finished", thread.index()),
            Err(err) => error!("thread {} faulted: {}", thread.index(), err),
        }
        result
    }

    /// Registers a new thread in the `Created` state and returns its index.
    fn spawn_thread(&self, registers: Registers) -> u64 {
        let index = self.next_thread.fetch_add(1, Ordering::Relaxed);
        self.threads
            .insert(index, Arc::new(Thread::new(index, registers)));
        debug!("thread {index} spawned");
        index
    }

    /// Launches a spawned thread on its own OS thread.
    fn start_thread(self: &Arc<Self>, index: u64) -> Result<(), ErrorCode> {
        let thread = self.thread(index).ok_or(ErrorCode::Enothread)?;
        thread.mark_started()?;

        let machine = Arc::clone(self);
        let worker = Arc::clone(&thread);
        let spawned = std::thread::Builder::new()
            .name(format!("vm-thread-{index}"))
            .spawn(move || machine.run_thread(&worker));
        match spawned {
            Ok(handle) => {
                self.lock_handles().push((index, handle));
                Ok(())
            }
            Err(err) => {
                error!("thread {index} could not be started: {err}");
                thread.mark_finished();
                Err(ErrorCode::Efailedcreate)
            }
        }
    }

    /// Records the exit status and stops every thread. The first status wins.
    fn exit(&self, status: u64) {
        let _ = self.exit_status.set(status);
        for entry in self.threads.iter() {
            entry.value().stop();
        }
        debug!("exit with status {status}");
    }

    /// One line per register: name, hex and decimal value.
    ///
    /// Never blocks: a thread still executing (for example one left waiting
    /// in a syscall after `EXIT`) yields [`VMError::ThreadBusy`].
    pub fn dump_registers(&self, index: u64) -> Result<String, VMError> {
        let thread = self.thread(index).ok_or(VMError::UnknownThread(index))?;
        let registers = thread
            .try_lock_registers()
            .ok_or(VMError::ThreadBusy(index))?;
        let mut out = String::new();
        for (i, value) in registers.as_slice().iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>3} = {:#018x} ({})",
                register_name(i as u8),
                value,
                value
            );
        }
        Ok(out)
    }

    /// Hex dump of `[start, end)`, clamped to memory.
    pub fn dump_memory(&self, start: u64, end: u64) -> String {
        let bytes = self.memory.snapshot(start, end);
        let mut out = String::new();
        for (line, chunk) in bytes.chunks(DUMP_LINE).enumerate() {
            let address = start + (line * DUMP_LINE) as u64;
            let _ = write!(out, "{address:08x}:");
            for byte in chunk {
                let _ = write!(out, " {byte:02x}");
            }
            let padding = (DUMP_LINE - chunk.len()) * 3;
            let ascii: String = chunk
                .iter()
                .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                .collect();
            let _ = writeln!(out, "{:padding$}  |{ascii}|", "");
        }
        out
    }
}

/// Resolved address expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Address {
    /// Register value or label address before the offset is applied.
    base: u64,
    /// Final byte address.
    address: u64,
}

/// Register-operand operations of the arithmetic and bitwise families.
#[derive(Clone, Copy, Debug)]
enum BinaryOp {
    Arith(Operator),
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinaryOp {
    /// Returns `None` for division by zero.
    fn apply(self, lhs: u64, rhs: u64) -> Option<u64> {
        let shift = u32::try_from(rhs).unwrap_or(u32::MAX);
        match self {
            BinaryOp::Arith(operator) => operator.apply(lhs, rhs),
            BinaryOp::And => Some(lhs & rhs),
            BinaryOp::Or => Some(lhs | rhs),
            BinaryOp::Xor => Some(lhs ^ rhs),
            BinaryOp::Shl => Some(lhs.checked_shl(shift).unwrap_or(0)),
            BinaryOp::Shr => Some(lhs.checked_shr(shift).unwrap_or(0)),
        }
    }
}

macro_rules! exec_vm {
    (
        cpu = $cpu:ident,
        opcode = $opcode:ident,
        { $( $variant:ident => $handler:ident ( $( $field:ident : $kind:ident ),* $(,)? ) ),* $(,)? }
    ) => {{
        match $opcode {
            $(
                Opcode::$variant => {
                    let instr_name = $opcode.mnemonic();
                    $( let $field = exec_vm!(@read $cpu, $kind)?; )*
                    $cpu.$handler(instr_name, $( $field ),*)
                }
            ),*
        }
    }};

    // 1-byte DataType tag; also sets the width used by `Lit`
    (@read $cpu:ident, Dt) => {{
        $cpu.read_data_type()
    }};

    // 1-byte register index, validated on access
    (@read $cpu:ident, Reg) => {{
        $cpu.read_register_index()
    }};

    // DataType-width big-endian literal
    (@read $cpu:ident, Lit) => {{
        $cpu.read_literal()
    }};

    // 8-byte absolute address
    (@read $cpu:ident, Abs) => {{
        $cpu.read_absolute()
    }};

    // kind tag followed by the expression operands
    (@read $cpu:ident, Aof) => {{
        $cpu.read_address()
    }};
}

/// Generates `_REG_LIT`, `_REG_REG` and optionally `_REG_AOF` handlers for
/// one binary operation.
macro_rules! binary_handlers {
    ( $( $op:expr => $lit:ident, $reg:ident $(, $aof:ident)? ; )* ) => {
        $(
            fn $lit(&mut self, _instr: &'static str, _dt: DataType, rd: u8, value: u64) -> Result<(), VMError> {
                self.binary($op, rd, value)
            }

            fn $reg(&mut self, _instr: &'static str, _dt: DataType, rd: u8, rs: u8) -> Result<(), VMError> {
                let value = self.regs.get(rs)?;
                self.binary($op, rd, value)
            }

            $(
                fn $aof(&mut self, _instr: &'static str, _dt: DataType, rd: u8, src: Address) -> Result<(), VMError> {
                    let value = self.load(src)?;
                    self.binary($op, rd, value)
                }
            )?
        )*
    };
}

/// Generates the literal and register forms of a conditional jump.
macro_rules! jump_handlers {
    ( $( $lit:ident, $reg:ident => |$flag:ident| $taken:expr ; )* ) => {
        $(
            fn $lit(&mut self, _instr: &'static str, target: u64) -> Result<(), VMError> {
                self.jump_if(|$flag| $taken, target);
                Ok(())
            }

            fn $reg(&mut self, _instr: &'static str, rs: u8) -> Result<(), VMError> {
                let target = self.regs.get(rs)?;
                self.jump_if(|$flag| $taken, target);
                Ok(())
            }
        )*
    };
}

/// Execution state of one thread while its loop runs.
struct Cpu<'a> {
    machine: &'a Arc<Machine>,
    thread: &'a Arc<Thread>,
    regs: &'a mut Registers,
    /// DataType operand of the current instruction.
    data_type: DataType,
    /// Address of the current instruction's opcode.
    offset: u64,
}

impl<'a> Cpu<'a> {
    fn new(machine: &'a Arc<Machine>, thread: &'a Arc<Thread>, regs: &'a mut Registers) -> Self {
        Self {
            machine,
            thread,
            regs,
            data_type: DataType::Unset,
            offset: 0,
        }
    }

    fn run(&mut self) -> Result<(), VMError> {
        while self.thread.is_running() {
            self.step()?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), VMError> {
        let offset = self.regs.ip();
        let raw = self.fetch(OPCODE_SIZE)? as u16;
        let opcode = Opcode::try_from(raw).map_err(|_| VMError::InvalidOpcode {
            opcode: raw,
            offset,
        })?;
        self.offset = offset;
        self.data_type = DataType::Unset;
        self.exec(opcode)
    }

    /// Reads `width` bytes at `ip` and advances past them.
    fn fetch(&mut self, width: usize) -> Result<u64, VMError> {
        let ip = self.regs.ip();
        let value = self.machine.memory.read_uint(ip, width)?;
        self.regs.set_ip(ip.wrapping_add(width as u64));
        Ok(value)
    }

    fn read_data_type(&mut self) -> Result<DataType, VMError> {
        let offset = self.regs.ip();
        let tag = self.fetch(1)? as u8;
        let data_type =
            DataType::try_from(tag).map_err(|_| VMError::InvalidDataType { tag, offset })?;
        self.data_type = data_type;
        Ok(data_type)
    }

    fn read_register_index(&mut self) -> Result<u8, VMError> {
        Ok(self.fetch(1)? as u8)
    }

    fn read_literal(&mut self) -> Result<u64, VMError> {
        self.fetch(self.data_type.size())
    }

    fn read_absolute(&mut self) -> Result<u64, VMError> {
        self.fetch(ADDRESS_WIDTH)
    }

    fn read_operator(&mut self) -> Result<Operator, VMError> {
        let offset = self.regs.ip();
        let tag = self.fetch(1)? as u8;
        Operator::try_from(tag).map_err(|_| VMError::InvalidOperator {
            operator: tag,
            offset,
        })
    }

    fn read_register_value(&mut self) -> Result<u64, VMError> {
        let index = self.read_register_index()?;
        self.regs.get(index)
    }

    /// Decodes an address expression: kind tag, base, then operator and
    /// offset for the offset kinds.
    fn read_address(&mut self) -> Result<Address, VMError> {
        let offset = self.regs.ip();
        let tag = self.fetch(1)? as u8;
        let invalid = || VMError::InvalidValueKind { kind: tag, offset };
        let kind = ValueKind::try_from(tag).map_err(|_| invalid())?;

        let (base, displacement) = match kind {
            ValueKind::Number | ValueKind::Identifier => (self.read_absolute()?, None),
            ValueKind::Register => (self.read_register_value()?, None),
            ValueKind::RegisterOffsetNumber => {
                let base = self.read_register_value()?;
                let operator = self.read_operator()?;
                (base, Some((operator, self.read_absolute()?)))
            }
            ValueKind::RegisterOffsetRegister => {
                let base = self.read_register_value()?;
                let operator = self.read_operator()?;
                (base, Some((operator, self.read_register_value()?)))
            }
            ValueKind::LabelOffsetNumber => {
                let base = self.read_absolute()?;
                let operator = self.read_operator()?;
                (base, Some((operator, self.read_absolute()?)))
            }
            ValueKind::LabelOffsetRegister => {
                let base = self.read_absolute()?;
                let operator = self.read_operator()?;
                (base, Some((operator, self.read_register_value()?)))
            }
            ValueKind::String | ValueKind::AddressOf => return Err(invalid()),
        };

        let address = match displacement {
            Some((operator, rhs)) => operator
                .apply(base, rhs)
                .ok_or(VMError::DivisionByZero {
                    offset: self.offset,
                })?,
            None => base,
        };
        Ok(Address { base, address })
    }

    /// Memory-side width of an access through `address`.
    fn width_of(&self, address: Address) -> usize {
        if self.data_type.is_set() {
            return self.data_type.size();
        }
        let table = &self.machine.symbol_table;
        [address.base, address.address]
            .iter()
            .filter_map(|key| table.get(key))
            .find(|data_type| data_type.is_set())
            .map_or(DataType::Qword.size(), DataType::size)
    }

    fn load(&self, address: Address) -> Result<u64, VMError> {
        let width = self.width_of(address);
        self.machine.memory.read_uint(address.address, width)
    }

    fn store(&self, address: Address, value: u64) -> Result<(), VMError> {
        let width = self.width_of(address);
        self.machine.memory.write_uint(address.address, value, width)
    }

    /// `sp -= width`, then writes `value` at `sp`.
    fn push(&mut self, value: u64, width: usize) -> Result<(), VMError> {
        let sp = self.regs.sp().wrapping_sub(width as u64);
        self.machine.memory.write_uint(sp, value, width)?;
        self.regs.set_sp(sp);
        Ok(())
    }

    /// Reads `width` bytes at `sp`, then `sp += width`.
    fn pop(&mut self, width: usize) -> Result<u64, VMError> {
        let sp = self.regs.sp();
        let value = self.machine.memory.read_uint(sp, width)?;
        self.regs.set_sp(sp.wrapping_add(width as u64));
        Ok(value)
    }

    fn binary(&mut self, op: BinaryOp, rd: u8, rhs: u64) -> Result<(), VMError> {
        let lhs = self.regs.get(rd)?;
        let result = op.apply(lhs, rhs).ok_or(VMError::DivisionByZero {
            offset: self.offset,
        })?;
        self.regs.set(rd, result)
    }

    fn compare(&mut self, rd: u8, rhs: u64) -> Result<(), VMError> {
        let lhs = self.regs.get(rd)?;
        self.regs.set_flag(Flag::compare(lhs, rhs));
        Ok(())
    }

    fn jump_if(&mut self, taken: impl Fn(Option<Flag>) -> bool, target: u64) {
        if taken(self.regs.flag()) {
            self.regs.set_ip(target);
        }
    }

    /// Executes a single instruction.
    fn exec(&mut self, opcode: Opcode) -> Result<(), VMError> {
        exec_vm! {
            cpu = self,
            opcode = opcode,
            {
                // Control
                Nop => op_nop(),
                Hlt => op_hlt(),
                Brk => op_brk(),
                Syscall => op_syscall(),
                // Data movement
                MovRegReg => op_mov_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                MovRegLit => op_mov_reg_lit(dt: Dt, rd: Reg, value: Lit),
                MovRegAdr => op_mov_reg_adr(dt: Dt, rd: Reg, address: Lit),
                MovRegAof => op_mov_reg_aof(dt: Dt, rd: Reg, src: Aof),
                MovAofReg => op_mov_aof_reg(dt: Dt, dst: Aof, rs: Reg),
                MovAofLit => op_mov_aof_lit(dt: Dt, dst: Aof, value: Lit),
                // Arithmetic
                AddRegLit => op_add_reg_lit(dt: Dt, rd: Reg, value: Lit),
                AddRegReg => op_add_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                AddRegAof => op_add_reg_aof(dt: Dt, rd: Reg, src: Aof),
                SubRegLit => op_sub_reg_lit(dt: Dt, rd: Reg, value: Lit),
                SubRegReg => op_sub_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                SubRegAof => op_sub_reg_aof(dt: Dt, rd: Reg, src: Aof),
                MulRegLit => op_mul_reg_lit(dt: Dt, rd: Reg, value: Lit),
                MulRegReg => op_mul_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                MulRegAof => op_mul_reg_aof(dt: Dt, rd: Reg, src: Aof),
                DivRegLit => op_div_reg_lit(dt: Dt, rd: Reg, value: Lit),
                DivRegReg => op_div_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                DivRegAof => op_div_reg_aof(dt: Dt, rd: Reg, src: Aof),
                // Bitwise
                AndRegLit => op_and_reg_lit(dt: Dt, rd: Reg, value: Lit),
                AndRegReg => op_and_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                OrRegLit => op_or_reg_lit(dt: Dt, rd: Reg, value: Lit),
                OrRegReg => op_or_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                XorRegLit => op_xor_reg_lit(dt: Dt, rd: Reg, value: Lit),
                XorRegReg => op_xor_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                ShlRegLit => op_shl_reg_lit(dt: Dt, rd: Reg, value: Lit),
                ShlRegReg => op_shl_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                ShrRegLit => op_shr_reg_lit(dt: Dt, rd: Reg, value: Lit),
                ShrRegReg => op_shr_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                // Compare
                CmpRegLit => op_cmp_reg_lit(dt: Dt, rd: Reg, value: Lit),
                CmpRegReg => op_cmp_reg_reg(dt: Dt, rd: Reg, rs: Reg),
                // Jumps
                JmpLit => op_jmp_lit(target: Abs),
                JmpReg => op_jmp_reg(rs: Reg),
                JeqLit => op_jeq_lit(target: Abs),
                JeqReg => op_jeq_reg(rs: Reg),
                JneLit => op_jne_lit(target: Abs),
                JneReg => op_jne_reg(rs: Reg),
                JltLit => op_jlt_lit(target: Abs),
                JltReg => op_jlt_reg(rs: Reg),
                JgtLit => op_jgt_lit(target: Abs),
                JgtReg => op_jgt_reg(rs: Reg),
                JleLit => op_jle_lit(target: Abs),
                JleReg => op_jle_reg(rs: Reg),
                JgeLit => op_jge_lit(target: Abs),
                JgeReg => op_jge_reg(rs: Reg),
                // Stack
                PushLit => op_push_lit(dt: Dt, value: Lit),
                PushReg => op_push_reg(dt: Dt, rs: Reg),
                PushAof => op_push_aof(dt: Dt, src: Aof),
                PopReg => op_pop_reg(dt: Dt, rd: Reg),
                PopAof => op_pop_aof(dt: Dt, dst: Aof),
                // Subroutines
                CallLit => op_call_lit(target: Abs),
                Ret => op_ret(),
            }
        }
    }

    fn op_nop(&mut self, _instr: &'static str) -> Result<(), VMError> {
        Ok(())
    }

    fn op_hlt(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.thread.stop();
        Ok(())
    }

    fn op_brk(&mut self, _instr: &'static str) -> Result<(), VMError> {
        if self.machine.config.debug {
            return Err(VMError::Breakpoint {
                thread: self.thread.index(),
                offset: self.offset,
            });
        }
        Ok(())
    }

    fn op_syscall(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.syscall()
    }

    fn op_mov_reg_reg(&mut self, _instr: &'static str, _dt: DataType, rd: u8, rs: u8) -> Result<(), VMError> {
        let value = self.regs.get(rs)?;
        self.regs.set(rd, value)
    }

    fn op_mov_reg_lit(&mut self, _instr: &'static str, _dt: DataType, rd: u8, value: u64) -> Result<(), VMError> {
        self.regs.set(rd, value)
    }

    fn op_mov_reg_adr(&mut self, _instr: &'static str, _dt: DataType, rd: u8, address: u64) -> Result<(), VMError> {
        self.regs.set(rd, address)
    }

    fn op_mov_reg_aof(&mut self, _instr: &'static str, _dt: DataType, rd: u8, src: Address) -> Result<(), VMError> {
        let value = self.load(src)?;
        self.regs.set(rd, value)
    }

    fn op_mov_aof_reg(&mut self, _instr: &'static str, _dt: DataType, dst: Address, rs: u8) -> Result<(), VMError> {
        let value = self.regs.get(rs)?;
        self.store(dst, value)
    }

    fn op_mov_aof_lit(&mut self, _instr: &'static str, _dt: DataType, dst: Address, value: u64) -> Result<(), VMError> {
        self.store(dst, value)
    }

    binary_handlers! {
        BinaryOp::Arith(Operator::Add) => op_add_reg_lit, op_add_reg_reg, op_add_reg_aof;
        BinaryOp::Arith(Operator::Sub) => op_sub_reg_lit, op_sub_reg_reg, op_sub_reg_aof;
        BinaryOp::Arith(Operator::Mul) => op_mul_reg_lit, op_mul_reg_reg, op_mul_reg_aof;
        BinaryOp::Arith(Operator::Div) => op_div_reg_lit, op_div_reg_reg, op_div_reg_aof;
        BinaryOp::And => op_and_reg_lit, op_and_reg_reg;
        BinaryOp::Or => op_or_reg_lit, op_or_reg_reg;
        BinaryOp::Xor => op_xor_reg_lit, op_xor_reg_reg;
        BinaryOp::Shl => op_shl_reg_lit, op_shl_reg_reg;
        BinaryOp::Shr => op_shr_reg_lit, op_shr_reg_reg;
    }

    fn op_cmp_reg_lit(&mut self, _instr: &'static str, _dt: DataType, rd: u8, value: u64) -> Result<(), VMError> {
        self.compare(rd, value)
    }

    fn op_cmp_reg_reg(&mut self, _instr: &'static str, _dt: DataType, rd: u8, rs: u8) -> Result<(), VMError> {
        let value = self.regs.get(rs)?;
        self.compare(rd, value)
    }

    fn op_jmp_lit(&mut self, _instr: &'static str, target: u64) -> Result<(), VMError> {
        self.regs.set_ip(target);
        Ok(())
    }

    fn op_jmp_reg(&mut self, _instr: &'static str, rs: u8) -> Result<(), VMError> {
        let target = self.regs.get(rs)?;
        self.regs.set_ip(target);
        Ok(())
    }

    jump_handlers! {
        op_jeq_lit, op_jeq_reg => |flag| flag == Some(Flag::Eq);
        op_jne_lit, op_jne_reg => |flag| flag != Some(Flag::Eq);
        op_jlt_lit, op_jlt_reg => |flag| flag == Some(Flag::Lt);
        op_jgt_lit, op_jgt_reg => |flag| flag == Some(Flag::Gt);
        op_jle_lit, op_jle_reg => |flag| matches!(flag, Some(Flag::Eq | Flag::Lt));
        op_jge_lit, op_jge_reg => |flag| matches!(flag, Some(Flag::Eq | Flag::Gt));
    }

    fn op_push_lit(&mut self, _instr: &'static str, dt: DataType, value: u64) -> Result<(), VMError> {
        self.push(value, dt.size())
    }

    fn op_push_reg(&mut self, _instr: &'static str, dt: DataType, rs: u8) -> Result<(), VMError> {
        let value = self.regs.get(rs)?;
        self.push(value, dt.size())
    }

    fn op_push_aof(&mut self, _instr: &'static str, _dt: DataType, src: Address) -> Result<(), VMError> {
        let width = self.width_of(src);
        let value = self.machine.memory.read_uint(src.address, width)?;
        self.push(value, width)
    }

    fn op_pop_reg(&mut self, _instr: &'static str, dt: DataType, rd: u8) -> Result<(), VMError> {
        let value = self.pop(dt.size())?;
        self.regs.set(rd, value)
    }

    fn op_pop_aof(&mut self, _instr: &'static str, _dt: DataType, dst: Address) -> Result<(), VMError> {
        let width = self.width_of(dst);
        let value = self.pop(width)?;
        self.machine.memory.write_uint(dst.address, value, width)
    }

    fn op_call_lit(&mut self, _instr: &'static str, target: u64) -> Result<(), VMError> {
        let return_address = self.regs.ip();
        self.push(return_address, ADDRESS_WIDTH)?;
        self.regs.set_ip(target);
        Ok(())
    }

    fn op_ret(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let return_address = self.pop(ADDRESS_WIDTH)?;
        self.regs.set_ip(return_address);
        Ok(())
    }
}
