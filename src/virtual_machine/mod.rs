//! Assembler and register-based bytecode virtual machine.
//!
//! Assembly text is parsed into statements, compiled into a flat bytecode
//! image and executed by a multi-threaded machine with a syscall interface
//! to the host.
//!
//! # Architecture
//!
//! - **Registers**: 21 u64 slots per thread: `x0`..`x15`, `ip`, `fp`, `sp`,
//!   `cp` (compare flag) and `er` (last syscall error)
//! - **Memory**: one flat byte array per machine holding Text, Data and Bss
//!   followed by zero padding; the stack grows down from the top
//! - **Instruction format**: 2-byte big-endian opcode followed by a fixed
//!   operand layout per opcode (DataType, register, literal, address expression)
//! - **Threads**: guest threads run on OS threads and share memory
//!
//! # Modules
//!
//! - [`assembler`]: Source parsing, diagnostics and bytecode generation
//! - [`errors`]: Compile and execution error types
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`operand`]: Statements, operand values and their wire tags
//! - [`program`]: Bytecode image format
//! - [`vm`]: Machine, threads and syscalls

pub mod assembler;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod operand;
pub mod program;
pub mod vm;
