//! Assembler and multi-threaded register bytecode virtual machine.
//!
//! Assembly source is compiled by [`virtual_machine::assembler`] into a
//! self-describing image, which [`virtual_machine::vm::Machine`] loads and
//! executes.

pub mod types;
pub mod utils;
pub mod virtual_machine;
