//! Wire-level helpers shared across the crate.
//!
//! - [`encoding`]: big-endian integer codec used by the bytecode image and the VM

pub mod encoding;
