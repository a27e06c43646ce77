//! Instruction set definition.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical
//! opcode list and hands it to a callback macro, so the enum below, the VM
//! dispatcher and the ISA hash check all read one table.
//!
//! # Bytecode Format
//!
//! Every instruction starts with a 2-byte big-endian opcode, followed by its
//! operands in the listed order:
//! - `Dt`: 1-byte [`DataType`](super::operand::DataType) tag
//! - `Reg`: 1-byte register index
//! - `Lit`: literal as wide as the instruction's data type (8 bytes when unset)
//! - `Abs`: 8-byte absolute address
//! - `Aof`: address expression (1-byte value-kind tag, then its operands)

use crate::virtual_machine::errors::VMError;

/// Size of an encoded opcode in bytes.
pub const OPCODE_SIZE: usize = 2;

/// Invokes a callback macro with the complete opcode list.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Control
            // =========================
            /// NOP ; do nothing
            Nop = 0, "NOP" => [],
            /// HLT ; stop the current thread
            Hlt = 1, "HLT" => [],
            /// BRK ; trap in debug mode, otherwise do nothing
            Brk = 2, "BRK" => [],
            /// SYSCALL ; invoke the host service selected by x15
            Syscall = 3, "SYSCALL" => [],
            // =========================
            // Data movement
            // =========================
            /// MOV rd, rs
            MovRegReg = 4, "MOV_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            /// MOV rd, imm
            MovRegLit = 5, "MOV_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            /// MOV rd, label ; rd = address of label
            MovRegAdr = 6, "MOV_REG_ADR" => [dt: Dt, rd: Reg, address: Lit],
            /// MOV rd, [expr]
            MovRegAof = 7, "MOV_REG_AOF" => [dt: Dt, rd: Reg, src: Aof],
            /// MOV [expr], rs
            MovAofReg = 8, "MOV_AOF_REG" => [dt: Dt, dst: Aof, rs: Reg],
            /// MOV [expr], imm
            MovAofLit = 9, "MOV_AOF_LIT" => [dt: Dt, dst: Aof, value: Lit],
            // =========================
            // Arithmetic
            // =========================
            /// ADD rd, imm
            AddRegLit = 10, "ADD_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            /// ADD rd, rs
            AddRegReg = 11, "ADD_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            /// ADD rd, [expr]
            AddRegAof = 12, "ADD_REG_AOF" => [dt: Dt, rd: Reg, src: Aof],
            /// SUB rd, imm
            SubRegLit = 13, "SUB_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            /// SUB rd, rs
            SubRegReg = 14, "SUB_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            /// SUB rd, [expr]
            SubRegAof = 15, "SUB_REG_AOF" => [dt: Dt, rd: Reg, src: Aof],
            /// MUL rd, imm
            MulRegLit = 16, "MUL_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            /// MUL rd, rs
            MulRegReg = 17, "MUL_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            /// MUL rd, [expr]
            MulRegAof = 18, "MUL_REG_AOF" => [dt: Dt, rd: Reg, src: Aof],
            /// DIV rd, imm ; host fault on division by zero
            DivRegLit = 19, "DIV_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            /// DIV rd, rs
            DivRegReg = 20, "DIV_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            /// DIV rd, [expr]
            DivRegAof = 21, "DIV_REG_AOF" => [dt: Dt, rd: Reg, src: Aof],
            // =========================
            // Bitwise
            // =========================
            AndRegLit = 22, "AND_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            AndRegReg = 23, "AND_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            OrRegLit = 24, "OR_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            OrRegReg = 25, "OR_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            XorRegLit = 26, "XOR_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            XorRegReg = 27, "XOR_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            /// SHL rd, imm ; shifts of 64 or more give 0
            ShlRegLit = 28, "SHL_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            ShlRegReg = 29, "SHL_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            /// SHR rd, imm ; logical shift
            ShrRegLit = 30, "SHR_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            ShrRegReg = 31, "SHR_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            // =========================
            // Compare
            // =========================
            /// CMP rd, imm ; cp = EQ | LT | GT (unsigned)
            CmpRegLit = 32, "CMP_REG_LIT" => [dt: Dt, rd: Reg, value: Lit],
            /// CMP rd, rs
            CmpRegReg = 33, "CMP_REG_REG" => [dt: Dt, rd: Reg, rs: Reg],
            // =========================
            // Jumps
            // =========================
            JmpLit = 34, "JMP_LIT" => [target: Abs],
            JmpReg = 35, "JMP_REG" => [rs: Reg],
            JeqLit = 36, "JEQ_LIT" => [target: Abs],
            JeqReg = 37, "JEQ_REG" => [rs: Reg],
            JneLit = 38, "JNE_LIT" => [target: Abs],
            JneReg = 39, "JNE_REG" => [rs: Reg],
            JltLit = 40, "JLT_LIT" => [target: Abs],
            JltReg = 41, "JLT_REG" => [rs: Reg],
            JgtLit = 42, "JGT_LIT" => [target: Abs],
            JgtReg = 43, "JGT_REG" => [rs: Reg],
            JleLit = 44, "JLE_LIT" => [target: Abs],
            JleReg = 45, "JLE_REG" => [rs: Reg],
            JgeLit = 46, "JGE_LIT" => [target: Abs],
            JgeReg = 47, "JGE_REG" => [rs: Reg],
            // =========================
            // Stack
            // =========================
            /// PUSH imm ; sp -= width, memory[sp..] = imm
            PushLit = 48, "PUSH_LIT" => [dt: Dt, value: Lit],
            PushReg = 49, "PUSH_REG" => [dt: Dt, rs: Reg],
            PushAof = 50, "PUSH_AOF" => [dt: Dt, src: Aof],
            /// POP rd ; rd = memory[sp..sp + width], sp += width
            PopReg = 51, "POP_REG" => [dt: Dt, rd: Reg],
            PopAof = 52, "POP_AOF" => [dt: Dt, dst: Aof],
            // =========================
            // Subroutines
            // =========================
            /// CALL target ; push the return address (8 bytes), jump
            CallLit = 53, "CALL_LIT" => [target: Abs],
            /// RET ; pop 8 bytes into ip
            Ret = 54, "RET" => [],
        }
    };
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        #[repr(u16)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u16> for Opcode {
            type Error = VMError;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(VMError::InvalidOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Opcode {
            /// Every opcode in encoding order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Returns the mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the operand kinds in encoding order.
            pub const fn operands(&self) -> &'static [&'static str] {
                match self {
                    $( Opcode::$name => &[ $( stringify!($kind), )* ], )*
                }
            }

            /// Returns the two big-endian bytes written to the image.
            pub const fn to_bytes(self) -> [u8; 2] {
                (self as u16).to_be_bytes()
            }
        }
    };
}

for_each_opcode!(define_opcodes);
