//! Per-family instruction encoders.
//!
//! Every encoder checks arity and operand kinds, then appends
//! `opcode [data type] operands...` to the current section. Operands follow
//! one set of rules across families:
//! - register: 1 byte
//! - number: big-endian, as wide as the instruction's data type
//! - identifier: zeroed placeholder of the same width plus a [`Fixup`]
//! - address-of: kind tag, then the inner value (addresses are always 8 bytes)

use super::Compiler;
use super::symbols::Fixup;
use crate::types::encoding::encode_uint;
use crate::virtual_machine::errors::CompileError;
use crate::virtual_machine::isa::Opcode;
use crate::virtual_machine::operand::{DataType, Section, Value};

/// Width of absolute addresses in jump targets and address expressions.
const ADDRESS_TYPE: DataType = DataType::Qword;

const IMMEDIATE: &str = "Number or Identifier";
const REGISTER: &str = "Register";
const REG_OR_IMMEDIATE: &str = "Register, Number or Identifier";
const REG_IMMEDIATE_OR_ADDRESS: &str = "Register, Number, Identifier or AddressOf";
const REG_OR_ADDRESS: &str = "Register or AddressOf";

/// Opcodes of a two-operand family keyed by the source operand's form.
#[derive(Clone, Copy)]
struct Forms {
    lit: Opcode,
    reg: Opcode,
    aof: Option<Opcode>,
}

const fn forms(lit: Opcode, reg: Opcode, aof: Option<Opcode>) -> Forms {
    Forms { lit, reg, aof }
}

fn arithmetic_forms(mnemonic: &str) -> Option<Forms> {
    use Opcode::*;
    Some(match mnemonic {
        "add" => forms(AddRegLit, AddRegReg, Some(AddRegAof)),
        "sub" => forms(SubRegLit, SubRegReg, Some(SubRegAof)),
        "mul" => forms(MulRegLit, MulRegReg, Some(MulRegAof)),
        "div" => forms(DivRegLit, DivRegReg, Some(DivRegAof)),
        _ => return None,
    })
}

fn bitwise_forms(mnemonic: &str) -> Option<Forms> {
    use Opcode::*;
    Some(match mnemonic {
        "and" => forms(AndRegLit, AndRegReg, None),
        "or" => forms(OrRegLit, OrRegReg, None),
        "xor" => forms(XorRegLit, XorRegReg, None),
        "shl" => forms(ShlRegLit, ShlRegReg, None),
        "shr" => forms(ShrRegLit, ShrRegReg, None),
        "cmp" => forms(CmpRegLit, CmpRegReg, None),
        _ => return None,
    })
}

/// Returns the `(literal, register)` opcodes of a jump mnemonic.
fn jump_forms(mnemonic: &str) -> Option<(Opcode, Opcode)> {
    use Opcode::*;
    Some(match mnemonic {
        "jmp" => (JmpLit, JmpReg),
        "jeq" | "jz" => (JeqLit, JeqReg),
        "jne" | "jnz" => (JneLit, JneReg),
        "jlt" => (JltLit, JltReg),
        "jgt" => (JgtLit, JgtReg),
        "jle" => (JleLit, JleReg),
        "jge" => (JgeLit, JgeReg),
        _ => return None,
    })
}

/// Element width and reserve flag of a data directive.
fn sequence_layout(directive: &str) -> Option<(DataType, bool)> {
    Some(match directive {
        "db" => (DataType::Byte, false),
        "dw" => (DataType::Word, false),
        "dd" => (DataType::Dword, false),
        "dq" => (DataType::Qword, false),
        "resb" => (DataType::Byte, true),
        "resw" => (DataType::Word, true),
        "resd" => (DataType::Dword, true),
        "resq" => (DataType::Qword, true),
        _ => return None,
    })
}

/// Parses an integer literal: decimal, `0x`/`$` hex, `0o` octal or `0b`
/// binary, with an optional leading `-`.
pub(crate) fn parse_number(text: &str) -> Result<i128, CompileError> {
    let invalid = || CompileError::InvalidNumber(text.to_string());
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(hex) = lower.strip_prefix("0x") {
        (16, hex)
    } else if let Some(hex) = lower.strip_prefix('$') {
        (16, hex)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (8, oct)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (2, bin)
    } else {
        (10, lower.as_str())
    };

    let body = body.replace('_', "");
    if body.is_empty() || body.starts_with(['+', '-']) {
        return Err(invalid());
    }
    let magnitude = i128::from_str_radix(&body, radix).map_err(|_| invalid())?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Encodes `value` in `width` bytes as unsigned or two's-complement signed.
///
/// Returns `None` if the value is out of range for both readings.
pub(crate) fn literal_bits(value: i128, width: usize) -> Option<u64> {
    let bits = (width.min(8) * 8) as u32;
    let max = (1i128 << bits) - 1;
    let min = -(1i128 << (bits - 1));
    if value < min || value > max {
        return None;
    }
    let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
    Some(value as u64 & mask)
}

fn expect_arity(instruction: &str, args: &[Value], expected: usize) -> Result<(), CompileError> {
    if args.len() != expected {
        return Err(CompileError::ArityMismatch {
            instruction: instruction.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

fn mismatch(instruction: &str, arg_index: usize, expected: &'static str, actual: &Value) -> CompileError {
    CompileError::TypeMismatch {
        instruction: instruction.to_string(),
        arg_index: arg_index + 1,
        expected,
        actual: actual.type_name(),
    }
}

fn expect_register(instruction: &str, arg_index: usize, value: &Value) -> Result<u8, CompileError> {
    match value {
        Value::Register(index) => Ok(*index),
        other => Err(mismatch(instruction, arg_index, REGISTER, other)),
    }
}

impl Compiler {
    /// Dispatches an instruction statement to its family encoder.
    pub(super) fn encode_instruction(
        &mut self,
        name: &str,
        data_type: DataType,
        args: &[Value],
    ) -> Result<(), CompileError> {
        let mnemonic = name.to_ascii_lowercase();
        let m = mnemonic.as_str();
        match m {
            ".section" | "section" => self.encode_section(m, args),
            "nop" => self.encode_bare(m, Opcode::Nop, args),
            "hlt" => self.encode_bare(m, Opcode::Hlt, args),
            "brk" => self.encode_bare(m, Opcode::Brk, args),
            "syscall" => self.encode_bare(m, Opcode::Syscall, args),
            "ret" => self.encode_bare(m, Opcode::Ret, args),
            "mov" => self.encode_mov(data_type, args),
            "push" => self.encode_push(data_type, args),
            "pop" => self.encode_pop(data_type, args),
            "call" => self.encode_call(args),
            _ => {
                if let Some(forms) = arithmetic_forms(m).or_else(|| bitwise_forms(m)) {
                    self.encode_reg_source(m, forms, data_type, args)
                } else if let Some((lit, reg)) = jump_forms(m) {
                    self.encode_jump(m, lit, reg, args)
                } else {
                    Err(CompileError::UnknownInstruction(name.to_string()))
                }
            }
        }
    }

    fn encode_section(&mut self, instruction: &str, args: &[Value]) -> Result<(), CompileError> {
        expect_arity(instruction, args, 1)?;
        match &args[0] {
            Value::Identifier(name) => {
                self.current = Section::from_name(name)
                    .ok_or_else(|| CompileError::UnknownSection(name.clone()))?;
                Ok(())
            }
            other => Err(mismatch(instruction, 0, "Identifier", other)),
        }
    }

    fn encode_bare(&mut self, instruction: &str, opcode: Opcode, args: &[Value]) -> Result<(), CompileError> {
        expect_arity(instruction, args, 0)?;
        self.emit_opcode(opcode);
        Ok(())
    }

    fn encode_mov(&mut self, data_type: DataType, args: &[Value]) -> Result<(), CompileError> {
        const MOV: &str = "mov";
        expect_arity(MOV, args, 2)?;
        match (&args[0], &args[1]) {
            (Value::Register(rd), Value::Register(rs)) => {
                self.emit_header(Opcode::MovRegReg, data_type);
                self.emit_register(*rd);
                self.emit_register(*rs);
            }
            (Value::Register(rd), number @ Value::Number(_)) => {
                self.emit_header(Opcode::MovRegLit, data_type);
                self.emit_register(*rd);
                self.emit_immediate(MOV, 1, number, data_type)?;
            }
            (Value::Register(rd), label @ Value::Identifier(_)) => {
                self.emit_header(Opcode::MovRegAdr, data_type);
                self.emit_register(*rd);
                self.emit_immediate(MOV, 1, label, data_type)?;
            }
            (Value::Register(rd), Value::AddressOf(inner)) => {
                self.emit_header(Opcode::MovRegAof, data_type);
                self.emit_register(*rd);
                self.emit_address(MOV, 1, inner)?;
            }
            (Value::AddressOf(inner), Value::Register(rs)) => {
                self.emit_header(Opcode::MovAofReg, data_type);
                self.emit_address(MOV, 0, inner)?;
                self.emit_register(*rs);
            }
            (Value::AddressOf(inner), value @ (Value::Number(_) | Value::Identifier(_))) => {
                self.emit_header(Opcode::MovAofLit, data_type);
                self.emit_address(MOV, 0, inner)?;
                self.emit_immediate(MOV, 1, value, data_type)?;
            }
            (Value::Register(_), other) => {
                return Err(mismatch(MOV, 1, REG_IMMEDIATE_OR_ADDRESS, other));
            }
            (Value::AddressOf(_), other) => {
                return Err(mismatch(MOV, 1, REG_OR_IMMEDIATE, other));
            }
            (other, _) => return Err(mismatch(MOV, 0, REG_OR_ADDRESS, other)),
        }
        Ok(())
    }

    /// Encodes `op rd, src` for arithmetic, bitwise and compare mnemonics.
    fn encode_reg_source(
        &mut self,
        instruction: &str,
        forms: Forms,
        data_type: DataType,
        args: &[Value],
    ) -> Result<(), CompileError> {
        expect_arity(instruction, args, 2)?;
        let rd = expect_register(instruction, 0, &args[0])?;
        match (&args[1], forms.aof) {
            (value @ (Value::Number(_) | Value::Identifier(_)), _) => {
                self.emit_header(forms.lit, data_type);
                self.emit_register(rd);
                self.emit_immediate(instruction, 1, value, data_type)?;
            }
            (Value::Register(rs), _) => {
                self.emit_header(forms.reg, data_type);
                self.emit_register(rd);
                self.emit_register(*rs);
            }
            (Value::AddressOf(inner), Some(aof)) => {
                self.emit_header(aof, data_type);
                self.emit_register(rd);
                self.emit_address(instruction, 1, inner)?;
            }
            (other, aof) => {
                let expected = if aof.is_some() {
                    REG_IMMEDIATE_OR_ADDRESS
                } else {
                    REG_OR_IMMEDIATE
                };
                return Err(mismatch(instruction, 1, expected, other));
            }
        }
        Ok(())
    }

    fn encode_jump(
        &mut self,
        instruction: &str,
        lit: Opcode,
        reg: Opcode,
        args: &[Value],
    ) -> Result<(), CompileError> {
        expect_arity(instruction, args, 1)?;
        match &args[0] {
            Value::Register(rs) => {
                self.emit_opcode(reg);
                self.emit_register(*rs);
            }
            target @ (Value::Number(_) | Value::Identifier(_)) => {
                self.emit_opcode(lit);
                self.emit_immediate(instruction, 0, target, ADDRESS_TYPE)?;
            }
            other => return Err(mismatch(instruction, 0, REG_OR_IMMEDIATE, other)),
        }
        Ok(())
    }

    fn encode_push(&mut self, data_type: DataType, args: &[Value]) -> Result<(), CompileError> {
        expect_arity("push", args, 1)?;
        match &args[0] {
            value @ (Value::Number(_) | Value::Identifier(_)) => {
                self.emit_header(Opcode::PushLit, data_type);
                self.emit_immediate("push", 0, value, data_type)?;
            }
            Value::Register(rs) => {
                self.emit_header(Opcode::PushReg, data_type);
                self.emit_register(*rs);
            }
            Value::AddressOf(inner) => {
                self.emit_header(Opcode::PushAof, data_type);
                self.emit_address("push", 0, inner)?;
            }
            other => return Err(mismatch("push", 0, REG_IMMEDIATE_OR_ADDRESS, other)),
        }
        Ok(())
    }

    fn encode_pop(&mut self, data_type: DataType, args: &[Value]) -> Result<(), CompileError> {
        expect_arity("pop", args, 1)?;
        match &args[0] {
            Value::Register(rd) => {
                self.emit_header(Opcode::PopReg, data_type);
                self.emit_register(*rd);
            }
            Value::AddressOf(inner) => {
                self.emit_header(Opcode::PopAof, data_type);
                self.emit_address("pop", 0, inner)?;
            }
            other => return Err(mismatch("pop", 0, REG_OR_ADDRESS, other)),
        }
        Ok(())
    }

    fn encode_call(&mut self, args: &[Value]) -> Result<(), CompileError> {
        expect_arity("call", args, 1)?;
        match &args[0] {
            target @ (Value::Number(_) | Value::Identifier(_)) => {
                self.emit_opcode(Opcode::CallLit);
                self.emit_immediate("call", 0, target, ADDRESS_TYPE)
            }
            other => Err(mismatch("call", 0, IMMEDIATE, other)),
        }
    }

    /// Encodes a data directive and back-fills the preceding label's width.
    pub(super) fn encode_sequence(&mut self, name: &str, values: &[Value]) -> Result<(), CompileError> {
        let directive = name.to_ascii_lowercase();
        let (data_type, reserve) = sequence_layout(&directive)
            .ok_or_else(|| CompileError::UnknownDirective(name.to_string()))?;
        if values.is_empty() {
            return Err(CompileError::ArityMismatch {
                instruction: directive,
                expected: 1,
                actual: 0,
            });
        }

        let width = data_type.size();
        for value in values {
            match (value, reserve) {
                (Value::Number(text), false) => self.emit_number(text, width)?,
                (Value::Str(bytes), false) if data_type == DataType::Byte => {
                    self.emit(bytes);
                }
                (Value::Number(text), true) => {
                    let count = parse_number(text)?;
                    let count = usize::try_from(count)
                        .ok()
                        .and_then(|count| count.checked_mul(width))
                        .ok_or_else(|| CompileError::InvalidNumber(text.clone()))?;
                    let bytes = self.section_bytes_mut();
                    bytes.resize(bytes.len() + count, 0);
                }
                (other, _) => {
                    return Err(CompileError::InvalidSequenceValue {
                        directive,
                        actual: other.type_name(),
                    });
                }
            }
        }

        if let Some(label) = &self.last_label {
            self.symbols.set_data_type(label, data_type);
        }
        Ok(())
    }

    fn emit(&mut self, bytes: &[u8]) {
        self.section_bytes_mut().extend_from_slice(bytes);
    }

    fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit(&opcode.to_bytes());
    }

    /// Opcode followed by the instruction's data type tag.
    fn emit_header(&mut self, opcode: Opcode, data_type: DataType) {
        self.emit_opcode(opcode);
        self.emit(&[data_type as u8]);
    }

    fn emit_register(&mut self, index: u8) {
        self.emit(&[index]);
    }

    fn emit_number(&mut self, text: &str, width: usize) -> Result<(), CompileError> {
        let value = parse_number(text)?;
        let bits = literal_bits(value, width).ok_or_else(|| CompileError::LiteralOutOfRange {
            literal: text.to_string(),
            width,
        })?;
        encode_uint(bits, width, self.section_bytes_mut());
        Ok(())
    }

    /// Emits a zeroed placeholder and records where the label's address goes.
    fn emit_label(&mut self, label: &str, data_type: DataType) {
        let offset = self.section_bytes().len();
        self.fixups.push(Fixup {
            offset,
            section: self.current,
            label: label.to_string(),
            data_type,
        });
        let bytes = self.section_bytes_mut();
        bytes.resize(offset + data_type.size(), 0);
    }

    fn emit_immediate(
        &mut self,
        instruction: &str,
        arg_index: usize,
        value: &Value,
        data_type: DataType,
    ) -> Result<(), CompileError> {
        match value {
            Value::Number(text) => self.emit_number(text, data_type.size()),
            Value::Identifier(label) => {
                self.emit_label(label, data_type);
                Ok(())
            }
            other => Err(mismatch(instruction, arg_index, IMMEDIATE, other)),
        }
    }

    /// Emits the kind tag and payload of the expression inside `[...]`.
    fn emit_address(&mut self, instruction: &str, arg_index: usize, inner: &Value) -> Result<(), CompileError> {
        if matches!(inner, Value::Str(_) | Value::AddressOf(_)) {
            return Err(mismatch(instruction, arg_index, "address expression", inner));
        }
        self.emit(&[inner.kind() as u8]);

        match inner {
            Value::Number(text) => self.emit_number(text, ADDRESS_TYPE.size())?,
            Value::Register(index) => self.emit_register(*index),
            Value::Identifier(label) => self.emit_label(label, ADDRESS_TYPE),
            Value::RegisterOffsetNumber {
                base,
                operator,
                offset,
            } => {
                self.emit_register(*base);
                self.emit(&[*operator as u8]);
                self.emit_number(offset, ADDRESS_TYPE.size())?;
            }
            Value::RegisterOffsetRegister {
                base,
                operator,
                offset,
            } => {
                self.emit_register(*base);
                self.emit(&[*operator as u8]);
                self.emit_register(*offset);
            }
            Value::LabelOffsetNumber {
                label,
                operator,
                offset,
            } => {
                self.emit_label(label, ADDRESS_TYPE);
                self.emit(&[*operator as u8]);
                self.emit_number(offset, ADDRESS_TYPE.size())?;
            }
            Value::LabelOffsetRegister {
                label,
                operator,
                offset,
            } => {
                self.emit_label(label, ADDRESS_TYPE);
                self.emit(&[*operator as u8]);
                self.emit_register(*offset);
            }
            Value::Str(_) | Value::AddressOf(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::operand::{Operator, Statement};

    fn num(text: &str) -> Value {
        Value::Number(text.into())
    }

    fn label(name: &str) -> Value {
        Value::Identifier(name.into())
    }

    fn encode(name: &str, data_type: DataType, args: Vec<Value>) -> Result<Vec<u8>, CompileError> {
        let mut compiler = Compiler::new();
        compiler.compile_statement(&Statement::Instruction {
            name: name.into(),
            data_type,
            args,
        })?;
        Ok(compiler.section_bytes().to_vec())
    }

    #[test]
    fn parse_number_radixes() {
        assert_eq!(parse_number("42").unwrap(), 42);
        assert_eq!(parse_number("-1").unwrap(), -1);
        assert_eq!(parse_number("0x2A").unwrap(), 42);
        assert_eq!(parse_number("$ff").unwrap(), 255);
        assert_eq!(parse_number("0o17").unwrap(), 15);
        assert_eq!(parse_number("0b1010").unwrap(), 10);
        assert_eq!(parse_number("1_000").unwrap(), 1000);
        assert_eq!(parse_number("-0x10").unwrap(), -16);
    }

    #[test]
    fn parse_number_rejects_garbage() {
        for text in ["", "-", "0x", "12ab", "--1", "0b102", "x"] {
            assert_eq!(
                parse_number(text),
                Err(CompileError::InvalidNumber(text.into())),
                "{text}"
            );
        }
    }

    #[test]
    fn literal_bits_ranges() {
        assert_eq!(literal_bits(255, 1), Some(0xFF));
        assert_eq!(literal_bits(-1, 1), Some(0xFF));
        assert_eq!(literal_bits(-128, 1), Some(0x80));
        assert_eq!(literal_bits(256, 1), None);
        assert_eq!(literal_bits(-129, 1), None);
        assert_eq!(literal_bits(-1, 8), Some(u64::MAX));
        assert_eq!(literal_bits(u64::MAX as i128, 8), Some(u64::MAX));
        assert_eq!(literal_bits(u64::MAX as i128 + 1, 8), None);
    }

    #[test]
    fn bare_instructions_are_opcode_only() {
        assert_eq!(encode("hlt", DataType::Unset, vec![]).unwrap(), vec![0, 1]);
        assert_eq!(encode("RET", DataType::Unset, vec![]).unwrap(), vec![0, 54]);
        assert!(matches!(
            encode("nop", DataType::Unset, vec![num("1")]),
            Err(CompileError::ArityMismatch { expected: 0, actual: 1, .. })
        ));
    }

    #[test]
    fn mov_reg_lit_uses_data_type_width() {
        assert_eq!(
            encode("mov", DataType::Word, vec![Value::Register(1), num("0x1234")]).unwrap(),
            vec![0, 5, 2, 1, 0x12, 0x34]
        );
        assert_eq!(
            encode("mov", DataType::Unset, vec![Value::Register(0), num("5")]).unwrap(),
            vec![0, 5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5]
        );
    }

    #[test]
    fn literal_out_of_range_is_rejected() {
        assert_eq!(
            encode("mov", DataType::Byte, vec![Value::Register(0), num("300")]),
            Err(CompileError::LiteralOutOfRange {
                literal: "300".into(),
                width: 1
            })
        );
    }

    #[test]
    fn mov_reg_reg_layout() {
        assert_eq!(
            encode("mov", DataType::Unset, vec![Value::Register(2), Value::Register(3)]).unwrap(),
            vec![0, 4, 0, 2, 3]
        );
    }

    #[test]
    fn mov_aof_reg_with_register_offset() {
        let dst = Value::address_of(Value::RegisterOffsetNumber {
            base: 17,
            operator: Operator::Sub,
            offset: "8".into(),
        });
        assert_eq!(
            encode("mov", DataType::Dword, vec![dst, Value::Register(4)]).unwrap(),
            vec![0, 8, 4, 5, 17, 1, 0, 0, 0, 0, 0, 0, 0, 8, 4]
        );
    }

    #[test]
    fn mov_rejects_memory_to_memory() {
        let a = Value::address_of(Value::Register(0));
        let b = Value::address_of(Value::Register(1));
        assert!(matches!(
            encode("mov", DataType::Unset, vec![a, b]),
            Err(CompileError::TypeMismatch { arg_index: 2, actual: "AddressOf", .. })
        ));
    }

    #[test]
    fn address_of_rejects_strings() {
        let addr = Value::address_of(Value::Str("x".into()));
        assert!(matches!(
            encode("push", DataType::Unset, vec![addr]),
            Err(CompileError::TypeMismatch { actual: "String", .. })
        ));
    }

    #[test]
    fn arithmetic_forms_select_opcode() {
        assert_eq!(
            encode("sub", DataType::Byte, vec![Value::Register(0), num("1")]).unwrap(),
            vec![0, 13, 1, 0, 1]
        );
        assert_eq!(
            encode("div", DataType::Unset, vec![Value::Register(0), Value::Register(1)]).unwrap(),
            vec![0, 20, 0, 0, 1]
        );
        assert_eq!(
            encode("mul", DataType::Unset, vec![Value::Register(0), Value::address_of(Value::Register(2))])
                .unwrap(),
            vec![0, 18, 0, 0, 2, 2]
        );
    }

    #[test]
    fn bitwise_has_no_memory_form() {
        assert!(matches!(
            encode("xor", DataType::Unset, vec![Value::Register(0), Value::address_of(Value::Register(1))]),
            Err(CompileError::TypeMismatch { arg_index: 2, .. })
        ));
    }

    #[test]
    fn cmp_requires_register_first() {
        assert!(matches!(
            encode("cmp", DataType::Unset, vec![num("1"), Value::Register(0)]),
            Err(CompileError::TypeMismatch { arg_index: 1, expected: REGISTER, .. })
        ));
    }

    #[test]
    fn jump_label_records_fixup() {
        let mut compiler = Compiler::new();
        compiler
            .compile_statement(&Statement::instruction("jle", vec![label("done")]))
            .unwrap();
        assert_eq!(compiler.section_bytes(), &[0, 44, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            compiler.fixups,
            vec![Fixup {
                offset: 2,
                section: Section::Text,
                label: "done".into(),
                data_type: DataType::Qword,
            }]
        );
    }

    #[test]
    fn jump_register_form() {
        assert_eq!(
            encode("jmp", DataType::Unset, vec![Value::Register(7)]).unwrap(),
            vec![0, 35, 7]
        );
        assert_eq!(
            encode("jz", DataType::Unset, vec![Value::Register(7)]).unwrap(),
            vec![0, 37, 7]
        );
    }

    #[test]
    fn push_pop_forms() {
        assert_eq!(
            encode("push", DataType::Word, vec![num("7")]).unwrap(),
            vec![0, 48, 2, 0, 7]
        );
        assert_eq!(
            encode("pop", DataType::Byte, vec![Value::Register(3)]).unwrap(),
            vec![0, 51, 1, 3]
        );
        assert!(matches!(
            encode("pop", DataType::Unset, vec![num("1")]),
            Err(CompileError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn call_rejects_register() {
        assert!(matches!(
            encode("call", DataType::Unset, vec![Value::Register(1)]),
            Err(CompileError::TypeMismatch { expected: IMMEDIATE, .. })
        ));
    }

    #[test]
    fn immediate_rejects_non_literal() {
        let mut compiler = Compiler::new();
        assert_eq!(
            compiler.emit_immediate("push", 0, &Value::Register(3), DataType::Unset),
            Err(CompileError::TypeMismatch {
                instruction: "push".into(),
                arg_index: 1,
                expected: IMMEDIATE,
                actual: "Register",
            })
        );
        assert!(compiler.section_bytes().is_empty());
    }

    #[test]
    fn unknown_instruction() {
        assert_eq!(
            encode("frob", DataType::Unset, vec![]),
            Err(CompileError::UnknownInstruction("frob".into()))
        );
    }

    #[test]
    fn unknown_section() {
        assert_eq!(
            encode(".section", DataType::Unset, vec![label("rodata")]),
            Err(CompileError::UnknownSection("rodata".into()))
        );
    }

    #[test]
    fn sequence_values() {
        let mut compiler = Compiler::new();
        compiler
            .compile_statement(&Statement::Sequence {
                name: "db".into(),
                values: vec![Value::Str("hi".into()), num("0")],
            })
            .unwrap();
        compiler
            .compile_statement(&Statement::Sequence {
                name: "dw".into(),
                values: vec![num("0x0102")],
            })
            .unwrap();
        compiler
            .compile_statement(&Statement::Sequence {
                name: "resd".into(),
                values: vec![num("2")],
            })
            .unwrap();
        assert_eq!(
            compiler.section_bytes(),
            &[b'h', b'i', 0, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn sequence_rejects_bad_values() {
        let mut compiler = Compiler::new();
        assert_eq!(
            compiler.compile_statement(&Statement::Sequence {
                name: "dw".into(),
                values: vec![Value::Str("no".into())],
            }),
            Err(CompileError::InvalidSequenceValue {
                directive: "dw".into(),
                actual: "String"
            })
        );
        assert_eq!(
            compiler.compile_statement(&Statement::Sequence {
                name: "dz".into(),
                values: vec![num("1")],
            }),
            Err(CompileError::UnknownDirective("dz".into()))
        );
    }
}
