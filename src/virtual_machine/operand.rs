//! Statement and operand model shared by the assembler and the VM.
//!
//! The numeric tags on [`ValueKind`], [`Operator`] and [`DataType`] are part of
//! the bytecode format: the assembler writes them and the VM decodes them.

use crate::virtual_machine::errors::VMError;
use std::fmt;

/// Wire discriminant of a [`Value`].
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Number = 0,
    String = 1,
    Register = 2,
    AddressOf = 3,
    Identifier = 4,
    RegisterOffsetNumber = 5,
    RegisterOffsetRegister = 6,
    LabelOffsetNumber = 7,
    LabelOffsetRegister = 8,
}

impl TryFrom<u8> for ValueKind {
    type Error = VMError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Number,
            1 => Self::String,
            2 => Self::Register,
            3 => Self::AddressOf,
            4 => Self::Identifier,
            5 => Self::RegisterOffsetNumber,
            6 => Self::RegisterOffsetRegister,
            7 => Self::LabelOffsetNumber,
            8 => Self::LabelOffsetRegister,
            _ => {
                return Err(VMError::InvalidValueKind {
                    kind: value,
                    offset: 0,
                });
            }
        })
    }
}

/// Arithmetic operator joining the base and offset of an address expression.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
}

impl Operator {
    pub const fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            _ => None,
        }
    }

    pub const fn symbol(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }

    /// Applies the operator with wrapping u64 semantics.
    ///
    /// Returns `None` for division by zero.
    pub const fn apply(&self, lhs: u64, rhs: u64) -> Option<u64> {
        match self {
            Self::Add => Some(lhs.wrapping_add(rhs)),
            Self::Sub => Some(lhs.wrapping_sub(rhs)),
            Self::Mul => Some(lhs.wrapping_mul(rhs)),
            Self::Div => lhs.checked_div(rhs),
        }
    }
}

impl TryFrom<u8> for Operator {
    type Error = VMError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Add),
            1 => Ok(Self::Sub),
            2 => Ok(Self::Mul),
            3 => Ok(Self::Div),
            _ => Err(VMError::InvalidOperator {
                operator: value,
                offset: 0,
            }),
        }
    }
}

/// Operand width tag.
///
/// `Unset` means "infer from context" and falls back to eight bytes.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataType {
    #[default]
    Unset = 0,
    Byte = 1,
    Word = 2,
    Dword = 4,
    Qword = 8,
}

impl DataType {
    /// Number of bytes an operand of this type occupies.
    pub const fn size(&self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Dword => 4,
            Self::Qword | Self::Unset => 8,
        }
    }

    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Parses an instruction width qualifier (`byte`, `word`, `dword`, `qword`).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "byte" => Some(Self::Byte),
            "word" => Some(Self::Word),
            "dword" => Some(Self::Dword),
            "qword" => Some(Self::Qword),
            _ => None,
        }
    }

    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Byte => "byte",
            Self::Word => "word",
            Self::Dword => "dword",
            Self::Qword => "qword",
        }
    }

    /// Smallest of word, dword and qword that can hold `value`.
    pub const fn smallest_address_width(value: u64) -> Self {
        if value <= u16::MAX as u64 {
            Self::Word
        } else if value <= u32::MAX as u64 {
            Self::Dword
        } else {
            Self::Qword
        }
    }
}

impl TryFrom<u8> for DataType {
    type Error = VMError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unset),
            1 => Ok(Self::Byte),
            2 => Ok(Self::Word),
            4 => Ok(Self::Dword),
            8 => Ok(Self::Qword),
            _ => Err(VMError::InvalidDataType {
                tag: value,
                offset: 0,
            }),
        }
    }
}

/// Output section of the image. Emission order is Text, Data, Bss.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Section {
    #[default]
    Text,
    Data,
    Bss,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Text, Section::Data, Section::Bss];

    pub const fn index(&self) -> usize {
        match self {
            Self::Text => 0,
            Self::Data => 1,
            Self::Bss => 2,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "data" => Some(Self::Data),
            "bss" => Some(Self::Bss),
            _ => None,
        }
    }
}

/// Operand of an instruction or data directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// Integer literal kept as written (`42`, `-1`, `0x2A`, `$2A`, `0b101`).
    Number(String),
    /// String literal bytes with escapes already resolved.
    Str(Vec<u8>),
    /// Register index.
    Register(u8),
    /// Memory dereference `[inner]`.
    AddressOf(Box<Value>),
    /// Label reference.
    Identifier(String),
    RegisterOffsetNumber {
        base: u8,
        operator: Operator,
        offset: String,
    },
    RegisterOffsetRegister {
        base: u8,
        operator: Operator,
        offset: u8,
    },
    LabelOffsetNumber {
        label: String,
        operator: Operator,
        offset: String,
    },
    LabelOffsetRegister {
        label: String,
        operator: Operator,
        offset: u8,
    },
}

impl Value {
    pub const fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Str(_) => ValueKind::String,
            Value::Register(_) => ValueKind::Register,
            Value::AddressOf(_) => ValueKind::AddressOf,
            Value::Identifier(_) => ValueKind::Identifier,
            Value::RegisterOffsetNumber { .. } => ValueKind::RegisterOffsetNumber,
            Value::RegisterOffsetRegister { .. } => ValueKind::RegisterOffsetRegister,
            Value::LabelOffsetNumber { .. } => ValueKind::LabelOffsetNumber,
            Value::LabelOffsetRegister { .. } => ValueKind::LabelOffsetRegister,
        }
    }

    /// Returns a human-readable type name for error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Str(_) => "String",
            Value::Register(_) => "Register",
            Value::AddressOf(_) => "AddressOf",
            Value::Identifier(_) => "Identifier",
            Value::RegisterOffsetNumber { .. } => "RegisterOffsetNumber",
            Value::RegisterOffsetRegister { .. } => "RegisterOffsetRegister",
            Value::LabelOffsetNumber { .. } => "LabelOffsetNumber",
            Value::LabelOffsetRegister { .. } => "LabelOffsetRegister",
        }
    }

    /// Shorthand for `[inner]`.
    pub fn address_of(inner: Value) -> Self {
        Value::AddressOf(Box::new(inner))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::virtual_machine::vm::registers::register_name;
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(bytes) => write!(f, "\"{}\"", bytes.escape_ascii()),
            Value::Register(r) => write!(f, "{}", register_name(*r)),
            Value::AddressOf(inner) => write!(f, "[{inner}]"),
            Value::Identifier(label) => write!(f, "{label}"),
            Value::RegisterOffsetNumber {
                base,
                operator,
                offset,
            } => write!(f, "{} {} {}", register_name(*base), operator.symbol(), offset),
            Value::RegisterOffsetRegister {
                base,
                operator,
                offset,
            } => write!(
                f,
                "{} {} {}",
                register_name(*base),
                operator.symbol(),
                register_name(*offset)
            ),
            Value::LabelOffsetNumber {
                label,
                operator,
                offset,
            } => write!(f, "{} {} {}", label, operator.symbol(), offset),
            Value::LabelOffsetRegister {
                label,
                operator,
                offset,
            } => write!(f, "{} {} {}", label, operator.symbol(), register_name(*offset)),
        }
    }
}

/// One unit of assembler input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    /// `name:`
    Label(String),
    /// Mnemonic with an optional width qualifier and its operands.
    Instruction {
        name: String,
        data_type: DataType,
        args: Vec<Value>,
    },
    /// Data directive (`db`, `dw`, ... `resq`) and its values.
    Sequence { name: String, values: Vec<Value> },
}

impl Statement {
    /// Builds an instruction without a width qualifier.
    pub fn instruction(name: &str, args: Vec<Value>) -> Self {
        Statement::Instruction {
            name: name.to_string(),
            data_type: DataType::Unset,
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_kind_tags_are_stable() {
        let values = [
            (Value::Number("1".into()), 0),
            (Value::Str("s".into()), 1),
            (Value::Register(3), 2),
            (Value::address_of(Value::Register(0)), 3),
            (Value::Identifier("l".into()), 4),
            (
                Value::RegisterOffsetNumber {
                    base: 0,
                    operator: Operator::Add,
                    offset: "1".into(),
                },
                5,
            ),
            (
                Value::RegisterOffsetRegister {
                    base: 0,
                    operator: Operator::Add,
                    offset: 1,
                },
                6,
            ),
            (
                Value::LabelOffsetNumber {
                    label: "l".into(),
                    operator: Operator::Add,
                    offset: "1".into(),
                },
                7,
            ),
            (
                Value::LabelOffsetRegister {
                    label: "l".into(),
                    operator: Operator::Add,
                    offset: 1,
                },
                8,
            ),
        ];
        for (value, tag) in values {
            assert_eq!(value.kind() as u8, tag, "{value:?}");
            assert_eq!(ValueKind::try_from(tag).unwrap(), value.kind());
        }
    }

    #[test]
    fn value_kind_rejects_unknown_tag() {
        assert!(matches!(
            ValueKind::try_from(9),
            Err(VMError::InvalidValueKind { kind: 9, .. })
        ));
    }

    #[test]
    fn operator_apply() {
        assert_eq!(Operator::Add.apply(u64::MAX, 2), Some(1));
        assert_eq!(Operator::Sub.apply(0, 1), Some(u64::MAX));
        assert_eq!(Operator::Mul.apply(6, 7), Some(42));
        assert_eq!(Operator::Div.apply(42, 5), Some(8));
        assert_eq!(Operator::Div.apply(1, 0), None);
    }

    #[test]
    fn operator_symbols_round_trip() {
        for op in [Operator::Add, Operator::Sub, Operator::Mul, Operator::Div] {
            assert_eq!(Operator::from_symbol(op.symbol()), Some(op));
            assert_eq!(Operator::try_from(op as u8).unwrap(), op);
        }
        assert!(Operator::try_from(4).is_err());
    }

    #[test]
    fn data_type_sizes() {
        assert_eq!(DataType::Byte.size(), 1);
        assert_eq!(DataType::Word.size(), 2);
        assert_eq!(DataType::Dword.size(), 4);
        assert_eq!(DataType::Qword.size(), 8);
        assert_eq!(DataType::Unset.size(), 8);
    }

    #[test]
    fn data_type_tags() {
        for tag in [0u8, 1, 2, 4, 8] {
            assert_eq!(DataType::try_from(tag).unwrap() as u8, tag);
        }
        for tag in [3u8, 5, 16, 255] {
            assert!(matches!(
                DataType::try_from(tag),
                Err(VMError::InvalidDataType { tag: t, .. }) if t == tag
            ));
        }
    }

    #[test]
    fn data_type_keywords() {
        assert_eq!(DataType::from_keyword("DWORD"), Some(DataType::Dword));
        assert_eq!(DataType::from_keyword("byte"), Some(DataType::Byte));
        assert_eq!(DataType::from_keyword("db"), None);
    }

    #[test]
    fn smallest_address_width() {
        assert_eq!(DataType::smallest_address_width(0), DataType::Word);
        assert_eq!(DataType::smallest_address_width(0xFFFF), DataType::Word);
        assert_eq!(DataType::smallest_address_width(0x1_0000), DataType::Dword);
        assert_eq!(
            DataType::smallest_address_width(0x1_0000_0000),
            DataType::Qword
        );
    }

    #[test]
    fn section_names() {
        assert_eq!(Section::from_name("text"), Some(Section::Text));
        assert_eq!(Section::from_name(".DATA"), Some(Section::Data));
        assert_eq!(Section::from_name("bss"), Some(Section::Bss));
        assert_eq!(Section::from_name("rodata"), None);
    }

    #[test]
    fn value_display() {
        let value = Value::address_of(Value::RegisterOffsetNumber {
            base: 18,
            operator: Operator::Sub,
            offset: "8".into(),
        });
        assert_eq!(value.to_string(), "[sp - 8]");
    }
}
