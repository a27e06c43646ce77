use bytevm_derive::Error;

/// Errors raised while turning statements into a bytecode image.
///
/// Any of these aborts the whole compilation; no partial image is produced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    /// Unrecognized instruction mnemonic.
    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),
    /// Wrong number of operands for an instruction.
    #[error("instruction {instruction} expects {expected} argument(s) but got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Operand kind not accepted at this position.
    #[error(
        "instruction {instruction} expected argument {arg_index} to be {expected} but got {actual}"
    )]
    TypeMismatch {
        instruction: String,
        arg_index: usize,
        expected: &'static str,
        actual: &'static str,
    },
    /// `.section` with a name other than text, data or bss.
    #[error("unknown section `{0}`")]
    UnknownSection(String),
    /// Data directive that is not one of db/dw/dd/dq/resb/resw/resd/resq.
    #[error("unknown directive `{0}`")]
    UnknownDirective(String),
    /// Data directive given a value it cannot store.
    #[error("directive {directive} cannot hold a {actual} value")]
    InvalidSequenceValue {
        directive: String,
        actual: &'static str,
    },
    /// Text that does not parse as an integer.
    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),
    /// Integer literal wider than its operand.
    #[error("literal {literal} does not fit in {width} byte(s)")]
    LiteralOutOfRange { literal: String, width: usize },
    /// Resolved label address wider than its placeholder.
    #[error("address {address:#x} of label `{label}` does not fit in {width} byte(s)")]
    AddressOutOfRange {
        label: String,
        address: u64,
        width: usize,
    },
    /// Label defined more than once.
    #[error("duplicate label: {0}")]
    DuplicateLabel(String),
    /// Reference to a label that is never defined.
    #[error("undefined label: {0}")]
    UndefinedLabel(String),
    /// Malformed source text.
    #[error("{line}:{column}: {message}")]
    ParseError {
        line: usize,
        column: usize,
        message: String,
    },
    /// Any other error tied to a source position.
    #[error("{line}:{column}: {source}")]
    Located {
        line: usize,
        column: usize,
        source: Box<CompileError>,
    },
    /// Source file could not be read.
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },
}

impl CompileError {
    /// Returns the 1-based line and column carried by the error, if any.
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            CompileError::ParseError { line, column, .. }
            | CompileError::Located { line, column, .. } => Some((*line, *column)),
            _ => None,
        }
    }

    /// Attaches a source position unless the error already carries one.
    pub fn at(self, line: usize, column: usize) -> Self {
        if self.location().is_some() {
            return self;
        }
        CompileError::Located {
            line,
            column,
            source: Box::new(self),
        }
    }

    /// Returns the message without its location prefix.
    pub fn message(&self) -> String {
        match self {
            CompileError::ParseError { message, .. } => message.clone(),
            CompileError::Located { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors raised while loading an image or executing it.
///
/// These are host faults: the image is corrupt or the guest did something the
/// machine cannot continue from. They stop the faulting thread and surface
/// from [`Machine::run`](super::vm::Machine::run).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VMError {
    /// Unknown opcode encountered in bytecode.
    #[error("invalid opcode {opcode:#06x} at offset {offset:#x}")]
    InvalidOpcode { opcode: u16, offset: u64 },
    /// Unknown value-kind tag in an address expression.
    #[error("invalid value kind {kind} at offset {offset:#x}")]
    InvalidValueKind { kind: u8, offset: u64 },
    /// Unknown operator tag in an address expression.
    #[error("invalid operator {operator} at offset {offset:#x}")]
    InvalidOperator { operator: u8, offset: u64 },
    /// Unknown data type tag.
    #[error("invalid data type {tag} at offset {offset:#x}")]
    InvalidDataType { tag: u8, offset: u64 },
    /// Register index exceeds the register file size.
    #[error("register index {index} out of bounds (available: {available})")]
    InvalidRegisterIndex { index: u8, available: usize },
    /// Memory access outside the machine's buffer.
    #[error("access of {len} byte(s) at {address:#x} is outside memory of {size} byte(s)")]
    MemoryOutOfBounds { address: u64, len: u64, size: usize },
    /// Integer division by zero.
    #[error("division by zero at offset {offset:#x}")]
    DivisionByZero { offset: u64 },
    /// `BRK` executed while the machine runs in debug mode.
    #[error("breakpoint on thread {thread} at offset {offset:#x}")]
    Breakpoint { thread: u64, offset: u64 },
    /// Image shorter than its header claims.
    #[error("bytecode image truncated: needed {needed} byte(s), {available} available")]
    TruncatedImage { needed: usize, available: usize },
    /// Malformed symbol table in the image header.
    #[error("invalid symbol table: {0}")]
    InvalidSymbolTable(String),
    /// Image body does not fit in the requested memory.
    #[error("image body of {size} byte(s) exceeds memory size {memory_size}")]
    ImageTooLarge { size: usize, memory_size: usize },
    /// No thread registered under this index.
    #[error("no thread with index {0}")]
    UnknownThread(u64),
    /// The OS thread running a guest thread panicked.
    #[error("thread {0} panicked")]
    ThreadPanicked(u64),
    /// A thread was asked to run twice.
    #[error("thread {0} already started")]
    ThreadAlreadyStarted(u64),
    /// The thread is still executing, so its registers cannot be read.
    #[error("thread {0} is still running")]
    ThreadBusy(u64),
}
