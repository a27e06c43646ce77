//! Assembler backend: statements in, bytecode image out.
//!
//! Compilation is one forward pass plus one resolution pass:
//! 1. Each [`Statement`] appends bytes to the current section (Text, Data or
//!    Bss). Label references emit a zeroed placeholder and record a [`Fixup`].
//! 2. [`Compiler::finish`] lays the sections out back to back, patches every
//!    placeholder with the label's absolute address, resolves `_start` and
//!    serializes the [`Image`].
//!
//! Any error aborts the whole compilation; no partial image is produced.
//!
//! # Source syntax
//!
//! ```text
//! ; comment
//! .section text
//! _start:
//!     mov x0, 5
//!     mov word [counter], x0
//!     hlt
//! .section data
//! counter: dw 0
//! ```
//!
//! See [`parser`] for the full grammar.

mod encoders;
pub mod parser;
mod symbols;

pub use symbols::{Fixup, SectionBases, Symbol, SymbolTable};

use crate::debug;
use crate::types::encoding::{Encode, fits_in_width, write_uint};
use crate::virtual_machine::errors::CompileError;
use crate::virtual_machine::operand::{Section, Statement};
use crate::virtual_machine::program::{Image, SymbolEntry};
use std::fmt::Write;
use std::fs;
use std::path::Path;

/// Label whose address becomes the image entry point.
pub const ENTRY_LABEL: &str = "_start";

/// Incremental statement compiler.
///
/// Feed statements with [`compile_statement`](Self::compile_statement), then
/// call [`finish`](Self::finish) once.
#[derive(Debug, Default)]
pub struct Compiler {
    /// Emitted bytes per section, indexed by [`Section::index`].
    sections: [Vec<u8>; 3],
    current: Section,
    symbols: SymbolTable,
    fixups: Vec<Fixup>,
    /// Label defined by the most recent statement, if that statement was a label.
    last_label: Option<String>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles one statement into the current section.
    pub fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Label(name) => {
                let offset = self.section_bytes().len() as u64;
                self.symbols.define(name, self.current, offset)?;
                self.last_label = Some(name.clone());
                Ok(())
            }
            Statement::Instruction {
                name,
                data_type,
                args,
            } => {
                self.last_label = None;
                self.encode_instruction(name, *data_type, args)
            }
            Statement::Sequence { name, values } => self.encode_sequence(name, values),
        }
    }

    /// Labels defined so far.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Section statements are currently emitted into.
    pub fn current_section(&self) -> Section {
        self.current
    }

    /// Resolves fixups and returns the serialized image.
    pub fn finish(self) -> Result<Vec<u8>, CompileError> {
        Ok(self.finish_image()?.to_bytes())
    }

    /// Resolves fixups and returns the image before serialization.
    pub fn finish_image(mut self) -> Result<Image, CompileError> {
        let sizes = [
            self.sections[0].len(),
            self.sections[1].len(),
            self.sections[2].len(),
        ];
        let bases = SectionBases::from_sizes(sizes);

        let mut entries = Vec::with_capacity(self.fixups.len());
        for fixup in &self.fixups {
            let symbol = self.symbols.resolve(&fixup.label)?;
            let address = bases.absolute(symbol);
            let width = fixup.data_type.size();
            if !fits_in_width(address, width) {
                return Err(CompileError::AddressOutOfRange {
                    label: fixup.label.clone(),
                    address,
                    width,
                });
            }

            let bytes = &mut self.sections[fixup.section.index()];
            write_uint(address, &mut bytes[fixup.offset..fixup.offset + width]);
            entries.push(SymbolEntry {
                address,
                data_type: symbol.data_type,
            });
        }

        let start = match self.symbols.get(ENTRY_LABEL) {
            Some(symbol) => bases.absolute(symbol),
            None => {
                debug!("no `{ENTRY_LABEL}` label, entry point defaults to 0");
                0
            }
        };

        debug!(
            "assembled text={} data={} bss={} bytes, {} label(s), {} fixup(s)",
            sizes[0],
            sizes[1],
            sizes[2],
            self.symbols.len(),
            self.fixups.len()
        );

        let [text, data, bss] = self.sections;
        let mut body = text;
        body.extend_from_slice(&data);
        body.extend_from_slice(&bss);
        Ok(Image::new(start, entries, body))
    }

    fn section_bytes(&self) -> &[u8] {
        &self.sections[self.current.index()]
    }

    fn section_bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sections[self.current.index()]
    }
}

/// Compiles a statement list into a serialized image.
pub fn compile(statements: &[Statement]) -> Result<Vec<u8>, CompileError> {
    let mut compiler = Compiler::new();
    for statement in statements {
        compiler.compile_statement(statement)?;
    }
    compiler.finish()
}

/// Formats a compiler-style diagnostic for a located error.
pub fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    column: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{column}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(column.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{line:>4} | {line_text}");
        let _ = writeln!(diag, "  | {underline}^");
    }

    diag
}

/// Renders `err` against `source`, falling back to a one-line message for
/// errors without a position.
pub fn render_error(file: &str, source: &str, err: &CompileError) -> String {
    match err.location() {
        Some((line, column)) => {
            render_assembly_diagnostic(file, source, line, column, &err.message())
        }
        None => format!("error: {err}\n --> {file}\n"),
    }
}

fn log_assembly_error(file: &str, source: &str, err: &CompileError) {
    if cfg!(not(test)) {
        eprint!("{}", render_error(file, source, err));
    }
}

/// Parses and compiles assembly source.
pub fn assemble_source(source: &str) -> Result<Vec<u8>, CompileError> {
    assemble_source_with_name(source, "<source>")
}

fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Vec<u8>, CompileError> {
    let result = (|| {
        let mut compiler = Compiler::new();
        for item in parser::parse(source)? {
            compiler
                .compile_statement(&item.statement)
                .map_err(|e| e.at(item.line, item.column))?;
        }
        compiler.finish()
    })();

    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }
    result
}

/// Reads, parses and compiles an assembly file.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, CompileError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| CompileError::Io {
        path: path_ref.display().to_string(),
        message: e.to_string(),
    })?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}
