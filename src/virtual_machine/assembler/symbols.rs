use crate::virtual_machine::errors::CompileError;
use crate::virtual_machine::operand::{DataType, Section};
use crate::warn;
use std::collections::HashMap;

/// A label definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    /// Element width set by the data directive following the label.
    pub data_type: DataType,
    /// Offset within `section` at definition time.
    pub offset: u64,
    pub section: Section,
}

/// A placeholder waiting for a label address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fixup {
    /// Offset of the placeholder within its section's bytes.
    pub offset: usize,
    pub section: Section,
    pub label: String,
    /// Width of the placeholder.
    pub data_type: DataType,
}

/// Label name to [`Symbol`] map built during compilation.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a label at `offset` in `section`.
    pub fn define(&mut self, name: &str, section: Section, offset: u64) -> Result<(), CompileError> {
        if self.symbols.contains_key(name) {
            return Err(CompileError::DuplicateLabel(name.to_string()));
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                name: name.to_string(),
                data_type: DataType::Unset,
                offset,
                section,
            },
        );
        Ok(())
    }

    /// Back-fills the element width of `name`.
    ///
    /// A second directive with a different width replaces the first one and
    /// logs a warning.
    pub fn set_data_type(&mut self, name: &str, data_type: DataType) {
        let Some(symbol) = self.symbols.get_mut(name) else {
            return;
        };
        if symbol.data_type.is_set() && symbol.data_type != data_type {
            warn!(
                "label `{}` redefined from {} to {}",
                name,
                symbol.data_type.keyword(),
                data_type.keyword()
            );
        }
        symbol.data_type = data_type;
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Looks up `name`, failing with [`CompileError::UndefinedLabel`].
    pub fn resolve(&self, name: &str) -> Result<&Symbol, CompileError> {
        self.get(name)
            .ok_or_else(|| CompileError::UndefinedLabel(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Absolute image addresses of the first byte of each section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionBases([u64; 3]);

impl SectionBases {
    /// Computes bases from section sizes in emission order.
    pub fn from_sizes(sizes: [usize; 3]) -> Self {
        let text = 0u64;
        let data = text + sizes[Section::Text.index()] as u64;
        let bss = data + sizes[Section::Data.index()] as u64;
        Self([text, data, bss])
    }

    pub fn base(&self, section: Section) -> u64 {
        self.0[section.index()]
    }

    /// Absolute address of a symbol.
    pub fn absolute(&self, symbol: &Symbol) -> u64 {
        self.base(symbol.section) + symbol.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_resolve() {
        let mut table = SymbolTable::new();
        table.define("loop", Section::Text, 12).unwrap();

        let symbol = table.resolve("loop").unwrap();
        assert_eq!(symbol.offset, 12);
        assert_eq!(symbol.section, Section::Text);
        assert_eq!(symbol.data_type, DataType::Unset);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_label_error() {
        let mut table = SymbolTable::new();
        table.define("a", Section::Text, 0).unwrap();
        assert_eq!(
            table.define("a", Section::Data, 4),
            Err(CompileError::DuplicateLabel("a".into()))
        );
    }

    #[test]
    fn undefined_label_error() {
        let table = SymbolTable::new();
        assert_eq!(
            table.resolve("nowhere"),
            Err(CompileError::UndefinedLabel("nowhere".into()))
        );
    }

    #[test]
    fn data_type_redefinition_keeps_latest() {
        let mut table = SymbolTable::new();
        table.define("v", Section::Data, 0).unwrap();
        table.set_data_type("v", DataType::Word);
        table.set_data_type("v", DataType::Byte);
        assert_eq!(table.resolve("v").unwrap().data_type, DataType::Byte);
    }

    #[test]
    fn section_bases_accumulate() {
        let bases = SectionBases::from_sizes([10, 4, 6]);
        assert_eq!(bases.base(Section::Text), 0);
        assert_eq!(bases.base(Section::Data), 10);
        assert_eq!(bases.base(Section::Bss), 14);

        let symbol = Symbol {
            name: "buf".into(),
            data_type: DataType::Byte,
            offset: 2,
            section: Section::Bss,
        };
        assert_eq!(bases.absolute(&symbol), 16);
    }
}
