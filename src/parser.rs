//! [StructParser]: the explicit context that owns a constant table, a struct
//! registry and a symbol table.
//!
//! Independent parsers do not share state. Mutating calls take `&mut self`;
//! to share a parser across threads put it behind one lock. Layouts returned
//! as `Arc<StructLayout>` are immutable and can be used from any thread.

use std::{collections::BTreeMap, sync::Arc};

use log::debug;
use serde::Deserialize;

use crate::{
    codec,
    config::ParserOptions,
    describe,
    errors::{DefinitionError, LookupError, Result},
    field::FieldDescriptor,
    json::LayoutDoc,
    layout::{Endianness, StructLayout},
    lexer::{Lexer, Token},
    preprocess::preprocess,
    registry::Registry,
    scanner::{self, StructDecl},
    symbols::SymbolTable,
    value::ValueTree,
};

/// A field found by [StructParser::get_field_by_path].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedField<'a> {
    pub field: &'a FieldDescriptor,
    /// Offset of the field's first bit from the start of the root struct.
    pub absolute_offset: usize,
}

/// Owns the constant table, the struct registry and the symbol table.
#[derive(Debug, Clone, Default)]
pub struct StructParser {
    options: ParserOptions,
    registry: Registry,
    symbols: SymbolTable,
}

impl StructParser {
    /// Parser using the native byte order and no constants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser producing layouts in the given byte order.
    pub fn with_endianness(endianness: Endianness) -> Self {
        Self::with_options(ParserOptions::new(endianness))
    }

    /// Parser with explicit options, including initial constants.
    pub fn with_options(options: ParserOptions) -> Self {
        Self {
            options,
            registry: Registry::new(),
            symbols: SymbolTable::new(),
        }
    }

    /// Byte order given to newly parsed structs.
    pub fn endianness(&self) -> Endianness {
        self.options.endianness
    }

    /// Adds or replaces constants. Only affects text parsed afterwards.
    pub fn update_definitions<I, S>(&mut self, definitions: I)
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        for (name, value) in definitions {
            let name = name.into();
            debug!("constant {name} = {value}");
            self.options.constants.insert(name, value);
        }
    }

    /// Current constant table.
    pub fn definitions(&self) -> &BTreeMap<String, u64> {
        &self.options.constants
    }

    fn tokens(&self, text: &str) -> Result<Vec<Token>, DefinitionError> {
        let source = preprocess(text, &self.options.constants)?;
        Lexer::new(&source).tokenize()
    }

    fn build(&self, decl: &StructDecl, registry: &Registry) -> Result<Arc<StructLayout>, DefinitionError> {
        let specs = decl.classify(registry)?;
        let layout = StructLayout::compute(decl.name.clone(), self.options.endianness, specs)?;
        Ok(Arc::new(layout))
    }

    /// Parses exactly one `typedef struct { ... } name;` and registers it.
    ///
    /// On error the registry is unchanged.
    pub fn parse(&mut self, text: &str) -> Result<Arc<StructLayout>> {
        let decl = scanner::scan(&self.tokens(text)?)?;

        let layout = self.build(&decl, &self.registry)?;
        debug!(
            "parsed {} ({} endian, {} bits)",
            layout.name,
            layout.endianness.as_str(),
            layout.total_bits
        );
        self.registry.insert(layout.clone());

        Ok(layout)
    }

    /// Parses consecutive typedefs; later ones may use earlier ones as nested types.
    ///
    /// All or nothing: if any typedef fails, none are registered.
    pub fn parse_all(&mut self, text: &str) -> Result<Vec<Arc<StructLayout>>> {
        let decls = scanner::scan_all(&self.tokens(text)?)?;

        let mut staged = self.registry.clone();
        let mut layouts = Vec::with_capacity(decls.len());
        for decl in &decls {
            let layout = self.build(decl, &staged)?;
            staged.insert(layout.clone());
            layouts.push(layout);
        }

        self.registry = staged;
        Ok(layouts)
    }

    /// Registered layout by struct name.
    pub fn get(&self, name: &str) -> Result<Arc<StructLayout>> {
        Ok(self.registry.lookup(name)?.clone())
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Registered struct names, sorted.
    pub fn struct_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// Field of a registered struct by name.
    pub fn get_field(&self, structure: &str, field: &str) -> Result<&FieldDescriptor> {
        let layout = self.registry.lookup(structure)?;
        layout.field(field).ok_or_else(|| {
            LookupError::Field {
                structure: structure.to_string(),
                field: field.to_string(),
            }
            .into()
        })
    }

    /// Resolves a dotted path such as `"nested.sub_flag"` through nested structs.
    pub fn get_field_by_path(&self, structure: &str, path: &str) -> Result<ResolvedField<'_>> {
        let mut layout = self.registry.lookup(structure)?.as_ref();
        let mut base = 0;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let field = layout.field(segment).ok_or_else(|| LookupError::Field {
                structure: layout.name.clone(),
                field: segment.to_string(),
            })?;

            if segments.peek().is_none() {
                return Ok(ResolvedField {
                    field,
                    absolute_offset: base + field.bit_offset,
                });
            }

            layout = field.nested().map(Arc::as_ref).ok_or_else(|| LookupError::Field {
                structure: field.kind.type_name().to_string(),
                field: segments.peek().copied().unwrap_or_default().to_string(),
            })?;
            base += field.bit_offset;
        }

        // `split` always yields at least one segment.
        Err(LookupError::Field {
            structure: structure.to_string(),
            field: path.to_string(),
        }
        .into())
    }

    /// Packs `values` with the layout registered as `structure`.
    pub fn encode(&self, structure: &str, values: &ValueTree) -> Result<Vec<u8>> {
        let layout = self.registry.lookup(structure)?;
        Ok(codec::encode(layout, values)?)
    }

    /// Unpacks `data` with the layout registered as `structure`.
    pub fn decode(&self, structure: &str, data: &[u8]) -> Result<ValueTree> {
        let layout = self.registry.lookup(structure)?;
        Ok(codec::decode(layout, data)?)
    }

    /// Like [StructParser::encode], rendered as lowercase hex.
    pub fn encode_hex(&self, structure: &str, values: &ValueTree) -> Result<String> {
        let layout = self.registry.lookup(structure)?;
        Ok(codec::encode_hex(layout, values)?)
    }

    /// Like [StructParser::decode], from hex with or without `0x`.
    pub fn decode_hex(&self, structure: &str, text: &str) -> Result<ValueTree> {
        let layout = self.registry.lookup(structure)?;
        Ok(codec::decode_hex(layout, text)?)
    }

    /// Field-by-field dump of `data`, including associated symbols.
    pub fn describe(&self, structure: &str, data: &[u8]) -> Result<String> {
        let layout = self.registry.lookup(structure)?;
        Ok(describe::describe(layout, data, &self.symbols)?)
    }

    /// Layout document of `structure`, nested structs embedded.
    pub fn to_json(&self, structure: &str) -> Result<serde_json::Value> {
        let layout = self.registry.lookup(structure)?;
        serde_json::to_value(LayoutDoc::from(layout.as_ref()))
            .map_err(|e| DefinitionError::InvalidDocument(e.to_string()).into())
    }

    /// Pretty-printed [StructParser::to_json].
    pub fn to_json_string(&self, structure: &str) -> Result<String> {
        let layout = self.registry.lookup(structure)?;
        serde_json::to_string_pretty(&LayoutDoc::from(layout.as_ref()))
            .map_err(|e| DefinitionError::InvalidDocument(e.to_string()).into())
    }

    /// Registers a layout from a JSON document after checking it against a
    /// recomputed layout. Embedded nested structs are registered too, unless
    /// their name is already taken.
    pub fn import_from_json(&mut self, doc: &serde_json::Value) -> Result<Arc<StructLayout>> {
        let doc = LayoutDoc::deserialize(doc)
            .map_err(|e| DefinitionError::InvalidDocument(e.to_string()))?;
        self.import_doc(&doc)
    }

    /// Like [StructParser::import_from_json], from JSON text.
    pub fn import_from_json_str(&mut self, text: &str) -> Result<Arc<StructLayout>> {
        let doc: LayoutDoc = serde_json::from_str(text)
            .map_err(|e| DefinitionError::InvalidDocument(e.to_string()))?;
        self.import_doc(&doc)
    }

    fn import_doc(&mut self, doc: &LayoutDoc) -> Result<Arc<StructLayout>> {
        let mut nested = Vec::new();
        let layout = doc.build(&mut nested)?;

        for inner in nested {
            if !self.registry.contains(&inner.name) {
                self.registry.insert(inner);
            }
        }
        self.registry.insert(layout.clone());

        Ok(layout)
    }

    /// Attaches `{value -> label}` to `structure.field`, merging with earlier labels.
    pub fn associate_field_symbols<I, S>(&mut self, structure: &str, field: &str, labels: I)
    where
        I: IntoIterator<Item = (u64, S)>,
        S: Into<String>,
    {
        self.symbols.associate(structure, field, labels);
    }

    /// Label associated with `value` of `structure.field`.
    pub fn get_symbol(&self, structure: &str, field: &str, value: u64) -> Result<&str> {
        Ok(self.symbols.get(structure, field, value)?)
    }

    /// All labels associated with `structure.field`.
    pub fn field_symbols(&self, structure: &str, field: &str) -> Option<&BTreeMap<u64, String>> {
        self.symbols.field_symbols(structure, field)
    }
}
