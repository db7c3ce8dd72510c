//! JSON layout documents.
//!
//! A document records the struct name, byte order, totals and the ordered
//! field list. Import rebuilds the field list from types, widths and array
//! lengths, runs it through [StructLayout::compute] and rejects the document
//! if any recorded offset, mask or total disagrees with the recomputed one.

use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    errors::DefinitionError,
    field::{FieldDescriptor, FieldKind, MAX_BITFIELD_WIDTH, Primitive},
    layout::{Endianness, FieldSpec, StructLayout},
};

/// Top-level layout document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDoc {
    pub struct_name: String,
    pub endianness: Endianness,
    pub total_bits: usize,
    pub total_bytes: usize,
    /// Fields in declaration order.
    pub fields: Vec<FieldDoc>,
}

/// One field of a [LayoutDoc].
///
/// Bitfields carry `bit_width` and `mask`; primitives `size` (scalar) or
/// `element_size` and `array_length` (array), plus the `mask` of the whole
/// span; nested structs carry the full `nested` document and an optional
/// `array_length`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub bit_offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_width: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<Box<LayoutDoc>>,
}

impl From<&FieldDescriptor> for FieldDoc {
    fn from(field: &FieldDescriptor) -> Self {
        let mut doc = FieldDoc {
            name: field.name.clone(),
            type_name: field.kind.type_name().to_string(),
            bit_offset: field.bit_offset,
            bit_width: None,
            mask: None,
            size: None,
            element_size: None,
            array_length: field.array_length,
            nested: None,
        };

        match &field.kind {
            FieldKind::Bitfield { width, .. } => {
                doc.bit_width = Some(*width);
                doc.mask = Some(field.mask().to_string());
            }
            FieldKind::Primitive(primitive) => {
                if field.array_length.is_some() {
                    doc.element_size = Some(primitive.bits());
                } else {
                    doc.size = Some(primitive.bits());
                }
                doc.mask = Some(field.mask().to_string());
            }
            FieldKind::Nested(nested) => {
                doc.nested = Some(Box::new(LayoutDoc::from(nested.as_ref())));
            }
        }

        doc
    }
}

impl From<&StructLayout> for LayoutDoc {
    fn from(layout: &StructLayout) -> Self {
        LayoutDoc {
            struct_name: layout.name.clone(),
            endianness: layout.endianness,
            total_bits: layout.total_bits,
            total_bytes: layout.total_bytes(),
            fields: layout.fields.iter().map(FieldDoc::from).collect(),
        }
    }
}

fn invalid(structure: &str, message: impl std::fmt::Display) -> DefinitionError {
    DefinitionError::InvalidDocument(format!("{structure}: {message}"))
}

fn primitive_of(structure: &str, doc: &FieldDoc) -> Result<Primitive, DefinitionError> {
    Primitive::from_name(&doc.type_name).ok_or_else(|| DefinitionError::UnknownType {
        type_name: doc.type_name.clone(),
        field: format!("{structure}.{}", doc.name),
    })
}

impl LayoutDoc {
    /// Rebuilds and validates the layout.
    ///
    /// Nested documents are built first; each one is pushed to `nested_out`
    /// (innermost first) so the caller can register them.
    pub fn build(
        &self,
        nested_out: &mut Vec<Arc<StructLayout>>,
    ) -> Result<Arc<StructLayout>, DefinitionError> {
        let name = &self.struct_name;
        let mut specs = Vec::with_capacity(self.fields.len());
        let mut seen = HashSet::new();

        for doc in &self.fields {
            if !seen.insert(doc.name.as_str()) {
                return Err(invalid(name, format!("duplicate field '{}'", doc.name)));
            }
            if doc.array_length == Some(0) {
                return Err(invalid(name, format!("'{}' has zero array length", doc.name)));
            }

            let kind = if let Some(nested_doc) = &doc.nested {
                if nested_doc.struct_name != doc.type_name {
                    return Err(invalid(
                        name,
                        format!(
                            "'{}' has type '{}' but embeds '{}'",
                            doc.name, doc.type_name, nested_doc.struct_name
                        ),
                    ));
                }
                let nested = nested_doc.build(nested_out)?;
                nested_out.push(nested.clone());
                FieldKind::Nested(nested)
            } else if let Some(width) = doc.bit_width {
                let primitive = primitive_of(name, doc)?;
                if width == 0 || width > MAX_BITFIELD_WIDTH {
                    return Err(invalid(
                        name,
                        format!("'{}' has invalid bit width {width}", doc.name),
                    ));
                }
                if doc.array_length.is_some() {
                    return Err(invalid(name, format!("bitfield '{}' cannot be an array", doc.name)));
                }
                FieldKind::Bitfield { primitive, width }
            } else {
                let primitive = primitive_of(name, doc)?;
                for recorded in [doc.size, doc.element_size].into_iter().flatten() {
                    if recorded != primitive.bits() {
                        return Err(invalid(
                            name,
                            format!(
                                "'{}' records size {recorded}, {primitive} is {} bits",
                                doc.name,
                                primitive.bits()
                            ),
                        ));
                    }
                }
                FieldKind::Primitive(primitive)
            };

            specs.push(FieldSpec {
                name: doc.name.clone(),
                kind,
                array_length: doc.array_length,
            });
        }

        let layout = StructLayout::compute(name.clone(), self.endianness, specs)
            .map_err(|e| invalid(name, e))?;
        self.verify(&layout)?;

        Ok(Arc::new(layout))
    }

    fn verify(&self, layout: &StructLayout) -> Result<(), DefinitionError> {
        let name = &self.struct_name;

        for (doc, field) in self.fields.iter().zip(&layout.fields) {
            if doc.bit_offset != field.bit_offset {
                return Err(invalid(
                    name,
                    format!(
                        "'{}' records offset {}, layout gives {}",
                        doc.name, doc.bit_offset, field.bit_offset
                    ),
                ));
            }

            if let Some(mask) = &doc.mask {
                if !field.mask().matches_hex(mask) {
                    return Err(invalid(
                        name,
                        format!("'{}' records mask {mask}, layout gives {}", doc.name, field.mask()),
                    ));
                }
            }
        }

        if self.total_bits != layout.total_bits || self.total_bytes != layout.total_bytes() {
            return Err(invalid(
                name,
                format!(
                    "records {} bits / {} bytes, layout gives {} / {}",
                    self.total_bits,
                    self.total_bytes,
                    layout.total_bits,
                    layout.total_bytes()
                ),
            ));
        }

        Ok(())
    }
}
