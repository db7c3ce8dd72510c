//! Layout engine: assigns bit offsets to an ordered field list.
//!
//! Offsets are counted from the least significant bit of the packed struct,
//! read as one unsigned integer in the layout's [Endianness].
//!
//! - Bitfields are packed densely, with no padding, and may straddle bytes.
//! - A primitive (scalar or array) is aligned to a multiple of its natural width.
//! - A nested struct is aligned to a multiple of its own `total_bits`.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    codec,
    errors::{CodecError, DefinitionError},
    field::{FieldDescriptor, FieldKind},
    value::ValueTree,
};

/// Byte order used when the packed integer is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the target platform.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Name used in JSON documents and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::native()
    }
}

/// A classified field waiting for an offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub array_length: Option<usize>,
}

/// Resolved, immutable layout of one struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub name: String,
    pub endianness: Endianness,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
    pub total_bits: usize,
}

/// Upper bound on `total_bits` of any layout (128 MiB of packed bytes).
pub const MAX_TOTAL_BITS: usize = 1 << 30;

fn align_up(cursor: usize, alignment: usize) -> Option<usize> {
    if alignment == 0 || cursor % alignment == 0 {
        Some(cursor)
    } else {
        cursor.checked_add(alignment - cursor % alignment)
    }
}

impl StructLayout {
    /// Computes offsets for `specs` in order. Same input, same layout.
    ///
    /// Fails with [DefinitionError::LayoutTooLarge] when a field would end
    /// past [MAX_TOTAL_BITS].
    pub fn compute(
        name: impl Into<String>,
        endianness: Endianness,
        specs: Vec<FieldSpec>,
    ) -> Result<Self, DefinitionError> {
        let name = name.into();
        let mut cursor = 0usize;
        let mut fields = Vec::with_capacity(specs.len());

        for spec in specs {
            let element_width = spec.kind.element_width();

            let placed = match &spec.kind {
                FieldKind::Bitfield { .. } => Some(cursor),
                FieldKind::Primitive(primitive) => align_up(cursor, primitive.bits()),
                FieldKind::Nested(nested) => align_up(cursor, nested.total_bits),
            }
            .and_then(|offset| {
                let span = element_width.checked_mul(spec.array_length.unwrap_or(1))?;
                let end = offset.checked_add(span)?;
                (end <= MAX_TOTAL_BITS).then_some((offset, end))
            });

            let Some((bit_offset, end)) = placed else {
                return Err(DefinitionError::LayoutTooLarge {
                    structure: name,
                    field: spec.name,
                });
            };

            let field = FieldDescriptor {
                name: spec.name,
                kind: spec.kind,
                array_length: spec.array_length,
                bit_offset,
            };

            trace!(
                "{name}.{}: offset {bit_offset}, element width {element_width}, span {}",
                field.name,
                end - bit_offset
            );

            cursor = end;
            fields.push(field);
        }

        Ok(Self {
            name,
            endianness,
            fields,
            total_bits: cursor,
        })
    }

    /// Packed size in bytes, `ceil(total_bits / 8)`.
    pub fn total_bytes(&self) -> usize {
        self.total_bits.div_ceil(8)
    }

    /// Finds a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// See [codec::encode].
    pub fn encode(&self, values: &ValueTree) -> Result<Vec<u8>, CodecError> {
        codec::encode(self, values)
    }

    /// See [codec::decode].
    pub fn decode(&self, data: &[u8]) -> Result<ValueTree, CodecError> {
        codec::decode(self, data)
    }
}
