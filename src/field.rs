//! Field model: the fixed primitive vocabulary, resolved field kinds and masks.

use std::{fmt, sync::Arc};

use crate::layout::StructLayout;

/// Widest bitfield a value element can hold. The declared type only names
/// the field; it does not cap the width.
pub const MAX_BITFIELD_WIDTH: usize = 64;

/// Primitive C types with their natural width in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Char,
    Short,
    Int,
    Long,
}

impl Primitive {
    /// Looks up a primitive by its C type name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "char" => Some(Primitive::Char),
            "short" => Some(Primitive::Short),
            "int" => Some(Primitive::Int),
            "long" => Some(Primitive::Long),
            _ => None,
        }
    }

    /// C type name of the primitive.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
        }
    }

    /// Natural width in bits.
    pub fn bits(self) -> usize {
        match self {
            Primitive::Char => 8,
            Primitive::Short => 16,
            Primitive::Int => 32,
            Primitive::Long => 64,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a field is, resolved once when the struct is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Explicit bit width, packed without alignment.
    Bitfield { primitive: Primitive, width: usize },
    /// Plain primitive, aligned to its natural width.
    Primitive(Primitive),
    /// Another registered struct, aligned to its own total size.
    Nested(Arc<StructLayout>),
}

impl FieldKind {
    /// Width in bits of one element of this kind.
    pub fn element_width(&self) -> usize {
        match self {
            FieldKind::Bitfield { width, .. } => *width,
            FieldKind::Primitive(primitive) => primitive.bits(),
            FieldKind::Nested(layout) => layout.total_bits,
        }
    }

    /// Type name as written in the definition.
    pub fn type_name(&self) -> &str {
        match self {
            FieldKind::Bitfield { primitive, .. } | FieldKind::Primitive(primitive) => {
                primitive.name()
            }
            FieldKind::Nested(layout) => &layout.name,
        }
    }
}

/// A field after layout: kind, optional array length and its bit offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub array_length: Option<usize>,
    /// Offset of the first bit, counted from the least significant bit of the packed struct.
    pub bit_offset: usize,
}

impl FieldDescriptor {
    /// Returns true for `type name : width;` fields.
    pub fn is_bitfield(&self) -> bool {
        matches!(self.kind, FieldKind::Bitfield { .. })
    }

    /// Layout of a nested struct field, if this is one.
    pub fn nested(&self) -> Option<&Arc<StructLayout>> {
        match &self.kind {
            FieldKind::Nested(layout) => Some(layout),
            _ => None,
        }
    }

    /// Width in bits of one element.
    pub fn element_width(&self) -> usize {
        self.kind.element_width()
    }

    /// Number of elements: the array length, or 1 for scalars.
    pub fn count(&self) -> usize {
        self.array_length.unwrap_or(1)
    }

    /// Total bits occupied by the field (all elements).
    pub fn span(&self) -> usize {
        self.element_width() * self.count()
    }

    /// Bit offset of element `index` (0 for scalars).
    pub fn element_offset(&self, index: usize) -> usize {
        self.bit_offset + index * self.element_width()
    }

    /// Mask covering the whole field.
    pub fn mask(&self) -> Mask {
        Mask::new(self.bit_offset, self.span())
    }

    /// Mask of element `index`.
    pub fn element_mask(&self, index: usize) -> Mask {
        Mask::new(self.element_offset(index), self.element_width())
    }
}

/// A contiguous run of `width` set bits starting at bit `offset`.
///
/// Layouts can be wider than any native integer, so the mask is kept
/// symbolic and rendered as hex on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mask {
    pub offset: usize,
    pub width: usize,
}

impl Mask {
    /// Mask of `width` bits starting at bit `offset`.
    pub fn new(offset: usize, width: usize) -> Self {
        Mask { offset, width }
    }

    /// The mask as an integer, if it fits in 128 bits.
    pub fn to_u128(&self) -> Option<u128> {
        let end = self.offset.checked_add(self.width)?;
        if end > 128 {
            return None;
        }
        if self.width == 0 {
            return Some(0);
        }

        let ones = if self.width == 128 {
            u128::MAX
        } else {
            (1u128 << self.width) - 1
        };
        Some(ones << self.offset)
    }

    fn bit(&self, index: usize) -> bool {
        index >= self.offset && index < self.offset + self.width
    }

    /// True if `text` is a hex rendering of this mask (prefix, case and
    /// leading zeros are ignored).
    pub fn matches_hex(&self, text: &str) -> bool {
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }

        let trimmed = digits.trim_start_matches('0').to_ascii_lowercase();
        let rendered = self.to_string();
        let expected = rendered[2..].trim_start_matches('0');

        trimmed == expected
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        if self.width == 0 {
            return f.write_str("0");
        }

        let nibbles = (self.offset + self.width).div_ceil(4);
        for n in (0..nibbles).rev() {
            let mut nibble = 0u32;
            for b in 0..4 {
                if self.bit(n * 4 + b) {
                    nibble |= 1 << b;
                }
            }
            // Cannot fail: nibble < 16.
            let digit = std::char::from_digit(nibble, 16).unwrap_or('0');
            write!(f, "{digit}")?;
        }

        Ok(())
    }
}
