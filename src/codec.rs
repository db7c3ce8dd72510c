//! Encode value trees into packed bytes and decode them back.
//!
//! Every element contributes `(raw & element_mask) << element_offset` to one
//! unsigned integer, serialized to exactly `total_bytes` bytes in the layout's
//! byte order. Values wider than their field are truncated by the mask; this
//! is part of the contract, not an error.
//!
//! Nested structs are written into the parent's image at the nested field's
//! offset, so the parent's byte order governs the whole buffer.

use log::{debug, trace};

use crate::{
    bits,
    errors::CodecError,
    field::{FieldDescriptor, FieldKind},
    layout::StructLayout,
    value::{Value, ValueTree},
};

fn child_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> CodecError {
    CodecError::InvalidValue {
        field: path.to_string(),
        reason: reason.into(),
    }
}

fn expect_int(value: &Value, path: &str) -> Result<u64, CodecError> {
    value
        .as_u64()
        .ok_or_else(|| invalid(path, "expected an integer"))
}

fn expect_struct<'v>(value: &'v Value, path: &str) -> Result<&'v ValueTree, CodecError> {
    value
        .as_struct()
        .ok_or_else(|| invalid(path, "expected a struct"))
}

fn expect_array<'v>(
    value: &'v Value,
    field: &FieldDescriptor,
    path: &str,
) -> Result<&'v [Value], CodecError> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(path, "expected an array"))?;

    let length = field.count();
    if items.len() > length {
        return Err(invalid(
            path,
            format!("{} elements exceed array length {length}", items.len()),
        ));
    }

    Ok(items)
}

fn write_element(image: &mut [u8], bit_pos: usize, width: usize, raw: u64, path: &str) {
    let masked = raw & bits::low_mask(width);
    if masked != raw {
        trace!("{path}: value {raw:#x} truncated to {width} bits");
    }
    bits::write_bits_at(image, bit_pos, width, masked);
}

fn encode_into(
    image: &mut [u8],
    base: usize,
    layout: &StructLayout,
    values: &ValueTree,
    path: &str,
) -> Result<(), CodecError> {
    for key in values.keys() {
        if layout.field(key).is_none() {
            debug!("{}: ignoring unknown field '{key}'", layout.name);
        }
    }

    for field in &layout.fields {
        let Some(value) = values.get(&field.name) else {
            continue;
        };
        let path = child_path(path, &field.name);

        match (&field.kind, field.array_length) {
            (FieldKind::Nested(nested), None) => {
                let tree = expect_struct(value, &path)?;
                encode_into(image, base + field.bit_offset, nested, tree, &path)?;
            }
            (FieldKind::Nested(nested), Some(_)) => {
                for (i, item) in expect_array(value, field, &path)?.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    let tree = expect_struct(item, &item_path)?;
                    encode_into(image, base + field.element_offset(i), nested, tree, &item_path)?;
                }
            }
            (_, None) => {
                let raw = expect_int(value, &path)?;
                write_element(image, base + field.bit_offset, field.element_width(), raw, &path);
            }
            (_, Some(_)) => {
                for (i, item) in expect_array(value, field, &path)?.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    let raw = expect_int(item, &item_path)?;
                    let offset = base + field.element_offset(i);
                    write_element(image, offset, field.element_width(), raw, &item_path);
                }
            }
        }
    }

    Ok(())
}

/// Packs `values` into exactly `layout.total_bytes()` bytes.
///
/// Missing fields are zero, short arrays are zero-filled, unknown keys are ignored.
pub fn encode(layout: &StructLayout, values: &ValueTree) -> Result<Vec<u8>, CodecError> {
    let mut image = vec![0u8; layout.total_bytes()];
    encode_into(&mut image, 0, layout, values, "")?;
    Ok(bits::from_image(image, layout.endianness))
}

fn decode_from(image: &[u8], base: usize, layout: &StructLayout) -> ValueTree {
    let mut tree = ValueTree::new();

    for field in &layout.fields {
        let width = field.element_width();

        let value = match (&field.kind, field.array_length) {
            (FieldKind::Nested(nested), None) => {
                Value::Struct(decode_from(image, base + field.bit_offset, nested))
            }
            (FieldKind::Nested(nested), Some(length)) => Value::Array(
                (0..length)
                    .map(|i| Value::Struct(decode_from(image, base + field.element_offset(i), nested)))
                    .collect(),
            ),
            (_, None) => Value::U64(bits::read_bits_at(image, base + field.bit_offset, width)),
            (_, Some(length)) => Value::Array(
                (0..length)
                    .map(|i| {
                        Value::U64(bits::read_bits_at(image, base + field.element_offset(i), width))
                    })
                    .collect(),
            ),
        };

        tree.insert(field.name.clone(), value);
    }

    tree
}

/// Unpacks the first `layout.total_bytes()` bytes of `data`.
pub fn decode(layout: &StructLayout, data: &[u8]) -> Result<ValueTree, CodecError> {
    let expected = layout.total_bytes();
    if data.len() < expected {
        return Err(CodecError::ShortBuffer {
            expected,
            actual: data.len(),
        });
    }

    let image = bits::to_image(&data[..expected], layout.endianness);
    Ok(decode_from(&image, 0, layout))
}

/// [encode], rendered as lowercase hex without prefix.
pub fn encode_hex(layout: &StructLayout, values: &ValueTree) -> Result<String, CodecError> {
    encode(layout, values).map(hex::encode)
}

/// [decode] from a hex string, with or without a `0x` prefix.
pub fn decode_hex(layout: &StructLayout, text: &str) -> Result<ValueTree, CodecError> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    let data = hex::decode(digits).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
    decode(layout, &data)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::{
        field::Primitive,
        layout::{Endianness, FieldSpec},
    };

    fn bitfield(name: &str, primitive: Primitive, width: usize) -> FieldSpec {
        FieldSpec {
            name: name.to_string(),
            kind: FieldKind::Bitfield { primitive, width },
            array_length: None,
        }
    }

    fn plain(name: &str, primitive: Primitive, array_length: Option<usize>) -> FieldSpec {
        FieldSpec {
            name: name.to_string(),
            kind: FieldKind::Primitive(primitive),
            array_length,
        }
    }

    fn nested(name: &str, layout: &Arc<StructLayout>, array_length: Option<usize>) -> FieldSpec {
        FieldSpec {
            name: name.to_string(),
            kind: FieldKind::Nested(layout.clone()),
            array_length,
        }
    }

    fn sub_t(endianness: Endianness) -> Arc<StructLayout> {
        Arc::new(StructLayout::compute(
            "sub_t",
            endianness,
            vec![
                bitfield("sub_flag", Primitive::Int, 2),
                bitfield("sub_value", Primitive::Short, 5),
            ],
        )
        .unwrap())
    }

    fn main_t(endianness: Endianness) -> StructLayout {
        StructLayout::compute(
            "main_t",
            endianness,
            vec![
                bitfield("flag", Primitive::Char, 1),
                bitfield("count", Primitive::Int, 10),
                nested("nested", &sub_t(endianness), None),
                plain("error_code", Primitive::Short, None),
                plain("timestamp", Primitive::Int, None),
            ],
        )
        .unwrap()
    }

    fn header_t(endianness: Endianness) -> StructLayout {
        StructLayout::compute(
            "header_t",
            endianness,
            vec![
                bitfield("msg_type", Primitive::Char, 4),
                bitfield("msg_source", Primitive::Char, 4),
                plain("counter", Primitive::Char, None),
                plain("length", Primitive::Short, None),
            ],
        )
        .unwrap()
    }

    fn array_t(endianness: Endianness) -> StructLayout {
        StructLayout::compute(
            "array_t",
            endianness,
            vec![
                bitfield("kind", Primitive::Char, 3),
                plain("samples", Primitive::Short, Some(3)),
                nested("subs", &sub_t(endianness), Some(2)),
                plain("wide", Primitive::Long, Some(2)),
            ],
        )
        .unwrap()
    }

    fn main_values() -> ValueTree {
        ValueTree::from([
            ("flag".to_string(), Value::U64(1)),
            ("count".to_string(), Value::U64(100)),
            (
                "nested".to_string(),
                Value::Struct(ValueTree::from([
                    ("sub_flag".to_string(), Value::U64(2)),
                    ("sub_value".to_string(), Value::U64(15)),
                ])),
            ),
            ("error_code".to_string(), Value::U64(500)),
            ("timestamp".to_string(), Value::U64(1_616_161_616)),
        ])
    }

    /// Every field at its maximum value: encodes to the set of covered bits.
    fn saturated(layout: &StructLayout) -> ValueTree {
        let mut tree = ValueTree::new();
        for field in &layout.fields {
            let element = match &field.kind {
                FieldKind::Nested(nested) => Value::Struct(saturated(nested)),
                _ => Value::U64(bits::low_mask(field.element_width())),
            };
            let value = match field.array_length {
                Some(length) => Value::Array(vec![element; length]),
                None => element,
            };
            tree.insert(field.name.clone(), value);
        }
        tree
    }

    #[test]
    fn test_main_round_trip() {
        let layout = main_t(Endianness::Little);
        let encoded = encode(&layout, &main_values()).unwrap();
        assert_eq!(encoded.len(), 12);
        assert_eq!(decode(&layout, &encoded).unwrap(), main_values());
    }

    #[test]
    fn test_main_encoding_bytes() {
        // flag=1 | count=100<<1 | nested=(2 | 15<<2)<<14 | 500<<32 | 1616161616<<64
        let layout = main_t(Endianness::Little);
        let encoded = encode(&layout, &main_values()).unwrap();
        let packed: u128 = 1 | (100 << 1) | ((2 | (15 << 2)) << 14) | (500 << 32) | (1_616_161_616 << 64);
        assert_eq!(encoded, packed.to_le_bytes()[..12].to_vec());

        let big = encode(&main_t(Endianness::Big), &main_values()).unwrap();
        assert_eq!(big, packed.to_be_bytes()[4..].to_vec());
    }

    #[test]
    fn test_packet_header_byte_order() {
        let values = ValueTree::from([
            ("msg_type".to_string(), Value::U64(0x3)),
            ("msg_source".to_string(), Value::U64(0x6)),
            ("counter".to_string(), Value::U64(0x78)),
            ("length".to_string(), Value::U64(0xABCD)),
        ]);

        let little = encode(&header_t(Endianness::Little), &values).unwrap();
        assert_eq!(little, vec![0x63, 0x78, 0xcd, 0xab]);

        let big = encode(&header_t(Endianness::Big), &values).unwrap();
        assert_eq!(big, vec![0xab, 0xcd, 0x78, 0x63]);
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let layout = header_t(Endianness::Little);
        let values = ValueTree::from([("msg_type".to_string(), Value::U64(0xF))]);
        assert_eq!(encode(&layout, &values).unwrap(), vec![0x0f, 0, 0, 0]);
    }

    #[test]
    fn test_out_of_range_values_are_masked() {
        let layout = header_t(Endianness::Little);
        let values = ValueTree::from([
            ("msg_type".to_string(), Value::U64(0x1F)),
            ("counter".to_string(), Value::I64(-1)),
        ]);
        let decoded = decode(&layout, &encode(&layout, &values).unwrap()).unwrap();
        assert_eq!(decoded["msg_type"], Value::U64(0xF));
        assert_eq!(decoded["msg_source"], Value::U64(0));
        assert_eq!(decoded["counter"], Value::U64(0xFF));
    }

    #[test]
    fn test_short_array_is_zero_filled() {
        let layout = array_t(Endianness::Little);
        let values = ValueTree::from([("samples".to_string(), Value::from(vec![7u64]))]);
        let decoded = decode(&layout, &encode(&layout, &values).unwrap()).unwrap();
        assert_eq!(decoded["samples"], Value::from(vec![7u64, 0, 0]));
    }

    #[test]
    fn test_arrays_round_trip() {
        let layout = array_t(Endianness::Big);
        let sub = |flag: u64, value: u64| {
            Value::Struct(ValueTree::from([
                ("sub_flag".to_string(), Value::U64(flag)),
                ("sub_value".to_string(), Value::U64(value)),
            ]))
        };
        let values = ValueTree::from([
            ("kind".to_string(), Value::U64(5)),
            ("samples".to_string(), Value::from(vec![1u64, 0xFFFF, 3])),
            ("subs".to_string(), Value::Array(vec![sub(1, 31), sub(3, 0)])),
            ("wide".to_string(), Value::from(vec![u64::MAX, 42])),
        ]);

        let encoded = encode(&layout, &values).unwrap();
        assert_eq!(encoded.len(), layout.total_bytes());
        assert_eq!(decode(&layout, &encoded).unwrap(), values);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let layout = header_t(Endianness::Little);
        let values = ValueTree::from([("bogus".to_string(), Value::U64(1))]);
        assert_eq!(encode(&layout, &values).unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_shape_errors() {
        let layout = main_t(Endianness::Little);

        let values = ValueTree::from([("nested".to_string(), Value::U64(1))]);
        assert_eq!(
            encode(&layout, &values).unwrap_err(),
            CodecError::InvalidValue {
                field: "nested".to_string(),
                reason: "expected a struct".to_string()
            }
        );

        let values = ValueTree::from([("flag".to_string(), Value::from(vec![1u64]))]);
        assert!(matches!(
            encode(&layout, &values).unwrap_err(),
            CodecError::InvalidValue { ref field, .. } if field == "flag"
        ));

        let values = ValueTree::from([(
            "nested".to_string(),
            Value::Struct(ValueTree::from([("sub_flag".to_string(), Value::Array(vec![]))])),
        )]);
        assert!(matches!(
            encode(&layout, &values).unwrap_err(),
            CodecError::InvalidValue { ref field, .. } if field == "nested.sub_flag"
        ));
    }

    #[test]
    fn test_array_overflow_rejected() {
        let layout = array_t(Endianness::Little);
        let values = ValueTree::from([("samples".to_string(), Value::from(vec![1u64, 2, 3, 4]))]);
        assert_eq!(
            encode(&layout, &values).unwrap_err(),
            CodecError::InvalidValue {
                field: "samples".to_string(),
                reason: "4 elements exceed array length 3".to_string()
            }
        );
    }

    #[test]
    fn test_short_buffer() {
        let layout = main_t(Endianness::Little);
        assert_eq!(
            decode(&layout, &[0; 11]).unwrap_err(),
            CodecError::ShortBuffer {
                expected: 12,
                actual: 11
            }
        );
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let layout = header_t(Endianness::Big);
        let decoded = decode(&layout, &[0xab, 0xcd, 0x78, 0x63, 0xee]).unwrap();
        assert_eq!(decoded["length"], Value::U64(0xABCD));
    }

    #[test]
    fn test_hex_helpers() {
        let layout = header_t(Endianness::Little);
        let decoded = decode_hex(&layout, "0x6378CDAB").unwrap();
        assert_eq!(decoded["msg_source"], Value::U64(6));
        assert_eq!(encode_hex(&layout, &decoded).unwrap(), "6378cdab");

        assert!(matches!(
            decode_hex(&layout, "zz").unwrap_err(),
            CodecError::InvalidHex(_)
        ));
    }

    #[test]
    fn test_saturated_covers_non_padding_bits() {
        // sub_t: 7 of 8 bits used.
        assert_eq!(encode(&sub_t(Endianness::Little), &saturated(&sub_t(Endianness::Little))).unwrap(), vec![0x7f]);
    }

    proptest! {
        #[test]
        fn prop_encode_decode_restores_covered_bits(
            data in proptest::collection::vec(any::<u8>(), 12),
            big in any::<bool>(),
        ) {
            let endianness = if big { Endianness::Big } else { Endianness::Little };
            let layout = main_t(endianness);
            let coverage = encode(&layout, &saturated(&layout)).unwrap();

            let restored = encode(&layout, &decode(&layout, &data).unwrap()).unwrap();
            let expected: Vec<u8> = data.iter().zip(&coverage).map(|(d, c)| d & c).collect();
            prop_assert_eq!(restored, expected);
        }

        #[test]
        fn prop_encode_decode_is_lossless_without_padding(
            data in proptest::collection::vec(any::<u8>(), 4),
            big in any::<bool>(),
        ) {
            let endianness = if big { Endianness::Big } else { Endianness::Little };
            let layout = header_t(endianness);
            let restored = encode(&layout, &decode(&layout, &data).unwrap()).unwrap();
            prop_assert_eq!(restored, data);
        }

        #[test]
        fn prop_decode_encode_reproduces_fitting_values(seed in proptest::collection::vec(any::<u8>(), 64)) {
            let layout = array_t(Endianness::Little);
            let values = decode(&layout, &seed).unwrap();
            let again = decode(&layout, &encode(&layout, &values).unwrap()).unwrap();
            prop_assert_eq!(again, values);
        }
    }
}
