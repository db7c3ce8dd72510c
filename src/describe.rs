//! Human-readable dump of a packed buffer: one line per element with its
//! value, mask and shift, plus a symbol label when one is associated.

use crate::{
    bits,
    errors::CodecError,
    field::{FieldDescriptor, FieldKind, Mask},
    layout::StructLayout,
    symbols::SymbolTable,
};

struct Line {
    label: String,
    value: u64,
    mask: Mask,
    symbol: Option<String>,
}

fn collect(
    image: &[u8],
    base: usize,
    prefix: &str,
    layout: &StructLayout,
    symbols: &SymbolTable,
    out: &mut Vec<Line>,
) {
    for field in &layout.fields {
        let label = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{prefix}.{}", field.name)
        };

        for i in 0..field.count() {
            let element_label = match field.array_length {
                Some(_) => format!("{label}[{i}]"),
                None => label.clone(),
            };
            let offset = base + field.element_offset(i);

            match &field.kind {
                FieldKind::Nested(nested) => {
                    collect(image, offset, &element_label, nested, symbols, out);
                }
                _ => out.push(leaf(image, offset, field, layout, symbols, element_label)),
            }
        }
    }
}

fn leaf(
    image: &[u8],
    offset: usize,
    field: &FieldDescriptor,
    layout: &StructLayout,
    symbols: &SymbolTable,
    label: String,
) -> Line {
    let width = field.element_width();
    let value = bits::read_bits_at(image, offset, width);

    Line {
        label,
        value,
        mask: Mask::new(offset, width),
        symbol: symbols
            .label(&layout.name, &field.name, value)
            .map(str::to_string),
    }
}

/// Renders `data` decoded against `layout`.
///
/// ```text
/// packed      0xABCD7863
/// msg_type    0x3        mask 0xf                >> 0   = 3 (DATA)
/// ```
pub fn describe(
    layout: &StructLayout,
    data: &[u8],
    symbols: &SymbolTable,
) -> Result<String, CodecError> {
    let expected = layout.total_bytes();
    if data.len() < expected {
        return Err(CodecError::ShortBuffer {
            expected,
            actual: data.len(),
        });
    }

    let image = bits::to_image(&data[..expected], layout.endianness);

    let mut lines = Vec::new();
    collect(&image, 0, "", layout, symbols, &mut lines);

    let label_width = lines.iter().map(|l| l.label.len()).max().unwrap_or(0).max(6);
    let mask_width = lines
        .iter()
        .map(|l| l.mask.to_string().len())
        .max()
        .unwrap_or(0);

    // The packed integer, most significant byte first.
    let packed: Vec<u8> = image.iter().rev().copied().collect();
    let mut out = vec![format!(
        "{:<label_width$}  0x{}",
        "packed",
        hex::encode_upper(&packed)
    )];

    for line in lines {
        let mut text = format!(
            "{:<label_width$}  {:<18}  mask {:<mask_width$}  >> {:<4} = {}",
            line.label,
            format!("{:#X}", line.value),
            line.mask.to_string(),
            line.mask.offset,
            line.value,
        );
        if let Some(symbol) = line.symbol {
            text.push_str(&format!(" ({symbol})"));
        }
        out.push(text);
    }

    Ok(out.join("\n"))
}
