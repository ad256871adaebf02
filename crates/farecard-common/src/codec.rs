//! Schema-driven decode and encode
//!
//! Decoding is a single left-to-right pass. The bit offset is passed into
//! each field and the offset after it is returned, so nested containers and
//! bitmaps never share a mutable cursor.

use crate::bits;
use crate::fields::{ParsedFields, Value};
use crate::schema::{Field, Schema};
use crate::{CodecError, Result};

const MAX_INT_WIDTH: usize = 64;

/// Decode `buf` against `schema`
pub fn decode(schema: &Schema, buf: &[u8]) -> Result<ParsedFields> {
    decode_field(schema.root(), buf, 0).map(|(fields, _)| fields)
}

/// Decode a single field at `offset`, returning its values and the next offset
pub fn decode_field(field: &Field, buf: &[u8], offset: usize) -> Result<(ParsedFields, usize)> {
    let mut out = ParsedFields::new();
    let mut path = Vec::new();
    let next = decode_at(field, buf, offset, &mut path, &mut out)?;
    Ok((out, next))
}

fn ensure_available(buf: &[u8], offset: usize, width: usize) -> Result<()> {
    let available = bits::bit_len(buf);
    if offset + width > available {
        return Err(CodecError::TruncatedBuffer {
            needed: offset + width,
            available,
        });
    }
    Ok(())
}

fn decode_at(
    field: &Field,
    buf: &[u8],
    offset: usize,
    path: &mut Vec<u16>,
    out: &mut ParsedFields,
) -> Result<usize> {
    match field {
        Field::FixedInteger {
            name,
            width,
            signed,
        } => {
            let name = *name;
            if *width > MAX_INT_WIDTH {
                return Err(CodecError::InvalidWidth {
                    name,
                    width: *width,
                });
            }
            ensure_available(buf, offset, *width)?;
            let value = if *signed {
                Value::Signed(bits::get_bits_signed(buf, offset, *width))
            } else {
                Value::Unsigned(bits::get_bits(buf, offset, *width))
            };
            out.push_at(name, path.clone(), value);
            Ok(offset + width)
        }
        Field::FixedHex { name, width } => {
            let name = *name;
            ensure_available(buf, offset, *width)?;
            let value = Value::Hex {
                bits: *width,
                bytes: bits::get_blob(buf, offset, *width),
            };
            out.push_at(name, path.clone(), value);
            Ok(offset + width)
        }
        Field::Date { name, width, unit } => {
            let name = *name;
            if *width > MAX_INT_WIDTH {
                return Err(CodecError::InvalidWidth {
                    name,
                    width: *width,
                });
            }
            ensure_available(buf, offset, *width)?;
            let value = Value::Date {
                unit: *unit,
                raw: bits::get_bits(buf, offset, *width),
            };
            out.push_at(name, path.clone(), value);
            Ok(offset + width)
        }
        Field::Container(children) => {
            let mut next = offset;
            for (i, child) in children.iter().enumerate() {
                path.push(i as u16);
                let result = decode_at(child, buf, next, path, out);
                path.pop();
                next = result?;
            }
            Ok(next)
        }
        Field::Bitmap(children) => {
            let count = children.len();
            if count > MAX_INT_WIDTH {
                return Err(CodecError::InvalidWidth {
                    name: "bitmap",
                    width: count,
                });
            }
            ensure_available(buf, offset, count)?;
            let mask = bits::get_bits(buf, offset, count);
            let mut next = offset + count;
            for (i, child) in children.iter().enumerate() {
                if (mask >> i) & 1 == 0 {
                    continue;
                }
                path.push(i as u16);
                let result = decode_at(child, buf, next, path, out);
                path.pop();
                next = result?;
            }
            Ok(next)
        }
    }
}

/// Growable bit sink used while encoding
#[derive(Debug, Default)]
struct BitWriter {
    bytes: Vec<u8>,
    len: usize,
}

impl BitWriter {
    fn reserve(&mut self, width: usize) -> usize {
        let start = self.len;
        self.len += width;
        self.bytes.resize(self.len.div_ceil(8), 0);
        start
    }

    fn push(&mut self, width: usize, value: u64) {
        let start = self.reserve(width);
        bits::set_bits(&mut self.bytes, start, width, value);
    }

    fn push_blob(&mut self, width: usize, blob: &[u8]) {
        let start = self.reserve(width);
        bits::set_blob(&mut self.bytes, start, width, blob);
    }
}

/// Encode `fields` with `schema`; the exact inverse of [`decode`].
///
/// Output is padded with zero bits to a whole number of bytes.
pub fn encode(schema: &Schema, fields: &ParsedFields) -> Result<Vec<u8>> {
    let mut writer = BitWriter::default();
    let mut path = Vec::new();
    encode_at(schema.root(), fields, &mut path, &mut writer)?;
    Ok(writer.bytes)
}

fn fits_unsigned(value: u64, width: usize) -> bool {
    width >= 64 || value >> width == 0
}

fn fits_signed(value: i64, width: usize) -> bool {
    if width == 0 {
        return value == 0;
    }
    if width >= 64 {
        return true;
    }
    let min = -(1i64 << (width - 1));
    let max = (1i64 << (width - 1)) - 1;
    (min..=max).contains(&value)
}

fn encode_at(
    field: &Field,
    fields: &ParsedFields,
    path: &mut Vec<u16>,
    out: &mut BitWriter,
) -> Result<()> {
    match field {
        Field::FixedInteger {
            name,
            width,
            signed,
        } => {
            let name = *name;
            if *width > MAX_INT_WIDTH {
                return Err(CodecError::InvalidWidth {
                    name,
                    width: *width,
                });
            }
            let value = fields
                .lookup(name, path)
                .ok_or(CodecError::MissingField(name))?;
            let raw = match (value, *signed) {
                (Value::Unsigned(v), false) => {
                    if !fits_unsigned(*v, *width) {
                        return Err(CodecError::ValueOutOfRange {
                            name,
                            width: *width,
                        });
                    }
                    *v
                }
                (Value::Signed(v), true) => {
                    if !fits_signed(*v, *width) {
                        return Err(CodecError::ValueOutOfRange {
                            name,
                            width: *width,
                        });
                    }
                    *v as u64
                }
                _ => return Err(CodecError::TypeMismatch { name }),
            };
            out.push(*width, raw);
            Ok(())
        }
        Field::FixedHex { name, width } => {
            let name = *name;
            let value = fields
                .lookup(name, path)
                .ok_or(CodecError::MissingField(name))?;
            match value {
                Value::Hex { bits, bytes } if bits == width && bytes.len() == width.div_ceil(8) => {
                    out.push_blob(*width, bytes);
                    Ok(())
                }
                Value::Hex { .. } => Err(CodecError::ValueOutOfRange {
                    name,
                    width: *width,
                }),
                _ => Err(CodecError::TypeMismatch { name }),
            }
        }
        Field::Date { name, width, unit } => {
            let name = *name;
            let value = fields
                .lookup(name, path)
                .ok_or(CodecError::MissingField(name))?;
            match value {
                Value::Date { unit: u, raw } if u == unit => {
                    if *width > MAX_INT_WIDTH || !fits_unsigned(*raw, *width) {
                        return Err(CodecError::ValueOutOfRange {
                            name,
                            width: *width,
                        });
                    }
                    out.push(*width, *raw);
                    Ok(())
                }
                _ => Err(CodecError::TypeMismatch { name }),
            }
        }
        Field::Container(children) => {
            for (i, child) in children.iter().enumerate() {
                path.push(i as u16);
                let result = encode_at(child, fields, path, out);
                path.pop();
                result?;
            }
            Ok(())
        }
        Field::Bitmap(children) => {
            let count = children.len();
            if count > MAX_INT_WIDTH {
                return Err(CodecError::InvalidWidth {
                    name: "bitmap",
                    width: count,
                });
            }
            let mut present = Vec::with_capacity(count);
            let mut mask = 0u64;
            for (i, child) in children.iter().enumerate() {
                path.push(i as u16);
                let is_present =
                    fields.has_under(path) || fields.has_loose(|name| child.declares(name));
                path.pop();
                if is_present {
                    mask |= 1 << i;
                }
                present.push(is_present);
            }
            out.push(count, mask);
            for (i, child) in children.iter().enumerate() {
                if !present[i] {
                    continue;
                }
                path.push(i as u16);
                let result = encode_at(child, fields, path, out);
                path.pop();
                result?;
            }
            Ok(())
        }
    }
}
