//! `encoded_value`, `encoded_array` and `encoded_annotation` serialization.

use super::output::write_uleb128;
use crate::error::DexResult;
use crate::pool::SortedPool;
use dexon_ir::{EncodedAnnotation, EncodedValue};

const VALUE_BYTE: u8 = 0x00;
const VALUE_SHORT: u8 = 0x02;
const VALUE_CHAR: u8 = 0x03;
const VALUE_INT: u8 = 0x04;
const VALUE_LONG: u8 = 0x06;
const VALUE_FLOAT: u8 = 0x10;
const VALUE_DOUBLE: u8 = 0x11;
const VALUE_METHOD_TYPE: u8 = 0x15;
const VALUE_METHOD_HANDLE: u8 = 0x16;
const VALUE_STRING: u8 = 0x17;
const VALUE_TYPE: u8 = 0x18;
const VALUE_FIELD: u8 = 0x19;
const VALUE_METHOD: u8 = 0x1a;
const VALUE_ENUM: u8 = 0x1b;
const VALUE_ARRAY: u8 = 0x1c;
const VALUE_ANNOTATION: u8 = 0x1d;
const VALUE_NULL: u8 = 0x1e;
const VALUE_BOOLEAN: u8 = 0x1f;

fn header(buf: &mut Vec<u8>, value_type: u8, arg: u8) {
    buf.push((arg << 5) | value_type);
}

/// Smallest byte count whose sign extension reproduces `value`.
fn signed_width(value: i64) -> u32 {
    (1..8)
        .find(|&n| {
            let shift = 64 - 8 * n;
            (value << shift) >> shift == value
        })
        .unwrap_or(8)
}

/// Smallest byte count whose zero extension reproduces `value`, at least one.
fn unsigned_width(value: u64) -> u32 {
    (1..8).find(|&n| value >> (8 * n) == 0).unwrap_or(8)
}

fn signed(buf: &mut Vec<u8>, value_type: u8, value: i64) {
    let width = signed_width(value);
    header(buf, value_type, (width - 1) as u8);
    buf.extend_from_slice(&value.to_le_bytes()[..width as usize]);
}

fn unsigned(buf: &mut Vec<u8>, value_type: u8, value: u64) {
    let width = unsigned_width(value);
    header(buf, value_type, (width - 1) as u8);
    buf.extend_from_slice(&value.to_le_bytes()[..width as usize]);
}

/// Floats keep their high-order bytes; trailing zero bytes on the right are
/// implied.
fn right_zero_extended(buf: &mut Vec<u8>, value_type: u8, bits: u64, size: u32) {
    let bytes = bits.to_le_bytes();
    let significant = &bytes[..size as usize];
    let skip = significant
        .iter()
        .take_while(|&&b| b == 0)
        .count()
        .min(size as usize - 1);
    let kept = &significant[skip..];
    header(buf, value_type, (kept.len() - 1) as u8);
    buf.extend_from_slice(kept);
}

/// Appends one `encoded_value`.
pub(crate) fn write_value(buf: &mut Vec<u8>, value: &EncodedValue, pool: &SortedPool) -> DexResult<()> {
    match value {
        EncodedValue::Byte(v) => {
            header(buf, VALUE_BYTE, 0);
            buf.push(*v as u8);
        }
        EncodedValue::Short(v) => signed(buf, VALUE_SHORT, i64::from(*v)),
        EncodedValue::Char(v) => unsigned(buf, VALUE_CHAR, u64::from(*v)),
        EncodedValue::Int(v) => signed(buf, VALUE_INT, i64::from(*v)),
        EncodedValue::Long(v) => signed(buf, VALUE_LONG, *v),
        EncodedValue::Float(bits) => right_zero_extended(buf, VALUE_FLOAT, u64::from(*bits), 4),
        EncodedValue::Double(bits) => right_zero_extended(buf, VALUE_DOUBLE, *bits, 8),
        EncodedValue::MethodType(proto) => {
            unsigned(buf, VALUE_METHOD_TYPE, u64::from(pool.proto(proto)?))
        }
        EncodedValue::MethodHandle(handle) => unsigned(
            buf,
            VALUE_METHOD_HANDLE,
            u64::from(pool.method_handle(handle)?),
        ),
        EncodedValue::String(s) => unsigned(buf, VALUE_STRING, u64::from(pool.string(s)?)),
        EncodedValue::Type(t) => unsigned(buf, VALUE_TYPE, u64::from(pool.type_(t)?)),
        EncodedValue::Field(f) => unsigned(buf, VALUE_FIELD, u64::from(pool.field(f)?)),
        EncodedValue::Method(m) => unsigned(buf, VALUE_METHOD, u64::from(pool.method(m)?)),
        EncodedValue::Enum(f) => unsigned(buf, VALUE_ENUM, u64::from(pool.field(f)?)),
        EncodedValue::Array(values) => {
            header(buf, VALUE_ARRAY, 0);
            write_array(buf, values, pool)?;
        }
        EncodedValue::Annotation(annotation) => {
            header(buf, VALUE_ANNOTATION, 0);
            write_annotation(buf, annotation, pool)?;
        }
        EncodedValue::Null => header(buf, VALUE_NULL, 0),
        EncodedValue::Boolean(b) => header(buf, VALUE_BOOLEAN, u8::from(*b)),
    }
    Ok(())
}

/// Appends an `encoded_array`: a count followed by the values.
pub(crate) fn write_array(buf: &mut Vec<u8>, values: &[EncodedValue], pool: &SortedPool) -> DexResult<()> {
    write_uleb128(buf, values.len() as u32);
    values.iter().try_for_each(|v| write_value(buf, v, pool))
}

/// Appends an `encoded_annotation`, elements sorted by name index.
pub(crate) fn write_annotation(
    buf: &mut Vec<u8>,
    annotation: &EncodedAnnotation,
    pool: &SortedPool,
) -> DexResult<()> {
    write_uleb128(buf, pool.type_(&annotation.type_)?);
    let mut elements = annotation
        .elements
        .iter()
        .map(|e| -> DexResult<_> { Ok((pool.string(&e.name)?, &e.value)) })
        .collect::<DexResult<Vec<_>>>()?;
    elements.sort_by_key(|(name, _)| *name);
    write_uleb128(buf, elements.len() as u32);
    for (name, value) in elements {
        write_uleb128(buf, name);
        write_value(buf, value, pool)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConstantPool;
    use dexon_ir::AnnotationElement;

    fn encode(value: EncodedValue) -> Vec<u8> {
        let pool = ConstantPool::new().into_sorted();
        let mut buf = Vec::new();
        write_value(&mut buf, &value, &pool).unwrap();
        buf
    }

    #[test]
    fn integers_use_minimal_width() {
        assert_eq!(encode(EncodedValue::Int(0)), [0x04, 0x00]);
        assert_eq!(encode(EncodedValue::Int(-1)), [0x04, 0xff]);
        assert_eq!(encode(EncodedValue::Int(128)), [0x24, 0x80, 0x00]);
        assert_eq!(encode(EncodedValue::Int(-129)), [0x24, 0x7f, 0xff]);
        assert_eq!(
            encode(EncodedValue::Long(i64::MIN)),
            [0xe6, 0, 0, 0, 0, 0, 0, 0, 0x80]
        );
        assert_eq!(encode(EncodedValue::Short(0x1234)), [0x22, 0x34, 0x12]);
    }

    #[test]
    fn char_is_unsigned() {
        assert_eq!(encode(EncodedValue::Char(0xff)), [0x03, 0xff]);
        assert_eq!(encode(EncodedValue::Char(0x100)), [0x23, 0x00, 0x01]);
    }

    #[test]
    fn floats_drop_low_zero_bytes() {
        // 1.0f is 0x3f800000.
        assert_eq!(encode(EncodedValue::float(1.0)), [0x30, 0x80, 0x3f]);
        assert_eq!(encode(EncodedValue::float(0.0)), [0x10, 0x00]);
        // 2.0 is 0x4000000000000000.
        assert_eq!(encode(EncodedValue::double(2.0)), [0x11, 0x40]);
    }

    #[test]
    fn null_and_booleans() {
        assert_eq!(encode(EncodedValue::Null), [0x1e]);
        assert_eq!(encode(EncodedValue::Boolean(true)), [0x3f]);
        assert_eq!(encode(EncodedValue::Boolean(false)), [0x1f]);
    }

    #[test]
    fn annotation_elements_sorted_by_name() {
        let mut pool = ConstantPool::new();
        pool.add_type("LAnno;");
        pool.add_string("b");
        pool.add_string("a");
        let pool = pool.into_sorted();
        let annotation = EncodedAnnotation {
            type_: "LAnno;".into(),
            elements: vec![
                AnnotationElement {
                    name: "b".into(),
                    value: EncodedValue::Int(2),
                },
                AnnotationElement {
                    name: "a".into(),
                    value: EncodedValue::Int(1),
                },
            ],
        };
        let mut buf = Vec::new();
        write_annotation(&mut buf, &annotation, &pool).unwrap();
        // Strings sort as "LAnno;", "a", "b".
        assert_eq!(buf, [0x00, 0x02, 0x01, 0x04, 0x01, 0x02, 0x04, 0x02]);
    }

    #[test]
    fn unknown_string_is_error() {
        let pool = ConstantPool::new().into_sorted();
        let mut buf = Vec::new();
        assert!(write_value(&mut buf, &EncodedValue::String("x".into()), &pool).is_err());
    }
}
