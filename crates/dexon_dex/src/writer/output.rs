//! Little-endian byte output with LEB128 helpers.

/// Appends an unsigned LEB128 value.
pub(crate) fn write_uleb128(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Appends a signed LEB128 value.
pub(crate) fn write_sleb128(buf: &mut Vec<u8>, mut value: i32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Appends `value + 1` as unsigned LEB128, with `None` encoded as 0.
pub(crate) fn write_uleb128p1(buf: &mut Vec<u8>, value: Option<u32>) {
    write_uleb128(buf, value.map_or(0, |v| v.wrapping_add(1)));
}

/// Encodes a string as modified UTF-8: UTF-16 units, each as one to three
/// bytes, with NUL as the two-byte form.
pub(crate) fn write_mutf8(buf: &mut Vec<u8>, s: &str) {
    for unit in s.encode_utf16() {
        match unit {
            0x01..=0x7f => buf.push(unit as u8),
            0x00 | 0x80..=0x7ff => {
                buf.push(0xc0 | (unit >> 6) as u8);
                buf.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                buf.push(0xe0 | (unit >> 12) as u8);
                buf.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                buf.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
}

/// A growing section of the image that knows its absolute file offset.
pub(crate) struct ByteOutput {
    buf: Vec<u8>,
    base: u32,
}

impl ByteOutput {
    /// Creates an output whose first byte lands at file offset `base`.
    pub(crate) fn new(base: u32) -> Self {
        Self {
            buf: Vec::new(),
            base,
        }
    }

    /// Absolute file offset of the next byte.
    pub(crate) fn position(&self) -> u32 {
        self.base + self.buf.len() as u32
    }

    pub(crate) fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(crate) fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn uleb128(&mut self, value: u32) {
        write_uleb128(&mut self.buf, value);
    }

    /// Pads with zeros up to the next multiple of `alignment`.
    pub(crate) fn align(&mut self, alignment: u32) {
        while self.position() % alignment != 0 {
            self.buf.push(0);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uleb(v: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        write_uleb128(&mut buf, v);
        buf
    }

    fn sleb(v: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        write_sleb128(&mut buf, v);
        buf
    }

    #[test]
    fn uleb128_known_values() {
        assert_eq!(uleb(0), [0x00]);
        assert_eq!(uleb(1), [0x01]);
        assert_eq!(uleb(127), [0x7f]);
        assert_eq!(uleb(128), [0x80, 0x01]);
        assert_eq!(uleb(16256), [0x80, 0x7f]);
        assert_eq!(uleb(u32::MAX), [0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[test]
    fn sleb128_known_values() {
        assert_eq!(sleb(0), [0x00]);
        assert_eq!(sleb(1), [0x01]);
        assert_eq!(sleb(-1), [0x7f]);
        assert_eq!(sleb(-128), [0x80, 0x7f]);
        assert_eq!(sleb(64), [0xc0, 0x00]);
    }

    #[test]
    fn uleb128p1_none_is_zero() {
        let mut buf = Vec::new();
        write_uleb128p1(&mut buf, None);
        write_uleb128p1(&mut buf, Some(0));
        assert_eq!(buf, [0x00, 0x01]);
    }

    #[test]
    fn mutf8_encodes_nul_and_surrogates() {
        let mut buf = Vec::new();
        write_mutf8(&mut buf, "a\0\u{e9}");
        assert_eq!(buf, [b'a', 0xc0, 0x80, 0xc3, 0xa9]);

        let mut emoji = Vec::new();
        write_mutf8(&mut emoji, "\u{1F600}");
        // Each surrogate half becomes three bytes.
        assert_eq!(emoji, [0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80]);
    }

    #[test]
    fn alignment_is_absolute() {
        let mut out = ByteOutput::new(0x72);
        assert_eq!(out.position(), 0x72);
        out.align(4);
        assert_eq!(out.position(), 0x74);
        assert_eq!(out.len(), 2);
        out.u32(7);
        out.align(4);
        assert_eq!(out.position(), 0x78);
    }
}
