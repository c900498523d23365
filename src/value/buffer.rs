//! Fixed-length byte buffers with typed numeric access.

use super::Value;

/// Element type for typed reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl NumberKind {
    pub fn parse(name: &str) -> Option<NumberKind> {
        let kind = match name {
            "i8" => NumberKind::I8,
            "u8" => NumberKind::U8,
            "i16" => NumberKind::I16,
            "u16" => NumberKind::U16,
            "i32" => NumberKind::I32,
            "u32" => NumberKind::U32,
            "i64" => NumberKind::I64,
            "u64" => NumberKind::U64,
            "f32" => NumberKind::F32,
            "f64" => NumberKind::F64,
            _ => return None,
        };
        Some(kind)
    }

    pub fn width(self) -> usize {
        match self {
            NumberKind::I8 | NumberKind::U8 => 1,
            NumberKind::I16 | NumberKind::U16 => 2,
            NumberKind::I32 | NumberKind::U32 | NumberKind::F32 => 4,
            NumberKind::I64 | NumberKind::U64 | NumberKind::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    pub data: Vec<u8>,
}

macro_rules! decode {
    ($ty:ty, $bytes:expr, $little:expr) => {{
        let raw: [u8; std::mem::size_of::<$ty>()] = $bytes;
        if $little {
            <$ty>::from_le_bytes(raw)
        } else {
            <$ty>::from_be_bytes(raw)
        }
    }};
}

macro_rules! encode {
    ($value:expr, $little:expr) => {{
        let value = $value;
        if $little {
            value.to_le_bytes().to_vec()
        } else {
            value.to_be_bytes().to_vec()
        }
    }};
}

impl Buffer {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    /// A zeroed buffer, or an error when the allocation fails.
    pub fn try_new(size: usize) -> Result<Self, String> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|err| format!("can not allocate a buffer of {} bytes: {}", size, err))?;
        data.resize(size, 0);
        Ok(Self { data })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn window(&self, offset: usize, width: usize) -> Result<&[u8], String> {
        self.data
            .get(offset..offset.saturating_add(width))
            .ok_or_else(|| format!("offset {} out of range for buffer of {} bytes", offset, self.len()))
    }

    pub fn read_number(&self, offset: usize, kind: NumberKind, little: bool) -> Result<Value, String> {
        let bytes = self.window(offset, kind.width())?;
        let value = match kind {
            NumberKind::I8 => Value::Int(bytes[0] as i8 as i64),
            NumberKind::U8 => Value::Int(bytes[0] as i64),
            NumberKind::I16 => Value::Int(decode!(i16, [bytes[0], bytes[1]], little) as i64),
            NumberKind::U16 => Value::Int(decode!(u16, [bytes[0], bytes[1]], little) as i64),
            NumberKind::I32 => Value::Int(decode!(i32, to_array(bytes), little) as i64),
            NumberKind::U32 => Value::Int(decode!(u32, to_array(bytes), little) as i64),
            NumberKind::I64 => Value::Int(decode!(i64, to_array(bytes), little)),
            NumberKind::U64 => Value::Int(decode!(u64, to_array(bytes), little) as i64),
            NumberKind::F32 => Value::Float(decode!(f32, to_array(bytes), little) as f64),
            NumberKind::F64 => Value::Float(decode!(f64, to_array(bytes), little)),
        };
        Ok(value)
    }

    /// Write `value` (an int or float) at `offset`, truncating to the kind's width.
    pub fn write_number(
        &mut self,
        offset: usize,
        kind: NumberKind,
        value: &Value,
        little: bool,
    ) -> Result<(), String> {
        let (int, float) = match value {
            Value::Int(n) => (*n, *n as f64),
            Value::Float(n) => (*n as i64, *n),
            other => return Err(format!("can not write {} as a number", other.type_name())),
        };
        self.window(offset, kind.width())?;
        let bytes = match kind {
            NumberKind::I8 | NumberKind::U8 => vec![int as u8],
            NumberKind::I16 | NumberKind::U16 => encode!(int as u16, little),
            NumberKind::I32 | NumberKind::U32 => encode!(int as u32, little),
            NumberKind::I64 | NumberKind::U64 => encode!(int as u64, little),
            NumberKind::F32 => encode!(float as f32, little),
            NumberKind::F64 => encode!(float, little),
        };
        self.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn slice(&self, start: usize, end: usize) -> Result<Buffer, String> {
        if start > end || end > self.len() {
            return Err(format!(
                "slice [{}:{}] out of range for buffer of {} bytes",
                start,
                end,
                self.len()
            ));
        }
        Ok(Buffer::from_bytes(self.data[start..end].to_vec()))
    }

    pub fn concat(&self, other: &Buffer) -> Buffer {
        let mut data = Vec::with_capacity(self.len() + other.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&other.data);
        Buffer::from_bytes(data)
    }

    /// Lossy UTF-8 decode of `[start, end)`.
    pub fn to_string_range(&self, start: usize, end: usize) -> Result<String, String> {
        let bytes = self.slice(start, end)?;
        Ok(String::from_utf8_lossy(&bytes.data).into_owned())
    }
}

/// Copy `src[src_start..src_end]` into `dst` at `dst_start`, clipped to the
/// room left in `dst`. Returns the number of bytes copied. `dst` and `src`
/// may be the same buffer.
pub fn copy_within(
    dst: &mut Vec<u8>,
    src: Option<&[u8]>,
    dst_start: usize,
    src_start: usize,
    src_end: usize,
) -> Result<usize, String> {
    let src_len = src.map_or(dst.len(), |s| s.len());
    if src_start > src_end || src_end > src_len || dst_start > dst.len() {
        return Err("buffer copy range out of bounds".to_string());
    }
    let count = (src_end - src_start).min(dst.len() - dst_start);
    match src {
        Some(src) => dst[dst_start..dst_start + count]
            .copy_from_slice(&src[src_start..src_start + count]),
        None => dst.copy_within(src_start..src_start + count, dst_start),
    }
    Ok(count)
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_read_write() {
        let mut buf = Buffer::new(16);
        buf.write_number(0, NumberKind::U16, &Value::Int(0x1234), true)
            .unwrap();
        assert_eq!(&buf.data[..2], &[0x34, 0x12]);
        buf.write_number(2, NumberKind::U16, &Value::Int(0x1234), false)
            .unwrap();
        assert_eq!(&buf.data[2..4], &[0x12, 0x34]);

        buf.write_number(4, NumberKind::I32, &Value::Int(-2), true).unwrap();
        assert!(matches!(
            buf.read_number(4, NumberKind::I32, true).unwrap(),
            Value::Int(-2)
        ));
        assert!(matches!(
            buf.read_number(4, NumberKind::U8, true).unwrap(),
            Value::Int(0xfe)
        ));

        buf.write_number(8, NumberKind::F64, &Value::Float(1.25), false)
            .unwrap();
        match buf.read_number(8, NumberKind::F64, false).unwrap() {
            Value::Float(n) => assert_eq!(n, 1.25),
            other => panic!("Expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_access() {
        let mut buf = Buffer::new(4);
        assert!(buf.read_number(2, NumberKind::I32, true).is_err());
        assert!(buf
            .write_number(4, NumberKind::U8, &Value::Int(1), true)
            .is_err());
        assert!(buf.slice(3, 2).is_err());
    }

    #[test]
    fn test_try_new_reports_impossible_sizes() {
        let buf = Buffer::try_new(3).unwrap();
        assert_eq!(buf.data, vec![0, 0, 0]);
        let err = Buffer::try_new(usize::MAX).unwrap_err();
        assert!(err.contains("can not allocate a buffer"));
    }

    #[test]
    fn test_copy_overlapping() {
        let mut data = b"abcdef".to_vec();
        let n = copy_within(&mut data, None, 2, 0, 4).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&data, b"ababcd");

        let mut dst = vec![0u8; 3];
        let n = copy_within(&mut dst, Some(b"xyzw"), 1, 0, 4).unwrap();
        assert_eq!(n, 2);
        assert_eq!(dst, vec![0, b'x', b'y']);
    }
}
