//! Core value types for the signal data path
//!
//! # Main Types
//!
//! - [`SampleType`] - Closed enumeration of sample layouts a descriptor can announce
//! - [`Scalar`] - Lossless numeric intermediate used by rules and conversions
//! - [`Ratio`] - Reduced rational number, used for tick resolutions
//! - [`Unit`] - Physical unit of a signal's values
//! - [`Sample`] - Trait implemented by every primitive type a reader can return
//! - [`SampleBlock`] - Typed, contiguous buffer handed to consumers
//!
//! Raw packet buffers use native byte order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Layout of a single sample element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleType {
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Opaque variable-length bytes
    Binary,
    /// UTF-8 text
    String,
    /// Named fields, described by the descriptor's struct fields
    Struct,
    /// Pair of `i64` (start, end)
    RangeInt64,
    /// Not set; for readers it means "match the producer"
    #[default]
    Undefined,
}

impl SampleType {
    /// Size in bytes of one element, or `None` if the type has no fixed size
    ///
    /// Struct sizes depend on the descriptor's fields and are resolved there.
    pub fn size_bytes(&self) -> Option<usize> {
        match self {
            SampleType::Int8 | SampleType::UInt8 => Some(1),
            SampleType::Int16 | SampleType::UInt16 => Some(2),
            SampleType::Int32 | SampleType::UInt32 | SampleType::Float32 => Some(4),
            SampleType::Int64 | SampleType::UInt64 | SampleType::Float64 => Some(8),
            SampleType::RangeInt64 => Some(16),
            SampleType::Binary
            | SampleType::String
            | SampleType::Struct
            | SampleType::Undefined => None,
        }
    }

    /// Integer or floating point scalar
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            SampleType::Int8 | SampleType::Int16 | SampleType::Int32 | SampleType::Int64
        )
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            SampleType::UInt8 | SampleType::UInt16 | SampleType::UInt32 | SampleType::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleType::Float32 | SampleType::Float64)
    }

    /// Decode one element from native-endian bytes
    ///
    /// Returns `None` for non-numeric types or when `bytes` is too short.
    pub fn decode(&self, bytes: &[u8]) -> Option<Scalar> {
        let size = self.size_bytes()?;
        if bytes.len() < size || !self.is_numeric() {
            return None;
        }
        let bytes = &bytes[..size];
        Some(match self {
            SampleType::Int8 => i8::read_ne(bytes).to_scalar(),
            SampleType::Int16 => i16::read_ne(bytes).to_scalar(),
            SampleType::Int32 => i32::read_ne(bytes).to_scalar(),
            SampleType::Int64 => i64::read_ne(bytes).to_scalar(),
            SampleType::UInt8 => u8::read_ne(bytes).to_scalar(),
            SampleType::UInt16 => u16::read_ne(bytes).to_scalar(),
            SampleType::UInt32 => u32::read_ne(bytes).to_scalar(),
            SampleType::UInt64 => u64::read_ne(bytes).to_scalar(),
            SampleType::Float32 => f32::read_ne(bytes).to_scalar(),
            SampleType::Float64 => f64::read_ne(bytes).to_scalar(),
            _ => return None,
        })
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleType::Int8 => "Int8",
            SampleType::Int16 => "Int16",
            SampleType::Int32 => "Int32",
            SampleType::Int64 => "Int64",
            SampleType::UInt8 => "UInt8",
            SampleType::UInt16 => "UInt16",
            SampleType::UInt32 => "UInt32",
            SampleType::UInt64 => "UInt64",
            SampleType::Float32 => "Float32",
            SampleType::Float64 => "Float64",
            SampleType::Binary => "Binary",
            SampleType::String => "String",
            SampleType::Struct => "Struct",
            SampleType::RangeInt64 => "RangeInt64",
            SampleType::Undefined => "Undefined",
        };
        f.write_str(name)
    }
}

/// A single numeric value in the widest representation of its family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::UInt(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }

    /// Float values truncate toward zero
    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Int(v) => v,
            Scalar::UInt(v) => v as i64,
            Scalar::Float(v) => v as i64,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Scalar::Int(v) => v as u64,
            Scalar::UInt(v) => v,
            Scalar::Float(v) => v as u64,
        }
    }

    fn as_i128(self) -> i128 {
        match self {
            Scalar::Int(v) => v as i128,
            Scalar::UInt(v) => v as i128,
            Scalar::Float(v) => v as i128,
        }
    }

    /// Narrow this value into the range of `ty` using `as` cast semantics
    pub fn cast(self, ty: SampleType) -> Scalar {
        match ty {
            SampleType::Int8 => Scalar::Int(self.cast_int() as i8 as i64),
            SampleType::Int16 => Scalar::Int(self.cast_int() as i16 as i64),
            SampleType::Int32 => Scalar::Int(self.cast_int() as i32 as i64),
            SampleType::Int64 => Scalar::Int(self.as_i64()),
            SampleType::UInt8 => Scalar::UInt(self.cast_uint() as u8 as u64),
            SampleType::UInt16 => Scalar::UInt(self.cast_uint() as u16 as u64),
            SampleType::UInt32 => Scalar::UInt(self.cast_uint() as u32 as u64),
            SampleType::UInt64 => Scalar::UInt(self.as_u64()),
            SampleType::Float32 => Scalar::Float(self.as_f64() as f32 as f64),
            SampleType::Float64 => Scalar::Float(self.as_f64()),
            _ => self,
        }
    }

    // Floats saturate into the target family first, integers wrap.
    fn cast_int(self) -> i64 {
        match self {
            Scalar::Float(v) => v as i64,
            other => other.as_i64(),
        }
    }

    fn cast_uint(self) -> u64 {
        match self {
            Scalar::Float(v) => v as u64,
            other => other.as_u64(),
        }
    }

    /// `start + index * delta`, evaluated in the family of `ty` and cast to it
    pub fn linear(start: Scalar, delta: Scalar, index: i64, ty: SampleType) -> Scalar {
        if ty.is_float() {
            Scalar::Float(start.as_f64() + index as f64 * delta.as_f64()).cast(ty)
        } else {
            let v = start
                .as_i128()
                .wrapping_add((index as i128).wrapping_mul(delta.as_i128()));
            if ty.is_unsigned_integer() {
                Scalar::UInt(v as u64).cast(ty)
            } else {
                Scalar::Int(v as i64).cast(ty)
            }
        }
    }
}

impl Default for Scalar {
    fn default() -> Self {
        Scalar::Int(0)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar::UInt(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

/// Reduced rational number with a positive denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ratio {
    num: i64,
    den: i64,
}

impl Ratio {
    /// Returns `None` when `den` is zero
    pub fn new(num: i64, den: i64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let sign = if den < 0 { -1 } else { 1 };
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()).max(1) as i64;
        Some(Self {
            num: sign * num / g,
            den: sign * den / g,
        })
    }

    /// `1 / den`, the usual form of a tick resolution
    pub fn per(den: i64) -> Option<Self> {
        Self::new(1, den)
    }

    pub fn num(&self) -> i64 {
        self.num
    }

    pub fn den(&self) -> i64 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Greatest common divisor
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple over `i128`, both arguments positive
pub fn lcm_i128(a: i128, b: i128) -> i128 {
    let (mut x, mut y) = (a, b);
    while y != 0 {
        let t = x % y;
        x = y;
        y = t;
    }
    a / x * b
}

/// Physical unit of a signal's values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub symbol: String,
    pub quantity: String,
    pub name: String,
    /// Numeric unit id, -1 when not set
    pub id: i32,
}

impl Unit {
    pub fn new(symbol: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: quantity.into(),
            name: String::new(),
            id: -1,
        }
    }

    /// Seconds, the unit readers expect on time domains
    pub fn seconds() -> Self {
        Self {
            symbol: "s".to_string(),
            quantity: "time".to_string(),
            name: "second".to_string(),
            id: -1,
        }
    }
}

impl Default for Unit {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            quantity: String::new(),
            name: String::new(),
            id: -1,
        }
    }
}

/// One `RangeInt64` sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RangeValue {
    pub start: i64,
    pub end: i64,
}

impl RangeValue {
    fn read_ne(bytes: &[u8]) -> Self {
        Self {
            start: i64::read_ne(&bytes[..8]),
            end: i64::read_ne(&bytes[8..16]),
        }
    }
}

/// A primitive type that can be written into packets and returned by readers
pub trait Sample: Copy + Send + Sync + 'static {
    const SAMPLE_TYPE: SampleType;

    /// Convert from the intermediate with `as` semantics
    fn from_scalar(value: Scalar) -> Self;
    fn to_scalar(self) -> Scalar;
    fn read_ne(bytes: &[u8]) -> Self;
    fn write_ne(self, out: &mut [u8]);

    fn slice(block: &SampleBlock) -> Option<&[Self]>;
}

macro_rules! impl_sample {
    ($t:ty, $variant:ident, $scalar:ident, $wide:ty) => {
        impl Sample for $t {
            const SAMPLE_TYPE: SampleType = SampleType::$variant;

            #[inline]
            fn from_scalar(value: Scalar) -> Self {
                match value {
                    Scalar::Int(v) => v as $t,
                    Scalar::UInt(v) => v as $t,
                    Scalar::Float(v) => v as $t,
                }
            }

            #[inline]
            fn to_scalar(self) -> Scalar {
                Scalar::$scalar(self as $wide)
            }

            #[inline]
            fn read_ne(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_ne_bytes(buf)
            }

            #[inline]
            fn write_ne(self, out: &mut [u8]) {
                out[..std::mem::size_of::<$t>()].copy_from_slice(&self.to_ne_bytes());
            }

            fn slice(block: &SampleBlock) -> Option<&[Self]> {
                match block {
                    SampleBlock::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }
        }
    };
}

impl_sample!(i8, Int8, Int, i64);
impl_sample!(i16, Int16, Int, i64);
impl_sample!(i32, Int32, Int, i64);
impl_sample!(i64, Int64, Int, i64);
impl_sample!(u8, UInt8, UInt, u64);
impl_sample!(u16, UInt16, UInt, u64);
impl_sample!(u32, UInt32, UInt, u64);
impl_sample!(u64, UInt64, UInt, u64);
impl_sample!(f32, Float32, Float, f64);
impl_sample!(f64, Float64, Float, f64);

/// Typed, contiguous sample buffer returned by readers
///
/// Multi-dimensional samples are flattened: one sample of a descriptor with
/// `elements_per_sample() == 4` occupies four consecutive entries.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBlock {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Range(Vec<RangeValue>),
    /// Struct samples copied out without interpretation
    Raw {
        sample_size: usize,
        data: Vec<u8>,
    },
}

impl SampleBlock {
    /// Empty block for a numeric or range type, `None` for anything else
    pub fn with_capacity(ty: SampleType, capacity: usize) -> Option<Self> {
        Some(match ty {
            SampleType::Int8 => SampleBlock::Int8(Vec::with_capacity(capacity)),
            SampleType::Int16 => SampleBlock::Int16(Vec::with_capacity(capacity)),
            SampleType::Int32 => SampleBlock::Int32(Vec::with_capacity(capacity)),
            SampleType::Int64 => SampleBlock::Int64(Vec::with_capacity(capacity)),
            SampleType::UInt8 => SampleBlock::UInt8(Vec::with_capacity(capacity)),
            SampleType::UInt16 => SampleBlock::UInt16(Vec::with_capacity(capacity)),
            SampleType::UInt32 => SampleBlock::UInt32(Vec::with_capacity(capacity)),
            SampleType::UInt64 => SampleBlock::UInt64(Vec::with_capacity(capacity)),
            SampleType::Float32 => SampleBlock::Float32(Vec::with_capacity(capacity)),
            SampleType::Float64 => SampleBlock::Float64(Vec::with_capacity(capacity)),
            SampleType::RangeInt64 => SampleBlock::Range(Vec::with_capacity(capacity)),
            _ => return None,
        })
    }

    /// Empty block for raw struct samples of `sample_size` bytes
    pub fn raw(sample_size: usize) -> Self {
        SampleBlock::Raw {
            sample_size,
            data: Vec::new(),
        }
    }

    /// Placeholder when nothing could be read
    pub fn empty() -> Self {
        SampleBlock::Float64(Vec::new())
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleBlock::Int8(_) => SampleType::Int8,
            SampleBlock::Int16(_) => SampleType::Int16,
            SampleBlock::Int32(_) => SampleType::Int32,
            SampleBlock::Int64(_) => SampleType::Int64,
            SampleBlock::UInt8(_) => SampleType::UInt8,
            SampleBlock::UInt16(_) => SampleType::UInt16,
            SampleBlock::UInt32(_) => SampleType::UInt32,
            SampleBlock::UInt64(_) => SampleType::UInt64,
            SampleBlock::Float32(_) => SampleType::Float32,
            SampleBlock::Float64(_) => SampleType::Float64,
            SampleBlock::Range(_) => SampleType::RangeInt64,
            SampleBlock::Raw { .. } => SampleType::Struct,
        }
    }

    /// Number of elements in the block
    pub fn len(&self) -> usize {
        match self {
            SampleBlock::Int8(v) => v.len(),
            SampleBlock::Int16(v) => v.len(),
            SampleBlock::Int32(v) => v.len(),
            SampleBlock::Int64(v) => v.len(),
            SampleBlock::UInt8(v) => v.len(),
            SampleBlock::UInt16(v) => v.len(),
            SampleBlock::UInt32(v) => v.len(),
            SampleBlock::UInt64(v) => v.len(),
            SampleBlock::Float32(v) => v.len(),
            SampleBlock::Float64(v) => v.len(),
            SampleBlock::Range(v) => v.len(),
            SampleBlock::Raw { sample_size, data } => data.len() / (*sample_size).max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep the first `len` elements (whole samples for raw blocks)
    pub fn truncate(&mut self, len: usize) {
        match self {
            SampleBlock::Int8(v) => v.truncate(len),
            SampleBlock::Int16(v) => v.truncate(len),
            SampleBlock::Int32(v) => v.truncate(len),
            SampleBlock::Int64(v) => v.truncate(len),
            SampleBlock::UInt8(v) => v.truncate(len),
            SampleBlock::UInt16(v) => v.truncate(len),
            SampleBlock::UInt32(v) => v.truncate(len),
            SampleBlock::UInt64(v) => v.truncate(len),
            SampleBlock::Float32(v) => v.truncate(len),
            SampleBlock::Float64(v) => v.truncate(len),
            SampleBlock::Range(v) => v.truncate(len),
            SampleBlock::Raw { sample_size, data } => data.truncate(len * *sample_size),
        }
    }

    /// Append a numeric value, cast to the block's type
    ///
    /// Returns `false` for range and raw blocks.
    #[inline]
    pub fn push_scalar(&mut self, value: Scalar) -> bool {
        match self {
            SampleBlock::Int8(v) => v.push(i8::from_scalar(value)),
            SampleBlock::Int16(v) => v.push(i16::from_scalar(value)),
            SampleBlock::Int32(v) => v.push(i32::from_scalar(value)),
            SampleBlock::Int64(v) => v.push(i64::from_scalar(value)),
            SampleBlock::UInt8(v) => v.push(u8::from_scalar(value)),
            SampleBlock::UInt16(v) => v.push(u16::from_scalar(value)),
            SampleBlock::UInt32(v) => v.push(u32::from_scalar(value)),
            SampleBlock::UInt64(v) => v.push(u64::from_scalar(value)),
            SampleBlock::Float32(v) => v.push(f32::from_scalar(value)),
            SampleBlock::Float64(v) => v.push(f64::from_scalar(value)),
            SampleBlock::Range(_) | SampleBlock::Raw { .. } => return false,
        }
        true
    }

    /// Append raw bytes of whole samples (range and struct blocks)
    pub fn push_raw(&mut self, bytes: &[u8]) -> bool {
        match self {
            SampleBlock::Range(v) => {
                v.extend(bytes.chunks_exact(16).map(RangeValue::read_ne));
                true
            }
            SampleBlock::Raw { data, .. } => {
                data.extend_from_slice(bytes);
                true
            }
            _ => false,
        }
    }

    /// Element at `index` as a scalar (numeric blocks only)
    pub fn scalar_at(&self, index: usize) -> Option<Scalar> {
        match self {
            SampleBlock::Int8(v) => v.get(index).map(|x| x.to_scalar()),
            SampleBlock::Int16(v) => v.get(index).map(|x| x.to_scalar()),
            SampleBlock::Int32(v) => v.get(index).map(|x| x.to_scalar()),
            SampleBlock::Int64(v) => v.get(index).map(|x| x.to_scalar()),
            SampleBlock::UInt8(v) => v.get(index).map(|x| x.to_scalar()),
            SampleBlock::UInt16(v) => v.get(index).map(|x| x.to_scalar()),
            SampleBlock::UInt32(v) => v.get(index).map(|x| x.to_scalar()),
            SampleBlock::UInt64(v) => v.get(index).map(|x| x.to_scalar()),
            SampleBlock::Float32(v) => v.get(index).map(|x| x.to_scalar()),
            SampleBlock::Float64(v) => v.get(index).map(|x| x.to_scalar()),
            SampleBlock::Range(_) | SampleBlock::Raw { .. } => None,
        }
    }

    /// Typed view of the block; `None` if `T` is not the block's type
    pub fn as_slice<T: Sample>(&self) -> Option<&[T]> {
        T::slice(self)
    }

    pub fn as_ranges(&self) -> Option<&[RangeValue]> {
        match self {
            SampleBlock::Range(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// All elements widened to `f64`
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len())
            .filter_map(|i| self.scalar_at(i))
            .map(Scalar::as_f64)
            .collect()
    }
}

impl Default for SampleBlock {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_type_sizes() {
        assert_eq!(SampleType::Int8.size_bytes(), Some(1));
        assert_eq!(SampleType::UInt16.size_bytes(), Some(2));
        assert_eq!(SampleType::Float32.size_bytes(), Some(4));
        assert_eq!(SampleType::Int64.size_bytes(), Some(8));
        assert_eq!(SampleType::RangeInt64.size_bytes(), Some(16));
        assert_eq!(SampleType::Binary.size_bytes(), None);
        assert_eq!(SampleType::Struct.size_bytes(), None);
    }

    #[test]
    fn test_sample_type_classes() {
        assert!(SampleType::Int32.is_signed_integer());
        assert!(SampleType::UInt64.is_unsigned_integer());
        assert!(SampleType::Float64.is_numeric());
        assert!(!SampleType::String.is_numeric());
        assert!(!SampleType::RangeInt64.is_numeric());
    }

    #[test]
    fn test_decode_native_endian() {
        let bytes = (-5i32).to_ne_bytes();
        assert_eq!(SampleType::Int32.decode(&bytes), Some(Scalar::Int(-5)));
        let bytes = 2.5f64.to_ne_bytes();
        assert_eq!(SampleType::Float64.decode(&bytes), Some(Scalar::Float(2.5)));
        assert_eq!(SampleType::Int64.decode(&[0u8; 4]), None);
    }

    #[test]
    fn test_scalar_cast_truncates_toward_zero() {
        assert_eq!(Scalar::Float(-2.9).cast(SampleType::Int32), Scalar::Int(-2));
        assert_eq!(Scalar::Float(2.9).cast(SampleType::UInt8), Scalar::UInt(2));
        assert_eq!(Scalar::Int(300).cast(SampleType::UInt8), Scalar::UInt(44));
        assert_eq!(Scalar::Int(-1).cast(SampleType::UInt16), Scalar::UInt(65535));
    }

    #[test]
    fn test_linear_scalar() {
        let v = Scalar::linear(Scalar::Int(10), Scalar::Int(2), 5, SampleType::Int64);
        assert_eq!(v, Scalar::Int(20));
        let v = Scalar::linear(Scalar::Float(0.5), Scalar::Float(0.25), 2, SampleType::Float64);
        assert_eq!(v, Scalar::Float(1.0));
    }

    #[test]
    fn test_ratio_reduces() {
        let r = Ratio::new(10, 10_000).unwrap();
        assert_eq!((r.num(), r.den()), (1, 1000));
        let r = Ratio::new(1, -4).unwrap();
        assert_eq!((r.num(), r.den()), (-1, 4));
        assert!(Ratio::new(1, 0).is_none());
        assert_eq!(Ratio::per(1000).unwrap().to_string(), "1/1000");
    }

    #[test]
    fn test_lcm() {
        assert_eq!(lcm_i128(4, 6), 12);
        assert_eq!(lcm_i128(1_000_000_000, 1000), 1_000_000_000);
    }

    #[test]
    fn test_sample_block_push_and_view() {
        let mut block = SampleBlock::with_capacity(SampleType::Float64, 2).unwrap();
        assert!(block.push_scalar(Scalar::Int(3)));
        assert!(block.push_scalar(Scalar::Float(0.5)));
        assert_eq!(block.as_slice::<f64>(), Some(&[3.0, 0.5][..]));
        assert!(block.as_slice::<i32>().is_none());
        assert_eq!(block.len(), 2);
        block.truncate(1);
        assert_eq!(block.as_slice::<f64>(), Some(&[3.0][..]));
    }

    #[test]
    fn test_sample_block_ranges() {
        let mut block = SampleBlock::with_capacity(SampleType::RangeInt64, 1).unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&5i64.to_ne_bytes());
        bytes.extend_from_slice(&9i64.to_ne_bytes());
        assert!(block.push_raw(&bytes));
        assert_eq!(block.as_ranges(), Some(&[RangeValue { start: 5, end: 9 }][..]));
    }

    #[test]
    fn test_struct_types_have_no_block() {
        assert!(SampleBlock::with_capacity(SampleType::Struct, 1).is_none());
        assert!(SampleBlock::with_capacity(SampleType::Binary, 1).is_none());
    }
}
