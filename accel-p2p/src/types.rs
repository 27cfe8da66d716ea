/// Rank of a participant in the exchange (0-indexed).
pub type Rank = u32;

/// Label disambiguating concurrent message streams between a pair of ranks.
pub type Tag = u32;

/// Engine-side session identifier correlated with one rank.
pub type SessionId = u32;

/// Element types a [`Buffer`](crate::memory::Buffer) can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    F32 = 0,
    F64 = 1,
    I8 = 4,
    I32 = 5,
    I64 = 6,
    U8 = 7,
    U32 = 8,
    U64 = 9,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
            DataType::F64 | DataType::I64 | DataType::U64 => 8,
            DataType::I8 | DataType::U8 => 1,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::I8 => "i8",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::U8 => "u8",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
        }
    }

    /// Decode the wire representation.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(DataType::F32),
            1 => Some(DataType::F64),
            4 => Some(DataType::I8),
            5 => Some(DataType::I32),
            6 => Some(DataType::I64),
            7 => Some(DataType::U8),
            8 => Some(DataType::U32),
            9 => Some(DataType::U64),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "f32" => Ok(DataType::F32),
            "f64" => Ok(DataType::F64),
            "i8" => Ok(DataType::I8),
            "i32" => Ok(DataType::I32),
            "i64" => Ok(DataType::I64),
            "u8" => Ok(DataType::U8),
            "u32" => Ok(DataType::U32),
            "u64" => Ok(DataType::U64),
            other => Err(format!("unknown data type '{other}'")),
        }
    }
}

/// A scalar that can live in a [`Buffer`](crate::memory::Buffer) and cross the wire.
///
/// Elements travel little-endian. Comparison is exact for integers and
/// tolerant (relative `1e-5`, absolute `1e-8`) for floats.
pub trait Element: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Wire/device type tag for this element.
    const DTYPE: DataType;

    /// The value `i` cast to this type (wrapping for narrow integers).
    fn from_index(i: usize) -> Self;

    /// Write the little-endian encoding into `out` (exactly `DTYPE.size_in_bytes()` bytes).
    fn write_le(self, out: &mut [u8]);

    /// Read from a little-endian slice of exactly `DTYPE.size_in_bytes()` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Equality up to floating-point rounding.
    fn approx_eq(self, other: Self) -> bool;
}

/// Relative tolerance used by float comparison.
pub const RTOL: f64 = 1e-5;
/// Absolute tolerance used by float comparison.
pub const ATOL: f64 = 1e-8;

macro_rules! impl_element_int {
    ($($ty:ty => $dt:expr),*) => {
        $(
            impl Element for $ty {
                const DTYPE: DataType = $dt;

                #[inline]
                fn from_index(i: usize) -> Self {
                    i as $ty
                }

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                #[inline]
                fn approx_eq(self, other: Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

impl_element_int!(
    i8 => DataType::I8,
    i32 => DataType::I32,
    i64 => DataType::I64,
    u8 => DataType::U8,
    u32 => DataType::U32,
    u64 => DataType::U64
);

macro_rules! impl_element_float {
    ($($ty:ty => $dt:expr),*) => {
        $(
            impl Element for $ty {
                const DTYPE: DataType = $dt;

                #[inline]
                fn from_index(i: usize) -> Self {
                    i as $ty
                }

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                #[inline]
                fn approx_eq(self, other: Self) -> bool {
                    if self == other {
                        return true;
                    }
                    let (a, b) = (self as f64, other as f64);
                    if !a.is_finite() || !b.is_finite() {
                        return false;
                    }
                    (a - b).abs() <= ATOL + RTOL * b.abs()
                }
            }
        )*
    };
}

impl_element_float!(f32 => DataType::F32, f64 => DataType::F64);

/// Encode a slice of elements into little-endian bytes.
pub fn encode_elements<T: Element>(values: &[T]) -> Vec<u8> {
    let size = T::DTYPE.size_in_bytes();
    let mut out = vec![0u8; values.len() * size];
    for (v, chunk) in values.iter().zip(out.chunks_exact_mut(size)) {
        v.write_le(chunk);
    }
    out
}

/// Decode little-endian bytes into `dst`, element by element.
///
/// Decodes `min(dst.len(), bytes.len() / size)` elements and returns that count.
pub fn decode_elements<T: Element>(bytes: &[u8], dst: &mut [T]) -> usize {
    let size = T::DTYPE.size_in_bytes();
    let mut n = 0;
    for (slot, chunk) in dst.iter_mut().zip(bytes.chunks_exact(size)) {
        *slot = T::read_le(chunk);
        n += 1;
    }
    n
}

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u16 = 1;
