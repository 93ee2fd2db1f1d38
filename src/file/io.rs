//! Endian-aware primitive reading and writing.
//!
//! The [`CilIO`] trait gives the IL decoder and encoder one generic path for every
//! fixed-size operand type. All reads are bounds checked and report
//! [`crate::Error::OutOfBounds`] instead of panicking on truncated input.

use crate::{Error::OutOfBounds, Result};

/// Primitive types that can be read from and written to IL streams.
pub trait CilIO: Sized {
    /// Fixed-size byte representation of the type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),*) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Reads a little-endian `T` at `offset` and advances the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Appends `value` to `buffer` in little-endian byte order.
pub fn write_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_le_at() {
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF];
        let mut offset = 0;

        let value: u32 = read_le_at(&data, &mut offset).unwrap();
        assert_eq!(value, 0x04030201);
        assert_eq!(offset, 4);

        let value: i8 = read_le_at(&data, &mut offset).unwrap();
        assert_eq!(value, -1);
        assert_eq!(offset, 5);
    }

    #[test]
    fn test_read_le_at_out_of_bounds() {
        let data = [0x01, 0x02, 0x03];
        let mut offset = 0;

        let result: Result<u32> = read_le_at(&data, &mut offset);
        assert!(matches!(result, Err(OutOfBounds)));
        assert_eq!(offset, 0);

        let mut offset = usize::MAX;
        let result: Result<u8> = read_le_at(&data, &mut offset);
        assert!(result.is_err());
    }

    #[test]
    fn test_write_le() {
        let mut buffer = Vec::new();
        write_le(&mut buffer, 0x0201u16);
        write_le(&mut buffer, -2i32);
        write_le(&mut buffer, 1.0f32);

        assert_eq!(
            buffer,
            vec![0x01, 0x02, 0xFE, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x80, 0x3F]
        );
    }
}
