//! Typed views over bytes read from the target.

/// Plain values that can be rebuilt from little-endian target memory
///
/// Used by [`Process::read_memory_as`](crate::Process::read_memory_as). The
/// byte slice handed to [`from_memory_bytes`](Self::from_memory_bytes) is
/// always exactly [`SIZE`](Self::SIZE) bytes long.
pub trait FromMemoryBytes: Sized
{
    /// Number of bytes the value occupies in target memory
    const SIZE: usize;

    /// Decode the value, or `None` if `bytes` is not `SIZE` bytes long.
    fn from_memory_bytes(bytes: &[u8]) -> Option<Self>;
}

macro_rules! impl_from_memory_bytes {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromMemoryBytes for $ty
            {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_memory_bytes(bytes: &[u8]) -> Option<Self>
                {
                    bytes.try_into().ok().map(<$ty>::from_le_bytes)
                }
            }
        )*
    };
}

impl_from_memory_bytes!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl<const N: usize> FromMemoryBytes for [u8; N]
{
    const SIZE: usize = N;

    fn from_memory_bytes(bytes: &[u8]) -> Option<Self>
    {
        bytes.try_into().ok()
    }
}
