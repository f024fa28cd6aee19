/// A fixed-layout image of one hardware register block.
///
/// Implementors are `#[repr(C)]` structs made only of `u32` words. The byte length of
/// the image is a compile time constant that must match [`RegisterImage::LENGTH_DWORDS`];
/// use [`impl_register_image`](crate::impl_register_image) to get the check for free.
pub trait RegisterImage: bytemuck::Pod {
    /// Number of 32-bit registers covered by the image.
    const LENGTH_DWORDS: usize;

    /// Returns the image as register words, in register address order.
    fn as_dwords(&self) -> &[u32] {
        bytemuck::cast_slice(core::slice::from_ref(self))
    }

    /// Returns the image as raw bytes.
    fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Implements [`RegisterImage`] for a type and checks its size at compile time.
///
/// # Examples
///
/// ```
/// use ispiq_hw::{impl_register_image, RegisterImage};
///
/// #[repr(C)]
/// #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
/// struct BankCfg {
///     bank_sel: u32,
/// }
///
/// impl_register_image!(BankCfg, 1);
///
/// let cfg = BankCfg { bank_sel: 1 };
/// assert_eq!(cfg.as_dwords(), &[1]);
/// ```
#[macro_export]
macro_rules! impl_register_image {
    ($ty:ty, $dwords:expr) => {
        const _: () = assert!(::core::mem::size_of::<$ty>() == $dwords * 4);

        impl $crate::register::RegisterImage for $ty {
            const LENGTH_DWORDS: usize = $dwords;
        }
    };
}
