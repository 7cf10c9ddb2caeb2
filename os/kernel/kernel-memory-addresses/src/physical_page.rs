use crate::{PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// Physical page base for size `S`.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// Page containing `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self {
            base: pa.as_u64() & !S::MASK,
            _size: PhantomData,
        }
    }

    /// Page starting exactly at `pa`, or `None` if `pa` is not aligned.
    #[inline]
    #[must_use]
    pub const fn try_from_addr(pa: PhysicalAddress) -> Option<Self> {
        if pa.is_aligned::<S>() {
            Some(Self::containing(pa))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// The page directly above this one, `None` on address-space overflow.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.base.checked_add(S::SIZE) {
            Some(base) => Some(Self {
                base,
                _size: PhantomData,
            }),
            None => None,
        }
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({:#018X})", S::as_str(), self.base)
    }
}
