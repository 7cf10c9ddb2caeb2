//! Protection bits recorded for shared frames.

bitflags::bitflags! {
    /// Leaf page-table entry bits as seen by the frame allocator.
    ///
    /// The allocator only interprets [`WRITABLE`](Self::WRITABLE); the rest
    /// are carried so the page-fault path can restore the full mapping intent
    /// once a shared frame is split. Unknown bits are retained verbatim.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct PageFlags: u64 {
        /// Mapping is valid.
        const PRESENT       = 1 << 0;
        /// Writes are allowed. Cleared on both sides of a copy-on-write share.
        const WRITABLE      = 1 << 1;
        /// Accessible from ring 3.
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        const GLOBAL        = 1 << 8;
        /// Software bit (available to the OS): the frame is shared copy-on-write.
        const COW           = 1 << 9;
        const NO_EXECUTE    = 1 << 63;

        const _ = !0;
    }
}

impl PageFlags {
    #[inline]
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    /// `true` if both sets agree on the write permission.
    #[inline]
    #[must_use]
    pub const fn same_write_access(self, other: Self) -> bool {
        self.is_writable() == other.is_writable()
    }

    /// Bits for a mapping that now shares its frame: read-only, marked COW.
    ///
    /// Only a mapping that was writable gains the COW mark; a read-only page
    /// stays read-only after a write fault too.
    #[inline]
    #[must_use]
    pub const fn into_shared(self) -> Self {
        if self.is_writable() {
            self.difference(Self::WRITABLE).union(Self::COW)
        } else {
            self
        }
    }

    /// Bits for the private frame handed out by a copy-on-write fault.
    #[inline]
    #[must_use]
    pub const fn into_private(self) -> Self {
        if self.contains(Self::COW) {
            self.difference(Self::COW).union(Self::WRITABLE)
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_mapping_drops_write_and_gains_cow() {
        let rw = PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER;
        let shared = rw.into_shared();
        assert!(!shared.is_writable());
        assert!(shared.contains(PageFlags::COW | PageFlags::USER));
        assert_eq!(shared.into_private(), rw);
    }

    #[test]
    fn read_only_mapping_is_never_made_writable() {
        let ro = PageFlags::PRESENT | PageFlags::USER | PageFlags::NO_EXECUTE;
        assert_eq!(ro.into_shared(), ro);
        assert_eq!(ro.into_private(), ro);
    }

    #[test]
    fn unknown_bits_are_retained() {
        let raw = (1_u64 << 52) | PageFlags::WRITABLE.bits();
        let flags = PageFlags::from_bits_retain(raw);
        assert_eq!(flags.into_shared().into_private().bits(), raw);
    }

    #[test]
    fn write_access_comparison_ignores_other_bits() {
        let a = PageFlags::PRESENT | PageFlags::WRITABLE;
        let b = PageFlags::WRITABLE | PageFlags::DIRTY;
        assert!(a.same_write_access(b));
        assert!(!a.same_write_access(PageFlags::PRESENT));
    }
}
