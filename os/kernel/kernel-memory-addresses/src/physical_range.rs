use crate::{PageSize, PhysicalAddress, PhysicalPage};
use core::fmt;
use core::marker::PhantomData;

/// Half-open span `[start, end)` of physical memory.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct PhysicalRange {
    start: PhysicalAddress,
    end: PhysicalAddress,
}

impl PhysicalRange {
    #[inline]
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self { start, end }
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        self.end
    }

    /// Length in bytes; zero for inverted ranges.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.as_u64().saturating_sub(self.start.as_u64())
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end.as_u64() <= self.start.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.as_u64() >= self.start.as_u64() && pa.as_u64() < self.end.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn contains_range(&self, other: &Self) -> bool {
        other.start.as_u64() >= self.start.as_u64() && other.end.as_u64() <= self.end.as_u64()
    }

    /// Every whole, `S`-aligned page lying inside the range.
    ///
    /// The start is rounded up; a trailing partial page is skipped.
    #[must_use]
    pub fn pages<S: PageSize>(&self) -> Pages<S> {
        let next = self.start.align_up::<S>().map_or(self.end.as_u64(), PhysicalAddress::as_u64);
        Pages {
            next,
            end: self.end.as_u64(),
            _size: PhantomData,
        }
    }
}

impl fmt::Debug for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.start, self.end)
    }
}

/// Iterator returned by [`PhysicalRange::pages`].
#[derive(Clone)]
pub struct Pages<S: PageSize> {
    next: u64,
    end: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> Iterator for Pages<S> {
    type Item = PhysicalPage<S>;

    fn next(&mut self) -> Option<Self::Item> {
        let page_end = self.next.checked_add(S::SIZE)?;
        if page_end > self.end {
            return None;
        }
        let page = PhysicalPage::containing(PhysicalAddress::new(self.next));
        self.next = page_end;
        Some(page)
    }
}
