//! # Frame allocator facade
//!
//! [`FrameAllocator`] owns the free list and the sharing table and guards
//! both with one [`SpinLock`]. Every operation validates its argument and
//! applies its update inside the same critical section; poison fills and
//! content copies happen after the lock is dropped.
//!
//! ## Failure tiers
//!
//! | Situation | Reported as |
//! |-----------|-------------|
//! | Pool exhausted | `None` from [`alloc`](FrameAllocator::alloc) / [`cow_materialize`](FrameAllocator::cow_materialize) |
//! | Bad range passed to [`init`](FrameAllocator::init) | `Err(FrameError)` |
//! | Misaligned / out-of-range frame, count outside its bound | panic (or `Err` from the `try_` variant) |
//! | Sharers disagree on write access in [`cow_retain`](FrameAllocator::cow_retain) | `log::warn!` + [`FrameStats::flag_mismatches`] |

use kernel_info::memory::{ALLOC_POISON, FRAME_SIZE, FREE_POISON, POOL_END, POOL_FRAMES, POOL_START};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, Size4K};
use kernel_sync::SpinLock;

use crate::Frame;
use crate::error::FrameError;
use crate::flags::PageFlags;
use crate::free_list::{FrameStack, FreeList, IntrusiveFreeList};
use crate::phys_mapper::{HhdmPhysMapper, PhysMapper, copy_frame, fill_frame};
use crate::sharing::{Retained, SharingTable};

/// The kernel's physical window, `[POOL_START, POOL_END)`.
pub const KERNEL_POOL: PhysicalRange =
    PhysicalRange::new(PhysicalAddress::new(POOL_START), PhysicalAddress::new(POOL_END));

/// The allocator as configured for the kernel: HHDM access, intrusive list.
pub type KernelFrameAllocator = FrameAllocator<HhdmPhysMapper, IntrusiveFreeList, POOL_FRAMES>;

/// Point-in-time counters, see [`FrameAllocator::stats`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames handed to the pool by [`FrameAllocator::init`].
    pub total: usize,
    /// Frames on the free list.
    pub free: usize,
    /// Frames with a reference count of at least one.
    pub in_use: usize,
    /// Frames with a reference count of at least two.
    pub shared: usize,
    /// Retains whose write permission disagreed with the recorded flags.
    pub flag_mismatches: u64,
}

struct PoolState<F, const N: usize> {
    free: F,
    table: SharingTable<N>,
    /// Set once by `init`; every frame argument must lie inside.
    managed: Option<PhysicalRange>,
    total: usize,
    flag_mismatches: u64,
}

impl<F, const N: usize> PoolState<F, N> {
    fn frame(&self, pa: PhysicalAddress) -> Result<Frame, FrameError> {
        let frame = Frame::try_from_addr(pa).ok_or(FrameError::Misaligned(pa))?;
        let managed = self.managed.ok_or(FrameError::NotInitialized)?;
        if !managed.contains(pa) {
            return Err(FrameError::OutOfRange(pa));
        }
        Ok(frame)
    }
}

/// Physical frame allocator with copy-on-write reference counts.
///
/// - `M` maps physical frames into the current address space.
/// - `F` stores the free frames.
/// - `N` is the number of frames the layout may span; it sizes the
///   reference count table.
///
/// The allocator is meant to be created once during boot and then shared by
/// reference with everything that needs frames (the page-fault handler,
/// fork, page-table code via [`FrameAlloc`](crate::FrameAlloc)).
pub struct FrameAllocator<M, F, const N: usize> {
    mapper: M,
    layout: PhysicalRange,
    state: SpinLock<PoolState<F, N>>,
}

impl<M: PhysMapper, const N: usize> FrameAllocator<M, IntrusiveFreeList, N> {
    /// Allocator whose free list lives inside the free frames.
    ///
    /// # Panics
    /// If `layout` is not frame-aligned or spans more than `N` frames.
    #[must_use]
    pub const fn new(mapper: M, layout: PhysicalRange) -> Self {
        Self::with_free_list(mapper, layout, IntrusiveFreeList::new())
    }
}

impl<M: PhysMapper, const N: usize> FrameAllocator<M, FrameStack<N>, N> {
    /// Allocator keeping its free frames in a side array.
    ///
    /// # Panics
    /// If `layout` is not frame-aligned or spans more than `N` frames.
    #[must_use]
    pub const fn with_frame_stack(mapper: M, layout: PhysicalRange) -> Self {
        Self::with_free_list(mapper, layout, FrameStack::new())
    }
}

impl KernelFrameAllocator {
    /// The kernel's allocator over [`KERNEL_POOL`]; usable in a `static`.
    #[must_use]
    pub const fn kernel() -> Self {
        Self::new(HhdmPhysMapper, KERNEL_POOL)
    }
}

impl<M, F, const N: usize> FrameAllocator<M, F, N>
where
    M: PhysMapper,
    F: FreeList,
{
    /// # Panics
    /// If `layout` is not frame-aligned or spans more than `N` frames.
    #[must_use]
    pub const fn with_free_list(mapper: M, layout: PhysicalRange, free: F) -> Self {
        assert!(layout.start().is_aligned::<Size4K>() && layout.end().is_aligned::<Size4K>());
        assert!(layout.len() / FRAME_SIZE <= N as u64, "layout exceeds table capacity");
        Self {
            mapper,
            layout,
            state: SpinLock::new(PoolState {
                free,
                table: SharingTable::new(layout.start()),
                managed: None,
                total: 0,
                flag_mismatches: 0,
            }),
        }
    }

    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// The physical window covered by the reference count table.
    #[must_use]
    pub const fn layout(&self) -> PhysicalRange {
        self.layout
    }

    /// The frames handed over by [`init`](Self::init), if it ran.
    #[must_use]
    pub fn managed_range(&self) -> Option<PhysicalRange> {
        self.state.with_lock(|s| s.managed)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.managed_range().is_some()
    }

    /// Hand every whole frame of `range` to the pool. Returns how many.
    ///
    /// The start is rounded up to a frame boundary and a trailing partial
    /// frame is ignored. Each frame is marked in use and then released
    /// through the regular free path.
    ///
    /// # Errors
    /// - [`FrameError::EmptyRange`] if `range` holds no whole frame.
    /// - [`FrameError::RangeOutsideLayout`] if `range` leaves the layout.
    /// - [`FrameError::AlreadyInitialized`] on a second call.
    ///
    /// # Safety
    /// `range` must be RAM that nothing else uses (in particular not the
    /// kernel image), and the mapper must map all of it writable for as long
    /// as the allocator lives.
    pub unsafe fn init(&self, range: PhysicalRange) -> Result<usize, FrameError> {
        let first = range
            .pages::<Size4K>()
            .next()
            .ok_or(FrameError::EmptyRange(range))?;
        if !self.layout.contains_range(&range) {
            return Err(FrameError::RangeOutsideLayout(range));
        }
        let managed = PhysicalRange::new(first.base(), range.end().align_down::<Size4K>());

        self.state.with_lock(|s| {
            if s.managed.is_some() {
                return Err(FrameError::AlreadyInitialized);
            }
            s.managed = Some(managed);
            for frame in managed.pages::<Size4K>() {
                s.table.track(frame);
                s.total += 1;
            }
            Ok(())
        })?;

        let mut added = 0;
        for frame in managed.pages::<Size4K>() {
            self.free(frame);
            added += 1;
        }

        log::info!("frame pool: {added} frames in {managed:?}");
        Ok(added)
    }

    /// Take a frame off the free list.
    ///
    /// The frame comes back with a reference count of one and every byte set
    /// to [`ALLOC_POISON`]. `None` means the pool is exhausted.
    #[must_use]
    pub fn alloc(&self) -> Option<Frame> {
        let frame = self.state.with_lock(|s| {
            let frame = s.free.pop(&self.mapper)?;
            s.table.track(frame);
            Some(frame)
        });

        let Some(frame) = frame else {
            log::trace!("frame pool exhausted");
            return None;
        };

        // SAFETY: the frame just left the free list and is owned by us alone.
        unsafe { fill_frame(&self.mapper, frame, ALLOC_POISON) };
        log::trace!("alloc {frame}");
        Some(frame)
    }

    /// Drop one owner of `pa`; the last owner returns it to the pool.
    ///
    /// # Panics
    /// See [`try_free`](Self::try_free).
    #[track_caller]
    pub fn free(&self, pa: impl Into<PhysicalAddress>) {
        if let Err(e) = self.try_free(pa) {
            fatal("free", e);
        }
    }

    /// [`free`](Self::free) that reports contract violations instead of panicking.
    ///
    /// # Errors
    /// - [`FrameError::Misaligned`] / [`FrameError::OutOfRange`] for a bad address.
    /// - [`FrameError::NotInUse`] if the frame is already free.
    pub fn try_free(&self, pa: impl Into<PhysicalAddress>) -> Result<(), FrameError> {
        let pa = pa.into();
        let (frame, remaining) = self.state.with_lock(|s| {
            let frame = s.frame(pa)?;
            Ok::<_, FrameError>((frame, s.table.put(frame)?))
        })?;

        if remaining > 0 {
            log::trace!("free {frame}: still {remaining} owner(s)");
            return Ok(());
        }

        // SAFETY: the count just dropped to zero under the lock; no owner remains.
        unsafe { self.reclaim(frame) };
        Ok(())
    }

    /// Return a frame whose count reached zero to the free list.
    ///
    /// # Safety
    /// The caller must have observed the count of `frame` drop to zero.
    unsafe fn reclaim(&self, frame: Frame) {
        unsafe { fill_frame(&self.mapper, frame, FREE_POISON) };
        self.state
            .with_lock(|s| unsafe { s.free.push(&self.mapper, frame) });
        log::trace!("reclaimed {frame}");
    }

    /// Register another owner of `pa`, mapped with `flags`.
    ///
    /// Called by fork when a child starts sharing a frame with its parent.
    /// The first share records `flags`; later shares are compared against
    /// that record and a write-permission mismatch is logged, not rejected.
    ///
    /// # Panics
    /// See [`try_cow_retain`](Self::try_cow_retain).
    #[track_caller]
    pub fn cow_retain(&self, pa: impl Into<PhysicalAddress>, flags: PageFlags) {
        if let Err(e) = self.try_cow_retain(pa, flags) {
            fatal("cow_retain", e);
        }
    }

    /// # Errors
    /// - [`FrameError::Misaligned`] / [`FrameError::OutOfRange`] for a bad address.
    /// - [`FrameError::NotInUse`] if the frame is free.
    pub fn try_cow_retain(
        &self,
        pa: impl Into<PhysicalAddress>,
        flags: PageFlags,
    ) -> Result<(), FrameError> {
        let pa = pa.into();
        let (frame, outcome) = self.state.with_lock(|s| {
            let frame = s.frame(pa)?;
            let outcome = s.table.retain(frame, flags)?;
            if matches!(outcome, Retained::WriteMismatch { .. }) {
                s.flag_mismatches += 1;
            }
            Ok::<_, FrameError>((frame, outcome))
        })?;

        match outcome {
            Retained::FirstShare => log::trace!("cow share {frame} as {flags:?}"),
            Retained::Shared => {}
            Retained::WriteMismatch { recorded } => {
                log::warn!("cow share {frame}: write access {flags:?} disagrees with {recorded:?}");
            }
        }
        Ok(())
    }

    /// Drop a sharer's claim on `pa` after it obtained a private copy.
    ///
    /// Never frees the frame: another owner must remain.
    ///
    /// # Panics
    /// See [`try_cow_release`](Self::try_cow_release).
    #[track_caller]
    pub fn cow_release(&self, pa: impl Into<PhysicalAddress>) {
        if let Err(e) = self.try_cow_release(pa) {
            fatal("cow_release", e);
        }
    }

    /// # Errors
    /// - [`FrameError::Misaligned`] / [`FrameError::OutOfRange`] for a bad address.
    /// - [`FrameError::NotInUse`] if the frame is free.
    /// - [`FrameError::NotShared`] if the caller is the only owner.
    pub fn try_cow_release(&self, pa: impl Into<PhysicalAddress>) -> Result<(), FrameError> {
        let pa = pa.into();
        self.state.with_lock(|s| {
            let frame = s.frame(pa)?;
            s.table.release(frame).map(|_| ())
        })
    }

    /// Resolve a write fault on `pa` into a frame the faulting sharer may write.
    ///
    /// - Sole owner: returns `pa`'s frame itself; nothing changes.
    /// - Shared: returns a fresh frame (with `pa`'s contents if
    ///   `copy_contents`) and drops the caller's claim on the original.
    /// - `None` if no frame is available; the original is left untouched.
    ///
    /// # Panics
    /// See [`try_cow_materialize`](Self::try_cow_materialize).
    #[must_use]
    #[track_caller]
    pub fn cow_materialize(&self, pa: impl Into<PhysicalAddress>, copy_contents: bool) -> Option<Frame> {
        self.try_cow_materialize(pa, copy_contents)
            .unwrap_or_else(|e| fatal("cow_materialize", e))
    }

    /// # Errors
    /// - [`FrameError::Misaligned`] / [`FrameError::OutOfRange`] for a bad address.
    /// - [`FrameError::NotInUse`] if the frame is free.
    pub fn try_cow_materialize(
        &self,
        pa: impl Into<PhysicalAddress>,
        copy_contents: bool,
    ) -> Result<Option<Frame>, FrameError> {
        let pa = pa.into();
        let (original, owners) = self.state.with_lock(|s| {
            let frame = s.frame(pa)?;
            Ok::<_, FrameError>((frame, s.table.in_use(frame)?.refcount))
        })?;

        if owners == 1 {
            return Ok(Some(original));
        }

        // The caller's claim keeps the original alive (and read-only for every
        // sharer) until it is dropped below, so the copy sees stable contents.
        let Some(copy) = self.alloc() else {
            log::warn!("cow fault on {original}: no frame for a private copy");
            return Ok(None);
        };
        if copy_contents {
            // SAFETY: `copy` is freshly allocated; `original` is pinned by our claim.
            unsafe { copy_frame(&self.mapper, original, copy) };
        }

        let remaining = match self.state.with_lock(|s| s.table.put(original)) {
            Ok(remaining) => remaining,
            Err(e) => {
                self.free(copy);
                return Err(e);
            }
        };
        if remaining == 0 {
            // Every other sharer left while we were copying.
            // SAFETY: the count dropped to zero under the lock.
            unsafe { self.reclaim(original) };
        }

        log::debug!("cow fault on {original}: private copy {copy}, {remaining} owner(s) left");
        Ok(Some(copy))
    }

    /// Current number of owners of `pa`.
    ///
    /// # Panics
    /// See [`try_cow_refcount`](Self::try_cow_refcount).
    #[must_use]
    #[track_caller]
    pub fn cow_refcount(&self, pa: impl Into<PhysicalAddress>) -> u32 {
        self.try_cow_refcount(pa)
            .unwrap_or_else(|e| fatal("cow_refcount", e))
    }

    /// # Errors
    /// - [`FrameError::Misaligned`] / [`FrameError::OutOfRange`] for a bad address.
    /// - [`FrameError::NotInUse`] if the frame is free.
    pub fn try_cow_refcount(&self, pa: impl Into<PhysicalAddress>) -> Result<u32, FrameError> {
        let pa = pa.into();
        self.state.with_lock(|s| {
            let frame = s.frame(pa)?;
            Ok(s.table.in_use(frame)?.refcount)
        })
    }

    /// Protection bits recorded when `pa` was first shared, `None` if it never was.
    ///
    /// # Panics
    /// See [`try_cow_flags`](Self::try_cow_flags).
    #[must_use]
    #[track_caller]
    pub fn cow_flags(&self, pa: impl Into<PhysicalAddress>) -> Option<PageFlags> {
        self.try_cow_flags(pa)
            .unwrap_or_else(|e| fatal("cow_flags", e))
    }

    /// # Errors
    /// - [`FrameError::Misaligned`] / [`FrameError::OutOfRange`] for a bad address.
    /// - [`FrameError::NotInUse`] if the frame is free.
    pub fn try_cow_flags(
        &self,
        pa: impl Into<PhysicalAddress>,
    ) -> Result<Option<PageFlags>, FrameError> {
        let pa = pa.into();
        self.state.with_lock(|s| {
            let frame = s.frame(pa)?;
            Ok(s.table.in_use(frame)?.flags)
        })
    }

    /// Snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.state.with_lock(|s| {
            let (in_use, shared) = s.table.census();
            FrameStats {
                total: s.total,
                free: s.free.len(),
                in_use,
                shared,
                flag_mismatches: s.flag_mismatches,
            }
        })
    }
}

/// Abort on a broken calling contract. Continuing with corrupt sharing
/// metadata would hand one process's memory to another.
#[cold]
#[track_caller]
fn fatal(op: &str, err: FrameError) -> ! {
    log::error!("{op}: {err}");
    panic!("{op}: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    static KERNEL_FRAMES: KernelFrameAllocator = KernelFrameAllocator::kernel();

    #[test]
    fn kernel_allocator_is_const_constructible() {
        assert_eq!(KERNEL_FRAMES.layout(), KERNEL_POOL);
        assert!(!KERNEL_FRAMES.is_initialized());
        assert_eq!(KERNEL_FRAMES.stats(), FrameStats::default());
    }

    #[test]
    fn operations_before_init_are_rejected() {
        let pa = PhysicalAddress::new(POOL_START);
        assert_eq!(KERNEL_FRAMES.try_free(pa), Err(FrameError::NotInitialized));
        assert_eq!(KERNEL_FRAMES.try_cow_refcount(pa), Err(FrameError::NotInitialized));
        assert!(KERNEL_FRAMES.alloc().is_none());
    }

    #[test]
    fn misalignment_is_reported_first() {
        let pa = PhysicalAddress::new(POOL_START + 8);
        assert_eq!(KERNEL_FRAMES.try_free(pa), Err(FrameError::Misaligned(pa)));
    }

    #[test]
    fn init_rejects_ranges_outside_the_layout() {
        let below = PhysicalRange::new(PhysicalAddress::zero(), PhysicalAddress::new(POOL_START + 0x4000));
        let err = unsafe { KERNEL_FRAMES.init(below) };
        assert_eq!(err, Err(FrameError::RangeOutsideLayout(below)));

        let sliver = PhysicalRange::new(PhysicalAddress::new(POOL_START + 1), PhysicalAddress::new(POOL_START + 0x1800));
        let err = unsafe { KERNEL_FRAMES.init(sliver) };
        assert_eq!(err, Err(FrameError::EmptyRange(sliver)));
        assert!(!KERNEL_FRAMES.is_initialized());
    }

    #[test]
    #[should_panic(expected = "layout exceeds table capacity")]
    fn layout_larger_than_table_is_rejected() {
        let layout = PhysicalRange::new(PhysicalAddress::zero(), PhysicalAddress::new(3 * FRAME_SIZE));
        let _ = FrameAllocator::<_, IntrusiveFreeList, 2>::new(HhdmPhysMapper, layout);
    }
}
