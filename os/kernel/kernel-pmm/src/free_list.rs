//! # Free frame bookkeeping
//!
//! The pool keeps its free frames behind the [`FreeList`] trait so the
//! storage strategy can change without touching the allocator:
//!
//! - [`IntrusiveFreeList`] threads a singly-linked LIFO list through the free
//!   frames themselves. It costs no memory beyond the list head, but every
//!   push writes a link into the frame being freed.
//! - [`FrameStack`] keeps free frame addresses in a fixed array next to the
//!   allocator. It never writes into frame memory for bookkeeping.
//!
//! Neither is synchronized; the allocator only touches them under its lock.

use kernel_memory_addresses::PhysicalAddress;

use crate::Frame;
use crate::phys_mapper::PhysMapper;

/// A set of free frames with stack discipline.
pub trait FreeList {
    /// Add `frame` to the free set.
    ///
    /// # Safety
    /// - `frame` must not already be in the set.
    /// - Nobody else may access `frame` until it is popped again; the
    ///   implementation may store its bookkeeping inside it via `mapper`.
    unsafe fn push<M: PhysMapper>(&mut self, mapper: &M, frame: Frame);

    /// Remove and return some free frame, or `None` if the set is empty.
    fn pop<M: PhysMapper>(&mut self, mapper: &M) -> Option<Frame>;

    /// Number of frames currently in the set.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Link stored in the first bytes of a free frame.
#[repr(C)]
struct FreeLink {
    /// Base of the next free frame, or [`FreeLink::END`].
    next: u64,
}

impl FreeLink {
    /// Never frame-aligned, so it cannot collide with a real frame base.
    const END: u64 = u64::MAX;
}

/// Singly-linked free list stored inside the free frames.
#[derive(Debug, Default)]
pub struct IntrusiveFreeList {
    head: Option<Frame>,
    len: usize,
}

impl IntrusiveFreeList {
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }
}

impl FreeList for IntrusiveFreeList {
    unsafe fn push<M: PhysMapper>(&mut self, mapper: &M, frame: Frame) {
        // SAFETY: the caller hands us exclusive ownership of `frame`.
        let link: &mut FreeLink = unsafe { mapper.phys_to_mut(frame.base()) };
        link.next = self.head.map_or(FreeLink::END, |f| f.base().as_u64());
        self.head = Some(frame);
        self.len += 1;
    }

    fn pop<M: PhysMapper>(&mut self, mapper: &M) -> Option<Frame> {
        let frame = self.head?;
        // SAFETY: every frame on the list was pushed with exclusive ownership
        // and still holds the link written by `push`.
        let link: &mut FreeLink = unsafe { mapper.phys_to_mut(frame.base()) };
        self.head = match link.next {
            FreeLink::END => None,
            next => Some(Frame::containing(PhysicalAddress::new(next))),
        };
        self.len -= 1;
        Some(frame)
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Fixed-capacity stack of free frame bases.
///
/// `N` must be at least the number of frames ever pushed; the allocator
/// guarantees this by sizing it like its reference count table.
pub struct FrameStack<const N: usize> {
    slots: [u64; N],
    len: usize,
}

impl<const N: usize> FrameStack<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [0; N],
            len: 0,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for FrameStack<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FreeList for FrameStack<N> {
    unsafe fn push<M: PhysMapper>(&mut self, _mapper: &M, frame: Frame) {
        assert!(self.len < N, "free frame stack overflow at {frame}");
        self.slots[self.len] = frame.base().as_u64();
        self.len += 1;
    }

    fn pop<M: PhysMapper>(&mut self, _mapper: &M) -> Option<Frame> {
        self.len = self.len.checked_sub(1)?;
        Some(Frame::containing(PhysicalAddress::new(self.slots[self.len])))
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys_mapper::HhdmPhysMapper;
    use core::cell::UnsafeCell;

    const BASE: u64 = 0x4000_0000;

    #[repr(C, align(4096))]
    struct Page(UnsafeCell<[u8; 4096]>);

    /// Four pages of host memory posing as physical frames at `BASE`.
    struct Ram {
        pages: Vec<Page>,
    }

    impl Ram {
        fn new(n: usize) -> Self {
            Self {
                pages: (0..n).map(|_| Page(UnsafeCell::new([0; 4096]))).collect(),
            }
        }

        fn frame(i: u64) -> Frame {
            Frame::containing(PhysicalAddress::new(BASE + i * 4096))
        }
    }

    impl PhysMapper for Ram {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let offset = pa.as_u64() - BASE;
            let page = &self.pages[usize::try_from(offset >> 12).unwrap()];
            let byte = usize::try_from(offset & 0xfff).unwrap();
            unsafe { &mut *page.0.get().cast::<u8>().add(byte).cast::<T>() }
        }
    }

    #[test]
    fn intrusive_list_is_lifo() {
        let ram = Ram::new(4);
        let mut list = IntrusiveFreeList::new();
        for i in 0..4 {
            unsafe { list.push(&ram, Ram::frame(i)) };
        }
        assert_eq!(list.len(), 4);

        for i in (0..4).rev() {
            assert_eq!(list.pop(&ram), Some(Ram::frame(i)));
        }
        assert!(list.is_empty());
        assert_eq!(list.pop(&ram), None);
    }

    #[test]
    fn intrusive_list_stores_link_in_frame() {
        let ram = Ram::new(2);
        let mut list = IntrusiveFreeList::new();
        unsafe {
            list.push(&ram, Ram::frame(0));
            list.push(&ram, Ram::frame(1));
        }

        let link: &mut u64 = unsafe { ram.phys_to_mut(Ram::frame(1).base()) };
        assert_eq!(*link, BASE);
        let tail: &mut u64 = unsafe { ram.phys_to_mut(Ram::frame(0).base()) };
        assert_eq!(*tail, u64::MAX);
    }

    #[test]
    fn frame_at_physical_zero_is_a_valid_link() {
        struct Low(Ram);
        impl PhysMapper for Low {
            unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
                unsafe { self.0.phys_to_mut(PhysicalAddress::new(pa.as_u64() + BASE)) }
            }
        }

        let low = Low(Ram::new(2));
        let zero = Frame::containing(PhysicalAddress::zero());
        let one = Frame::containing(PhysicalAddress::new(4096));
        let mut list = IntrusiveFreeList::new();
        unsafe {
            list.push(&low, zero);
            list.push(&low, one);
        }
        assert_eq!(list.pop(&low), Some(one));
        assert_eq!(list.pop(&low), Some(zero));
        assert_eq!(list.pop(&low), None);
    }

    #[test]
    fn frame_stack_never_touches_memory() {
        // HHDM addresses are not mapped in a host test; any access would fault.
        let mapper = HhdmPhysMapper;
        let mut stack = FrameStack::<3>::new();
        assert_eq!(stack.capacity(), 3);
        for i in 0..3 {
            unsafe { stack.push(&mapper, Ram::frame(i)) };
        }
        assert_eq!(stack.pop(&mapper), Some(Ram::frame(2)));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    #[should_panic(expected = "free frame stack overflow")]
    fn frame_stack_overflow_is_fatal() {
        let mapper = HhdmPhysMapper;
        let mut stack = FrameStack::<1>::new();
        unsafe {
            stack.push(&mapper, Ram::frame(0));
            stack.push(&mapper, Ram::frame(1));
        }
    }
}
