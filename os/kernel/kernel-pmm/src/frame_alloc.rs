//! Allocation seam for page-table code.
//!
//! Code that only needs "a frame, please" (page-table walkers creating
//! intermediate tables, anonymous mappings) takes `&mut impl FrameAlloc`
//! instead of the whole allocator. A shared `&FrameAllocator` implements it,
//! so one allocator can be handed to any number of such users.

use crate::Frame;
use crate::allocator::FrameAllocator;
use crate::free_list::FreeList;
use crate::phys_mapper::PhysMapper;

/// Minimal 4 KiB frame source.
pub trait FrameAlloc {
    /// Allocate one frame, or `None` when out of memory.
    fn alloc_4k(&mut self) -> Option<Frame>;

    /// Give back a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, frame: Frame);
}

impl<M, F, const N: usize> FrameAlloc for &FrameAllocator<M, F, N>
where
    M: PhysMapper,
    F: FreeList,
{
    #[inline]
    fn alloc_4k(&mut self) -> Option<Frame> {
        self.alloc()
    }

    #[inline]
    fn free_4k(&mut self, frame: Frame) {
        self.free(frame);
    }
}
