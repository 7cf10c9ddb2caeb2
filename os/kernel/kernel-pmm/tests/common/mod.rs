//! Host memory posing as physical RAM for allocator tests.

#![allow(dead_code)]

use core::cell::UnsafeCell;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
use kernel_pmm::{Frame, FrameAllocator, FrameBytes, FrameStack, FreeList, IntrusiveFreeList, PhysMapper};

/// Where the arena's first frame sits in the simulated physical address space.
pub const RAM_BASE: u64 = 0x8000_0000;

#[repr(C, align(4096))]
struct RamFrame(UnsafeCell<FrameBytes>);

/// A run of 4 KiB-aligned host pages addressed as `RAM_BASE + i * 4096`.
pub struct TestRam {
    frames: Box<[RamFrame]>,
}

// SAFETY: the allocator only hands out non-overlapping references to frames it owns.
unsafe impl Sync for TestRam {}

impl TestRam {
    pub fn with_frames(n: usize) -> Self {
        Self {
            frames: (0..n).map(|_| RamFrame(UnsafeCell::new([0; 4096]))).collect(),
        }
    }

    pub fn range(&self) -> PhysicalRange {
        PhysicalRange::new(
            PhysicalAddress::new(RAM_BASE),
            PhysicalAddress::new(RAM_BASE + self.frames.len() as u64 * 4096),
        )
    }
}

impl PhysMapper for TestRam {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let offset = pa
            .as_u64()
            .checked_sub(RAM_BASE)
            .expect("physical address below test RAM");
        let frame = &self.frames[usize::try_from(offset >> 12).unwrap()];
        let byte = usize::try_from(offset & 0xfff).unwrap();
        unsafe { &mut *frame.0.get().cast::<u8>().add(byte).cast::<T>() }
    }
}

pub type Intrusive<const N: usize> = FrameAllocator<TestRam, IntrusiveFreeList, N>;
pub type Stacked<const N: usize> = FrameAllocator<TestRam, FrameStack<N>, N>;

/// `N` frames of RAM, all handed to an allocator with an intrusive free list.
pub fn intrusive_pool<const N: usize>() -> Intrusive<N> {
    let ram = TestRam::with_frames(N);
    let range = ram.range();
    let pool = FrameAllocator::new(ram, range);
    assert_eq!(unsafe { pool.init(range) }, Ok(N));
    pool
}

/// `N` frames of RAM, all handed to an allocator with a side-array free list.
pub fn stacked_pool<const N: usize>() -> Stacked<N> {
    let ram = TestRam::with_frames(N);
    let range = ram.range();
    let pool = FrameAllocator::with_frame_stack(ram, range);
    assert_eq!(unsafe { pool.init(range) }, Ok(N));
    pool
}

/// Copy of the current contents of `frame`.
pub fn read<F: FreeList, const N: usize>(pool: &FrameAllocator<TestRam, F, N>, frame: Frame) -> Vec<u8> {
    let bytes: &mut FrameBytes = unsafe { pool.mapper().phys_to_mut(frame.base()) };
    bytes.to_vec()
}

/// Fill `frame` with a recognizable pattern derived from `seed`.
pub fn scribble<F: FreeList, const N: usize>(pool: &FrameAllocator<TestRam, F, N>, frame: Frame, seed: u8) {
    let bytes: &mut FrameBytes = unsafe { pool.mapper().phys_to_mut(frame.base()) };
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = seed.wrapping_add(i as u8);
    }
}
