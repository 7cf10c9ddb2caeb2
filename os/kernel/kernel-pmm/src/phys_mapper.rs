//! # Physical memory access
//!
//! The allocator never dereferences a [`PhysicalAddress`] directly. Poison
//! fills, content copies and the intrusive free-list link all go through a
//! [`PhysMapper`], which turns a physical address into a pointer that is
//! valid in the current address space.
//!
//! - In the kernel, [`HhdmPhysMapper`] adds the higher-half direct map base.
//! - In tests, an arena of host memory stands in for physical RAM.

use kernel_info::memory::{FRAME_SIZE, HHDM_BASE};
use kernel_memory_addresses::PhysicalAddress;

use crate::Frame;

/// The raw contents of one frame.
#[allow(clippy::cast_possible_truncation)]
pub type FrameBytes = [u8; FRAME_SIZE as usize];

/// Converts physical addresses to *temporarily* usable references in the
/// current virtual address space.
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `pa` must be mapped writable in the current address space for
    ///   `size_of::<T>()` bytes and suitably aligned for `T`.
    /// - The caller must not create aliasing references to the same bytes.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { (**self).phys_to_mut(pa) }
    }
}

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// # Safety
/// - The HHDM mapping must be present and cover the referenced physical range.
#[derive(Debug, Default, Copy, Clone)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = (HHDM_BASE + pa.as_u64()) as *mut T;
        // SAFETY: Caller must ensure the physical address is valid and mapped via HHDM.
        unsafe { &mut *va }
    }
}

/// Overwrite every byte of `frame` with `byte`.
///
/// # Safety
/// The caller must own `frame` exclusively and `mapper` must map it.
#[inline]
pub(crate) unsafe fn fill_frame<M: PhysMapper>(mapper: &M, frame: Frame, byte: u8) {
    let bytes: &mut FrameBytes = unsafe { mapper.phys_to_mut(frame.base()) };
    bytes.fill(byte);
}

/// Copy the contents of `src` into `dst`.
///
/// # Safety
/// `src` and `dst` must be distinct frames mapped by `mapper`; nobody may
/// write `src` or access `dst` during the copy.
#[inline]
pub(crate) unsafe fn copy_frame<M: PhysMapper>(mapper: &M, src: Frame, dst: Frame) {
    debug_assert_ne!(src, dst);
    let from: &mut FrameBytes = unsafe { mapper.phys_to_mut(src.base()) };
    let to: &mut FrameBytes = unsafe { mapper.phys_to_mut(dst.base()) };
    to.copy_from_slice(from);
}
