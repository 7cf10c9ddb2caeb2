//! # Physical Frame Allocator
//!
//! Hands out 4 KiB physical frames from a fixed pool and tracks how many
//! address spaces share each one, so fork can share pages copy-on-write and
//! the page-fault handler can split them on the first write.
//!
//! ## Architecture Overview
//!
//! ```text
//!   page fault handler        fork            page-table code
//!          │                   │                     │
//!   cow_materialize       cow_retain           FrameAlloc
//!          │                   │                     │
//! ┌────────▼───────────────────▼─────────────────────▼───────┐
//! │                    FrameAllocator                        │
//! │   init · alloc · free · cow_retain · cow_release ·       │
//! │   cow_materialize · cow_refcount · cow_flags · stats     │
//! │ ┌──────────────────────── SpinLock ───────────────────┐  │
//! │ │  FreeList (intrusive │ stack)   SharingTable        │  │
//! │ │  free frames, LIFO              refcount + flags    │  │
//! │ └─────────────────────────────────────────────────────┘  │
//! └──────────────────────────┬───────────────────────────────┘
//!                            │ PhysMapper (HHDM / test arena)
//!                     physical frames
//! ```
//!
//! ## Frame lifecycle
//!
//! ```text
//!            init                 alloc
//!  (outside) ─────► free (rc=0) ─────────► private (rc=1)
//!                      ▲                      │   ▲
//!                      │ free, rc→0           │   │ free / cow_release /
//!                      │                      ▼   │ cow_materialize
//!                      └──────────────── shared (rc≥2)
//!                                cow_retain ↺
//! ```
//!
//! A frame is free if and only if its reference count is zero. All
//! transitions of the count, and the free-list moves they trigger, happen
//! under the allocator's single lock.
//!
//! ## Usage
//! ```rust
//! use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
//! use kernel_pmm::{FrameAllocator, IntrusiveFreeList, PageFlags, PhysMapper};
//!
//! # #[repr(C, align(4096))]
//! # struct Ram(core::cell::UnsafeCell<[[u8; 4096]; 4]>);
//! # unsafe impl Sync for Ram {}
//! # impl PhysMapper for Ram {
//! #     unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
//! #         unsafe { &mut *self.0.get().cast::<u8>().add(pa.as_u64() as usize).cast() }
//! #     }
//! # }
//! # let ram = Ram(core::cell::UnsafeCell::new([[0; 4096]; 4]));
//! let pool = PhysicalRange::new(PhysicalAddress::zero(), PhysicalAddress::new(4 * 4096));
//! let frames = FrameAllocator::<_, IntrusiveFreeList, 4>::new(&ram, pool);
//! unsafe { frames.init(pool) }.unwrap();
//!
//! let page = frames.alloc().unwrap();
//! frames.cow_retain(page, PageFlags::PRESENT | PageFlags::WRITABLE);
//! assert_eq!(frames.cow_refcount(page), 2);
//!
//! let private = frames.cow_materialize(page, true).unwrap();
//! assert_ne!(private, page);
//! assert_eq!(frames.cow_refcount(page), 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod allocator;
pub mod error;
pub mod flags;
pub mod frame_alloc;
pub mod free_list;
pub mod phys_mapper;
pub mod sharing;

use kernel_memory_addresses::{PhysicalPage, Size4K};

pub use allocator::{FrameAllocator, FrameStats, KERNEL_POOL, KernelFrameAllocator};
pub use error::FrameError;
pub use flags::PageFlags;
pub use frame_alloc::FrameAlloc;
pub use free_list::{FrameStack, FreeList, IntrusiveFreeList};
pub use phys_mapper::{FrameBytes, HhdmPhysMapper, PhysMapper};
pub use sharing::FrameInfo;

/// A 4 KiB physical frame, identified by its base address.
pub type Frame = PhysicalPage<Size4K>;
