//! # Physical Memory Address Types
//!
//! Strongly typed wrappers for physical addresses and page-aligned frame
//! bases. They are zero-cost `u64` newtypes that keep raw integers, page
//! bases and byte offsets from being mixed up in allocator code.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | Any byte address in physical memory. |
//! | [`PhysicalPage<S>`] | The aligned base of a physical page of size `S`. |
//! | [`PhysicalRange`] | A half-open `[start, end)` span of physical memory. |
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0020_1042);
//! let page = pa.page::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x0020_1000);
//! assert!(!pa.is_aligned::<Size4K>());
//! assert_eq!(PhysicalPage::<Size4K>::try_from_addr(pa), None);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_address;
mod physical_page;
mod physical_range;

pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use physical_range::{Pages, PhysicalRange};
