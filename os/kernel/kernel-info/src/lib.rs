//! # Kernel Configuration
//!
//! Compile-time constants shared by the kernel's memory subsystems. The
//! physical frame allocator sizes its bookkeeping tables from these values,
//! so they must agree with the linker script and the boot loader's view of
//! physical memory.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1MiB)         │
//!             │  (BIOS, VGA, DMA buffers)       │
//! POOL_START  ├─────────────────────────────────┤ 0x0010_0000 (1 MiB)
//!             │       Kernel Image              │
//!             │   (Text, Data, BSS)             │
//!             ├ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┤ end of image
//!             │    Frame Pool                   │
//!             │  (Managed by the frame          │
//!             │   allocator, 4 KiB frames)      │
//! POOL_END    └─────────────────────────────────┘ 0x0800_0000 (128 MiB)
//! ```
//!
//! The window `[POOL_START, POOL_END)` is what the allocator's reference
//! count table covers. The kernel hands the allocator only the part of that
//! window that lies past its own image.
//!
//! ## Validation
//! Every relationship between the constants is checked by a `const`
//! assertion, so an inconsistent configuration fails the build instead of
//! corrupting memory at runtime.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod memory;
