//! # Memory Layout

/// Size of one physical frame in bytes.
pub const FRAME_SIZE: u64 = 4096;

/// log2([`FRAME_SIZE`]).
pub const FRAME_SHIFT: u32 = 12;

/// Where the kernel image is placed in *physical* memory (LMA) before paging.
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

/// First physical address covered by the frame allocator's tables.
///
/// The kernel image lives at the bottom of this window; only the remainder
/// is handed to the allocator during boot.
pub const POOL_START: u64 = PHYS_LOAD;

/// Exclusive end of the physical frame pool.
pub const POOL_END: u64 = 0x0800_0000; // 128 MiB

/// Number of frames in `[POOL_START, POOL_END)`.
#[allow(clippy::cast_possible_truncation)]
pub const POOL_FRAMES: usize = ((POOL_END - POOL_START) / FRAME_SIZE) as usize;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything mapped at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Byte pattern written over a frame when it is handed out.
///
/// Callers that read a fresh frame without initializing it see `0x05`
/// everywhere instead of stale data from a previous owner.
pub const ALLOC_POISON: u8 = 0x05;

/// Byte pattern written over a frame when it returns to the pool.
pub const FREE_POISON: u8 = 0x01;

const _: () = {
    assert!(FRAME_SIZE.is_power_of_two());
    assert!(1 << FRAME_SHIFT == FRAME_SIZE);
    assert!(POOL_START.is_multiple_of(FRAME_SIZE));
    assert!(POOL_END.is_multiple_of(FRAME_SIZE));
    assert!(POOL_START < POOL_END);
    assert!(ALLOC_POISON != FREE_POISON);
};
