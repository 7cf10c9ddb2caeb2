use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};

/// Contract violations detected by the frame allocator.
///
/// Exhaustion is not an error; allocating operations report it as `None`.
/// Everything here means the caller broke the allocator's calling
/// convention. The non-`try_` operations of
/// [`FrameAllocator`](crate::FrameAllocator) panic with this message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame address {0} is not frame-aligned")]
    Misaligned(PhysicalAddress),
    #[error("frame address {0} lies outside the managed range")]
    OutOfRange(PhysicalAddress),
    #[error("frame {0} is not in use (reference count is zero)")]
    NotInUse(PhysicalAddress),
    #[error("frame {0} is not shared (reference count is {1})")]
    NotShared(PhysicalAddress, u32),
    #[error("physical range {0:?} holds no whole frame")]
    EmptyRange(PhysicalRange),
    #[error("physical range {0:?} is not covered by the pool layout")]
    RangeOutsideLayout(PhysicalRange),
    #[error("frame allocator is already initialized")]
    AlreadyInitialized,
    #[error("frame allocator is not initialized")]
    NotInitialized,
}
