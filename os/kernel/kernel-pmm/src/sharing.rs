//! # Sharing table
//!
//! Per-frame reference counts and the protection bits recorded when a frame
//! first became shared. One [`FrameInfo`] per frame of the pool layout,
//! indexed by `(base - layout.start) / FRAME_SIZE`.
//!
//! ### Invariants
//! - A frame on the free list has `refcount == 0` and `flags == None`.
//! - A frame handed out by the allocator has `refcount >= 1`.
//! - `flags` is only ever set while `refcount >= 1`.
//!
//! The table performs every check-then-update as a single `&mut self` call,
//! so holding the allocator lock around one call is enough to make the
//! sequence atomic.

use kernel_info::memory::FRAME_SHIFT;
use kernel_memory_addresses::PhysicalAddress;

use crate::Frame;
use crate::error::FrameError;
use crate::flags::PageFlags;

/// Bookkeeping for one physical frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Number of owners. Zero means free (or never part of the pool).
    pub refcount: u32,
    /// Bits of the first mapping that shared this frame; `None` while the
    /// frame is not tracked as shared.
    pub flags: Option<PageFlags>,
}

impl FrameInfo {
    pub const UNUSED: Self = Self {
        refcount: 0,
        flags: None,
    };

    #[inline]
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        self.refcount > 1
    }
}

/// What [`SharingTable::retain`] observed before incrementing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Retained {
    /// The frame was private; `flags` are now its recorded protection bits.
    FirstShare,
    /// Already shared and the write permission agrees with the record.
    Shared,
    /// Already shared, but the caller and the record disagree about write
    /// access. Expected once a sharer has been demoted by an earlier fault.
    WriteMismatch { recorded: PageFlags },
}

pub(crate) struct SharingTable<const N: usize> {
    base: PhysicalAddress,
    entries: [FrameInfo; N],
}

impl<const N: usize> SharingTable<N> {
    pub(crate) const fn new(base: PhysicalAddress) -> Self {
        Self {
            base,
            entries: [FrameInfo::UNUSED; N],
        }
    }

    /// Table slot of `frame`. The caller has checked it lies in the layout.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn slot(&self, frame: Frame) -> usize {
        ((frame.base().as_u64() - self.base.as_u64()) >> FRAME_SHIFT) as usize
    }

    #[inline]
    pub(crate) fn get(&self, frame: Frame) -> &FrameInfo {
        &self.entries[self.slot(frame)]
    }

    /// Entry of a frame that must currently be in use.
    pub(crate) fn in_use(&self, frame: Frame) -> Result<&FrameInfo, FrameError> {
        let info = self.get(frame);
        if info.refcount == 0 {
            return Err(FrameError::NotInUse(frame.base()));
        }
        Ok(info)
    }

    fn in_use_mut(&mut self, frame: Frame) -> Result<&mut FrameInfo, FrameError> {
        let slot = self.slot(frame);
        let info = &mut self.entries[slot];
        if info.refcount == 0 {
            return Err(FrameError::NotInUse(frame.base()));
        }
        Ok(info)
    }

    /// Mark `frame` as privately owned by a single user.
    pub(crate) fn track(&mut self, frame: Frame) {
        let slot = self.slot(frame);
        self.entries[slot] = FrameInfo {
            refcount: 1,
            flags: None,
        };
    }

    /// Drop one owner. Returns the remaining count; at zero the recorded
    /// flags are cleared and the frame must go back to the free list.
    pub(crate) fn put(&mut self, frame: Frame) -> Result<u32, FrameError> {
        let info = self.in_use_mut(frame)?;
        info.refcount -= 1;
        if info.refcount == 0 {
            info.flags = None;
        }
        Ok(info.refcount)
    }

    /// Add an owner sharing `frame` through a mapping with `flags`.
    pub(crate) fn retain(&mut self, frame: Frame, flags: PageFlags) -> Result<Retained, FrameError> {
        let info = self.in_use_mut(frame)?;
        let recorded = info.flags;
        let outcome = match recorded {
            None if info.refcount == 1 => {
                info.flags = Some(flags);
                Retained::FirstShare
            }
            Some(recorded) if !recorded.same_write_access(flags) => {
                Retained::WriteMismatch { recorded }
            }
            _ => Retained::Shared,
        };
        info.refcount += 1;
        Ok(outcome)
    }

    /// Drop one owner of a frame that must stay shared by someone else.
    pub(crate) fn release(&mut self, frame: Frame) -> Result<u32, FrameError> {
        let info = self.in_use_mut(frame)?;
        if info.refcount < 2 {
            return Err(FrameError::NotShared(frame.base(), info.refcount));
        }
        info.refcount -= 1;
        Ok(info.refcount)
    }

    /// `(in_use, shared)` frame counts.
    pub(crate) fn census(&self) -> (usize, usize) {
        self.entries.iter().fold((0, 0), |(used, shared), info| {
            (
                used + usize::from(info.refcount > 0),
                shared + usize::from(info.is_shared()),
            )
        })
    }
}
