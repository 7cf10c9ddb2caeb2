//! # Kernel synchronization primitives
//!
//! The memory subsystem serializes all of its bookkeeping behind a single
//! coarse [`SpinLock`]. Critical sections are short and never sleep, so a
//! test-and-test-and-set spin loop is all that is needed.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
