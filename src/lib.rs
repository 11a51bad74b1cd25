//! A multithreaded general purpose allocator in the Hoard design.
//!
//! Small objects come out of 8 KiB superblocks, each carved into a single
//! power-of-two size class. Every thread hashes to one of a fixed set of
//! heaps; a heap whose occupancy drops donates superblocks to a shared
//! global heap, where other heaps reclaim them before creating new ones.
//! Requests too big for a superblock pass through to the system allocator
//! behind the same one-word object header.

mod allocator;
mod bin;
mod block_store;
mod error;
mod heap;
mod large_block;
mod size_class;
mod superblock;

pub mod constants;

pub use allocator::Allocator;
pub use error::AllocError;

use std::ffi::c_void;
use std::sync::OnceLock;

static ALLOCATOR: OnceLock<Allocator> = OnceLock::new();

fn allocator() -> &'static Allocator {
    ALLOCATOR.get_or_init(Allocator::new)
}

/// Allocates `bytes` from the process-wide allocator. Returns a pointer
/// aligned to 8 bytes, non-null even for zero-size requests, or null when
/// the system allocator fails.
#[no_mangle]
pub extern "C" fn mtalloc(bytes: usize) -> *mut c_void {
    allocator().alloc(bytes) as *mut c_void
}

/// Releases a pointer previously returned by `mtalloc`. Null is a no-op.
///
/// # Safety
/// `ptr` must be null or a live `mtalloc` result; anything else is
/// undefined behavior.
#[no_mangle]
pub unsafe extern "C" fn mtfree(ptr: *mut c_void) {
    allocator().free(ptr as *mut u8)
}
