use super::constants::{HEADER_SIZE, MIN_BLOCK_SIZE};
use super::error::AllocError;
use std::alloc::{alloc, dealloc, Layout};

/// A large allocation served directly by the system allocator.
///
/// The header word sits immediately before the payload and holds a null
/// back-pointer, which is how the free path tells this object apart from a
/// superblock slot. The record keeps the layout so releasing the memory
/// needs nothing from the caller.
#[derive(Debug)]
pub struct LargeBlock {
    ptr: *mut u8,
    layout: Layout,
    offset: usize,
}

// SAFETY: the base pointer is owned exclusively by this record.
unsafe impl Send for LargeBlock {}

impl LargeBlock {
    pub fn new(size: usize, align: usize) -> Result<LargeBlock, AllocError> {
        let align = align.max(MIN_BLOCK_SIZE);

        debug_assert!(align.is_power_of_two());

        // The payload lands on the first `align` boundary past the header
        // word; with align >= HEADER_SIZE that is `align` itself.
        let offset = HEADER_SIZE.max(align);
        let total = size.checked_add(offset).ok_or(AllocError::RequestOverflow)?;
        let layout = Layout::from_size_align(total, align)?;

        let ptr = unsafe { alloc(layout) };

        if ptr.is_null() {
            return Err(AllocError::Oom);
        }

        unsafe {
            let header = ptr.add(offset - HEADER_SIZE) as *mut usize;

            header.write(0);
        }

        Ok(LargeBlock {
            ptr,
            layout,
            offset,
        })
    }

    pub fn payload(&self) -> *mut u8 {
        unsafe { self.ptr.add(self.offset) }
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for LargeBlock {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) }
    }
}
