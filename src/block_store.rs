use super::constants::SUPERBLOCK_SIZE;
use super::error::AllocError;
use super::superblock::Superblock;
use log::trace;
use std::ptr::NonNull;
use std::sync::Mutex;

/// Owns every superblock in the allocator. Superblocks are created here on
/// demand, handed to heaps as raw references, and destroyed only when the
/// store itself is dropped, so the back-pointers written into object headers
/// stay valid for the allocator's whole lifetime.
pub struct SuperblockStore {
    blocks: Mutex<Vec<Box<Superblock>>>,
}

impl SuperblockStore {
    pub fn new() -> SuperblockStore {
        SuperblockStore {
            blocks: Mutex::new(Vec::new()),
        }
    }

    pub fn create(&self, block_size: usize) -> Result<NonNull<Superblock>, AllocError> {
        let block = Box::new(Superblock::new(block_size)?);
        let ptr = NonNull::from(&*block);

        self.blocks.lock().unwrap().push(block);

        trace!("created superblock {:p} class {}", ptr.as_ptr(), block_size);

        Ok(ptr)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn superblock_bytes(&self) -> usize {
        self.block_count() * SUPERBLOCK_SIZE
    }
}
