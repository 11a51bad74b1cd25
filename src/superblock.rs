use super::constants::{GLOBAL_HEAP_ID, MIN_BLOCK_SIZE, SUPERBLOCK_SIZE};
use super::error::AllocError;
use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Mutex;

/// The raw 8 KiB region backing one superblock, owned exclusively for the
/// superblock's lifetime.
struct Region {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Region {
    fn new() -> Result<Region, AllocError> {
        let layout = Layout::from_size_align(SUPERBLOCK_SIZE, MIN_BLOCK_SIZE).unwrap();
        let ptr = unsafe { alloc(layout) };

        match NonNull::new(ptr) {
            Some(ptr) => Ok(Region { ptr, layout }),
            None => Err(AllocError::Oom),
        }
    }

    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

struct SlotStack {
    free: Vec<u32>,
    used_memory: usize,
}

/// An 8 KiB region carved into slots of a single size class.
///
/// Free slots are kept as a LIFO stack of intra-region offsets. The stack and
/// the used-byte counter live behind the superblock's own mutex, a leaf lock
/// that is never held while acquiring a heap mutex. The owner slot is atomic:
/// the free path reads it without any lock and re-checks it after locking the
/// owner it observed.
pub struct Superblock {
    region: Region,
    block_size: usize,
    total: usize,
    slots: Mutex<SlotStack>,
    owner: AtomicIsize,
}

// SAFETY: the region pointer is owned exclusively by this superblock, slot
// state is mutex guarded and the owner slot is atomic.
unsafe impl Send for Superblock {}
unsafe impl Sync for Superblock {}

impl Superblock {
    pub fn new(block_size: usize) -> Result<Superblock, AllocError> {
        debug_assert!(block_size.is_power_of_two());
        debug_assert!(block_size >= MIN_BLOCK_SIZE);
        debug_assert!(SUPERBLOCK_SIZE % block_size == 0);

        let region = Region::new()?;
        let total = SUPERBLOCK_SIZE / block_size;

        // Pushed high to low so the stack hands out ascending addresses.
        let free = (0..total).rev().map(|i| (i * block_size) as u32).collect();

        Ok(Superblock {
            region,
            block_size,
            total,
            slots: Mutex::new(SlotStack {
                free,
                used_memory: 0,
            }),
            owner: AtomicIsize::new(GLOBAL_HEAP_ID),
        })
    }

    /// Pops a free slot offset, or None when the superblock is full.
    pub fn acquire(&self) -> Option<usize> {
        let mut slots = self.slots.lock().unwrap();
        let offset = slots.free.pop()? as usize;

        slots.used_memory += self.block_size;

        Some(offset)
    }

    /// Returns a slot to the free stack. The offset must have come from
    /// `acquire` on this superblock; the object header enforces this.
    pub fn release(&self, offset: usize) {
        debug_assert!(offset < SUPERBLOCK_SIZE);
        debug_assert!(offset % self.block_size == 0);

        let mut slots = self.slots.lock().unwrap();

        debug_assert!(slots.free.len() < self.total);

        slots.free.push(offset as u32);
        slots.used_memory -= self.block_size;
    }

    pub fn is_full(&self) -> bool {
        self.slots.lock().unwrap().free.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().free.len() == self.total
    }

    pub fn used_memory(&self) -> usize {
        self.slots.lock().unwrap().used_memory
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn owner(&self) -> isize {
        self.owner.load(Ordering::Acquire)
    }

    /// Rebinds the superblock to a heap slot. Callers hold the mutexes of
    /// both the current and the next owner, which is what lets the free
    /// path's read-then-lock check pin the owner.
    pub fn set_owner(&self, id: isize) {
        self.owner.store(id, Ordering::Release);
    }

    pub fn base(&self) -> *mut u8 {
        self.region.as_ptr()
    }

    /// Intra-region offset of a slot address handed out by this superblock.
    pub fn offset_of(&self, slot: *mut u8) -> usize {
        let offset = slot as usize - self.base() as usize;

        debug_assert!(offset < SUPERBLOCK_SIZE);
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn carves_all_slots() {
        let sb = Superblock::new(64).unwrap();

        assert!(sb.is_empty());
        assert!(!sb.is_full());
        assert_eq!(sb.used_memory(), 0);

        let mut seen = HashSet::new();
        for _ in 0..SUPERBLOCK_SIZE / 64 {
            let offset = sb.acquire().unwrap();

            assert!(offset < SUPERBLOCK_SIZE);
            assert_eq!(offset % 64, 0);
            assert!(seen.insert(offset));
        }

        assert!(sb.is_full());
        assert_eq!(sb.used_memory(), SUPERBLOCK_SIZE);
        assert_eq!(sb.acquire(), None);
    }

    #[test]
    fn release_reopens_slot() {
        let sb = Superblock::new(4096).unwrap();

        let first = sb.acquire().unwrap();
        let second = sb.acquire().unwrap();

        assert!(sb.is_full());

        sb.release(first);

        assert!(!sb.is_full());
        assert_eq!(sb.used_memory(), 4096);

        // LIFO: the slot just released comes back first.
        assert_eq!(sb.acquire(), Some(first));

        sb.release(second);
        sb.release(first);

        assert!(sb.is_empty());
        assert_eq!(sb.used_memory(), 0);
    }

    #[test]
    fn owner_round_trip() {
        let sb = Superblock::new(8).unwrap();

        assert_eq!(sb.owner(), GLOBAL_HEAP_ID);

        sb.set_owner(3);

        assert_eq!(sb.owner(), 3);
    }

    #[test]
    fn hands_out_ascending_addresses() {
        let sb = Superblock::new(1024).unwrap();

        assert_eq!(sb.acquire(), Some(0));
        assert_eq!(sb.acquire(), Some(1024));
        assert_eq!(sb.acquire(), Some(2048));
    }
}
