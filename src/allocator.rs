use super::block_store::SuperblockStore;
use super::constants::{heap_count, GLOBAL_HEAP_ID, HEADER_SIZE, MAX_SMALL_REQUEST, MIN_BLOCK_SIZE};
use super::heap::ThreadHeap;
use super::large_block::LargeBlock;
use super::superblock::Superblock;
use log::trace;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ptr::{null_mut, NonNull};
use std::sync::Mutex;
use std::thread;

std::thread_local! {
    // Hash of this thread's identity, computed once per thread. The heap
    // slot is this seed modulo the heap count, so two threads may share a
    // slot; contention is bounded by spreading over 2x the core count.
    static THREAD_SEED: u64 = {
        let mut hasher = DefaultHasher::new();

        thread::current().id().hash(&mut hasher);
        hasher.finish()
    };
}

/// The allocator front door.
///
/// Small requests (payload + header within half a superblock) go to the
/// calling thread's heap slot. Anything bigger, and any request with
/// alignment above the natural 8 bytes, bypasses the heaps entirely and is
/// served by the system allocator, tracked in the large map until freed.
///
/// Dropping the allocator releases every superblock and any still-live
/// large allocation.
pub struct Allocator {
    heaps: Vec<ThreadHeap>,
    global: ThreadHeap,
    store: SuperblockStore,
    large: Mutex<HashMap<usize, LargeBlock>>,
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator {
    pub fn new() -> Allocator {
        let heaps = (0..heap_count())
            .map(|id| ThreadHeap::new(id as isize))
            .collect();

        Allocator {
            heaps,
            global: ThreadHeap::new(GLOBAL_HEAP_ID),
            store: SuperblockStore::new(),
            large: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates `bytes` with the natural 8 byte alignment. Null on failure.
    pub fn alloc(&self, bytes: usize) -> *mut u8 {
        self.alloc_aligned(bytes, MIN_BLOCK_SIZE)
    }

    /// Allocates `bytes` aligned to `align` (a power of two). Alignments
    /// above the natural one are served on the large path.
    pub fn alloc_aligned(&self, bytes: usize, align: usize) -> *mut u8 {
        let Some(total) = bytes.checked_add(HEADER_SIZE) else {
            return null_mut();
        };

        if align > MIN_BLOCK_SIZE || total > MAX_SMALL_REQUEST {
            return self.alloc_large(bytes, align);
        }

        let heap = &self.heaps[self.slot()];

        match heap.allocate(total, &self.global, &self.store) {
            Ok(ptr) => ptr,
            Err(_) => null_mut(),
        }
    }

    fn alloc_large(&self, bytes: usize, align: usize) -> *mut u8 {
        match LargeBlock::new(bytes, align) {
            Ok(block) => {
                let payload = block.payload();

                trace!("large allocation {:p} ({} bytes)", payload, bytes);

                self.large.lock().unwrap().insert(payload as usize, block);

                payload
            }
            Err(_) => null_mut(),
        }
    }

    /// Releases a pointer previously returned by `alloc`/`alloc_aligned`.
    /// Null is a no-op.
    ///
    /// # Safety
    /// `ptr` must be null or a live pointer from this allocator; freeing a
    /// foreign pointer or freeing twice is undefined behavior.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let slot = ptr.sub(HEADER_SIZE);
        let back = (slot as *const *const Superblock).read();

        match NonNull::new(back as *mut Superblock) {
            None => {
                self.large.lock().unwrap().remove(&(ptr as usize));
            }
            Some(sb) => self.free_slot(slot, sb),
        }
    }

    /// Lands the release under the mutex of the superblock's current owner.
    ///
    /// The owner may migrate between the unsynchronized read and the lock;
    /// since ownership only changes while both the old and the new owner's
    /// mutexes are held, a matching re-read under the lock pins it.
    unsafe fn free_slot(&self, slot: *mut u8, sb: NonNull<Superblock>) {
        let block = sb.as_ref();

        loop {
            let owner = block.owner();
            let heap = self.heap_for(owner);
            let mut bins = heap.lock_bins();

            if block.owner() == owner {
                heap.deallocate(&mut bins, sb, block.offset_of(slot), &self.global);

                return;
            }

            // Owner moved before we got the lock; retry against the new one.
        }
    }

    fn heap_for(&self, id: isize) -> &ThreadHeap {
        if id == GLOBAL_HEAP_ID {
            &self.global
        } else {
            &self.heaps[id as usize]
        }
    }

    fn slot(&self) -> usize {
        THREAD_SEED.with(|seed| (*seed % self.heaps.len() as u64) as usize)
    }

    /// Number of live superblocks.
    pub fn block_count(&self) -> usize {
        self.store.block_count()
    }

    /// Total bytes held: superblock space plus live large allocations.
    pub fn heap_size(&self) -> usize {
        let large: usize = self
            .large
            .lock()
            .unwrap()
            .values()
            .map(|block| block.size())
            .sum();

        self.store.superblock_bytes() + large
    }
}
