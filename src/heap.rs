//! Per-slot heaps and the superblock migration protocol.
//!
//! Lock order: a thread heap's mutex may be taken before the global heap's
//! mutex, never the reverse. Superblock mutexes are leaves and are never
//! held while acquiring a heap mutex.

use super::bin::Bin;
use super::block_store::SuperblockStore;
use super::constants::{
    BIN_COUNT, EMPTINESS_DIVISOR, GLOBAL_HEAP_ID, HEADER_SIZE, MAX_SMALL_REQUEST,
    MIN_BLOCK_THRESHOLD, SUPERBLOCK_SIZE,
};
use super::error::AllocError;
use super::size_class::{class_index, class_size};
use super::superblock::Superblock;
use log::trace;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard};

/// One heap slot: a bin per size class behind a single mutex.
///
/// The global heap is the same type with the sentinel id. It never allocates
/// on its own behalf; it holds the superblocks that thread heaps donate when
/// their local occupancy drops, and donates them back when a thread heap
/// runs dry.
pub struct ThreadHeap {
    id: isize,
    bins: Mutex<Vec<Bin>>,
}

// SAFETY: the bins hold raw pointers to superblocks owned by the
// SuperblockStore; the superblocks are Sync and the mutex serializes all
// bin mutation.
unsafe impl Send for ThreadHeap {}
unsafe impl Sync for ThreadHeap {}

impl ThreadHeap {
    pub fn new(id: isize) -> ThreadHeap {
        let bins = (0..BIN_COUNT).map(|_| Bin::new()).collect();

        ThreadHeap {
            id,
            bins: Mutex::new(bins),
        }
    }

    pub(crate) fn lock_bins(&self) -> MutexGuard<'_, Vec<Bin>> {
        self.bins.lock().unwrap()
    }

    /// Serves `total` bytes (header included) from this heap, refilling the
    /// bin from the global heap or the store when it runs dry. Returns the
    /// payload pointer; the slot's header is already initialized.
    pub fn allocate(
        &self,
        total: usize,
        global: &ThreadHeap,
        store: &SuperblockStore,
    ) -> Result<*mut u8, AllocError> {
        debug_assert!(self.id != GLOBAL_HEAP_ID);
        debug_assert!(total <= MAX_SMALL_REQUEST);

        let class = class_index(total);
        let mut bins = self.bins.lock().unwrap();

        loop {
            if let Some((sb, offset)) = bins[class].acquire_slot() {
                let block = unsafe { sb.as_ref() };

                bins[class].credit(block.block_size(), 0);

                let slot = unsafe { block.base().add(offset) };

                unsafe {
                    (slot as *mut *const Superblock).write(sb.as_ptr());

                    return Ok(slot.add(HEADER_SIZE));
                }
            }

            self.refill(&mut bins[class], class_size(total), global, store)?;
        }
    }

    /// Puts a partial superblock into `bin`: reclaimed from the global heap
    /// if it has one of this class, freshly created otherwise.
    fn refill(
        &self,
        bin: &mut Bin,
        block_size: usize,
        global: &ThreadHeap,
        store: &SuperblockStore,
    ) -> Result<(), AllocError> {
        let class = class_index(block_size);

        {
            let mut global_bins = global.bins.lock().unwrap();

            if let Some(sb) = global_bins[class].take_emptiest() {
                let block = unsafe { sb.as_ref() };
                let used = block.used_memory();

                global_bins[class].debit(used, SUPERBLOCK_SIZE);
                block.set_owner(self.id);
                bin.credit(used, SUPERBLOCK_SIZE);
                bin.insert(sb);

                trace!(
                    "heap {} reclaimed superblock {:p} from global",
                    self.id,
                    block.base()
                );

                return Ok(());
            }
        }

        let sb = store.create(block_size)?;
        let block = unsafe { sb.as_ref() };

        block.set_owner(self.id);
        bin.credit(0, SUPERBLOCK_SIZE);
        bin.insert(sb);

        Ok(())
    }

    /// Returns a slot to its superblock. Runs with this heap's bins already
    /// locked by the owner-locating dance in the front door.
    pub(crate) fn deallocate(
        &self,
        bins: &mut [Bin],
        sb: NonNull<Superblock>,
        offset: usize,
        global: &ThreadHeap,
    ) {
        let block = unsafe { sb.as_ref() };
        let class = class_index(block.block_size());
        let bin = &mut bins[class];

        bin.debit(block.block_size(), 0);
        bin.release_slot(sb, offset);

        if self.id == GLOBAL_HEAP_ID {
            return;
        }

        // Donate a superblock once the bin is both fractionally empty and
        // holds more than MIN_BLOCK_THRESHOLD superblocks of slack. One
        // donation per release keeps the cost bounded and the working set
        // away from the boundary.
        let slack_floor = bin
            .allocated()
            .saturating_sub(MIN_BLOCK_THRESHOLD * SUPERBLOCK_SIZE);

        if bin.used() < slack_floor && bin.used() * EMPTINESS_DIVISOR < bin.allocated() {
            self.migrate_one(bin, class, global);
        }
    }

    fn migrate_one(&self, bin: &mut Bin, class: usize, global: &ThreadHeap) {
        let Some(sb) = bin.take_emptiest() else {
            return;
        };

        let block = unsafe { sb.as_ref() };
        let used = block.used_memory();

        bin.debit(used, SUPERBLOCK_SIZE);

        let mut global_bins = global.bins.lock().unwrap();

        block.set_owner(GLOBAL_HEAP_ID);
        global_bins[class].credit(used, SUPERBLOCK_SIZE);
        global_bins[class].insert(sb);

        trace!(
            "heap {} migrated superblock {:p} to global",
            self.id,
            block.base()
        );
    }
}
