use std::thread;

/// Payload bytes of every superblock.
pub const SUPERBLOCK_SIZE: usize = 8192;

/// Smallest size class, also the alignment guarantee of every payload.
pub const MIN_BLOCK_SIZE: usize = 8;

/// Bytes reserved in front of every payload for the superblock back-pointer.
/// Fixed at 8 so payloads stay MIN_BLOCK_SIZE aligned on 32 bit targets too.
pub const HEADER_SIZE: usize = 8;

/// Largest total (payload + header) the superblock path serves.
/// Anything bigger goes straight to the system allocator.
pub const MAX_SMALL_REQUEST: usize = SUPERBLOCK_SIZE / 2;

/// Number of size classes: 8, 16, ... SUPERBLOCK_SIZE / 2.
pub const BIN_COUNT: usize =
    (MAX_SMALL_REQUEST.trailing_zeros() - MIN_BLOCK_SIZE.trailing_zeros()) as usize + 1;

/// A bin keeps at least this many superblocks' worth of slack before
/// donating one to the global heap.
pub const MIN_BLOCK_THRESHOLD: usize = 5;

/// Occupancy fraction divisor: migrate only while used * K < allocated.
pub const EMPTINESS_DIVISOR: usize = 4;

/// Owner slot of the global heap.
pub const GLOBAL_HEAP_ID: isize = -1;

const _: () = assert!(SUPERBLOCK_SIZE.is_power_of_two());
const _: () = assert!(MIN_BLOCK_SIZE.is_power_of_two());
const _: () = assert!(HEADER_SIZE >= std::mem::size_of::<usize>());
const _: () = assert!(HEADER_SIZE % MIN_BLOCK_SIZE == 0);

/// Heap slots to spread threads over: twice the hardware parallelism,
/// never fewer than 8.
pub fn heap_count() -> usize {
    let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(0);

    (cores * 2).max(8)
}
