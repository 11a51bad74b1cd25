use super::constants::{BIN_COUNT, MAX_SMALL_REQUEST, MIN_BLOCK_SIZE};

/// Rounds a request up to its size class: the next power of two, never
/// smaller than MIN_BLOCK_SIZE.
pub fn class_size(size: usize) -> usize {
    debug_assert!(size <= MAX_SMALL_REQUEST);

    size.next_power_of_two().max(MIN_BLOCK_SIZE)
}

/// Bin index of a size class within a heap.
pub fn class_index(size: usize) -> usize {
    let rounded = class_size(size);
    let index = (rounded.trailing_zeros() - MIN_BLOCK_SIZE.trailing_zeros()) as usize;

    debug_assert!(index < BIN_COUNT);
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SUPERBLOCK_SIZE;

    #[test]
    fn rounds_up_to_power_of_two() {
        assert_eq!(class_size(0), 8);
        assert_eq!(class_size(1), 8);
        assert_eq!(class_size(8), 8);
        assert_eq!(class_size(9), 16);
        assert_eq!(class_size(24), 32);
        assert_eq!(class_size(4095), 4096);
        assert_eq!(class_size(MAX_SMALL_REQUEST), SUPERBLOCK_SIZE / 2);
    }

    #[test]
    fn index_covers_every_class() {
        assert_eq!(class_index(1), 0);
        assert_eq!(class_index(8), 0);
        assert_eq!(class_index(16), 1);
        assert_eq!(class_index(MAX_SMALL_REQUEST), BIN_COUNT - 1);
    }

    #[test]
    fn each_class_divides_superblock() {
        for index in 0..BIN_COUNT {
            let size = MIN_BLOCK_SIZE << index;

            assert_eq!(class_index(size), index);
            assert_eq!(SUPERBLOCK_SIZE % size, 0);
        }
    }
}
