// Multithreaded allocator stress: every thread keeps a ledger of its live
// allocations and the byte each one was filled with, verifying the contents
// before every release and at every round boundary.
use mtalloc::constants::SUPERBLOCK_SIZE;
use mtalloc::Allocator;
use rand::prelude::*;
use std::sync::Arc;

const NUM_THREADS: usize = 8;
const ROUNDS: usize = 4;
const OPS_PER_ROUND: usize = 2_000;

struct Fuzzer {
    allocator: Arc<Allocator>,
    live: Vec<(usize, u8, usize)>,
}

impl Fuzzer {
    fn new(allocator: Arc<Allocator>) -> Self {
        Self {
            allocator,
            live: Vec::new(),
        }
    }

    fn assert_all(&self) {
        for (addr, fill, size) in self.live.iter() {
            let ptr = *addr as *const u8;

            for i in 0..*size {
                unsafe { assert_eq!(ptr.add(i).read(), *fill) }
            }
        }
    }

    fn churn(&mut self) {
        let mut rng = rand::thread_rng();

        for _ in 0..OPS_PER_ROUND {
            if self.live.is_empty() || rng.gen_range(0..100) < 60 {
                let mut size = rng.gen_range(1..=2_000);

                // Occasionally exercise the large path too.
                if size > 1_990 {
                    size = 1024 * 17;
                }

                let fill: u8 = rng.gen();
                let ptr = self.allocator.alloc(size);

                assert!(!ptr.is_null());
                unsafe { ptr.write_bytes(fill, size) };

                self.live.push((ptr as usize, fill, size));
            } else {
                let index = rng.gen_range(0..self.live.len());
                let (addr, fill, size) = self.live.swap_remove(index);
                let ptr = addr as *mut u8;

                for i in 0..size {
                    unsafe { assert_eq!(ptr.add(i).read(), fill) }
                }

                unsafe { self.allocator.free(ptr) };
            }
        }
    }

    fn drain(&mut self) {
        self.assert_all();

        for (addr, _, _) in self.live.drain(..) {
            unsafe { self.allocator.free(addr as *mut u8) };
        }
    }
}

#[test]
fn fuzz() {
    let allocator = Arc::new(Allocator::new());

    let mut fuzzers = vec![];
    for _ in 0..NUM_THREADS {
        fuzzers.push(Fuzzer::new(allocator.clone()));
    }

    for round in 1..=ROUNDS {
        let mut join_handles = vec![];

        for mut fuzzer in fuzzers.drain(..) {
            fuzzer.assert_all();

            let jh = std::thread::spawn(move || {
                fuzzer.churn();
                fuzzer
            });

            join_handles.push(jh);
        }

        for jh in join_handles.into_iter() {
            fuzzers.push(jh.join().unwrap());
        }

        let bytes = allocator.heap_size() as f64;
        let mb = (bytes / 1024.0) / 1024.0;

        println!("round {round}: heap size {:.2} mb", mb);
    }

    for fuzzer in fuzzers.iter_mut() {
        fuzzer.drain();
    }

    // Nothing live: only empty superblocks remain.
    let superblocks = allocator.block_count();
    assert_eq!(allocator.heap_size(), superblocks * SUPERBLOCK_SIZE);
}
