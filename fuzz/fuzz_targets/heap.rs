#![no_main]

use segalloc::{BlockPtr, Config, Heap, VecArena};

use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Actions {
    /// Allocate `size` bytes
    Alloc { size: u16 },
    /// Free the ith allocation
    Free { index: u8 },
    /// Resize the ith allocation
    Resize { index: u8, new_size: u16 },
    /// Start over with an empty arena
    Reinit,
}
use Actions::*;

#[derive(Arbitrary, Debug)]
struct Input {
    search_limit: u8,
    min_extension: u16,
    extension_granularity: u16,
    arena_limit: u16,
    actions: Vec<Actions>,
}

fn holds(heap: &Heap<VecArena>, ptr: BlockPtr, size: usize, fill: u8) -> bool {
    heap.payload(ptr)[..size].iter().all(|&b| b == fill)
}

fuzz_target!(|input: Input| {
    let config = Config::new()
        .with_search_limit(input.search_limit as usize)
        .with_min_extension(input.min_extension as usize)
        .with_extension_granularity(input.extension_granularity as usize);

    let arena = VecArena::with_limit((input.arena_limit as usize) << 4);
    let mut heap: Heap<VecArena> = Heap::with_config(arena, config);
    if heap.init().is_err() {
        return;
    }

    let mut allocations: Vec<(BlockPtr, usize, u8)> = vec![];

    for (i, action) in input.actions.into_iter().enumerate() {
        let fill = i as u8;

        match action {
            Alloc { size } => {
                let size = size as usize;

                if let Some(ptr) = heap.allocate(size) {
                    assert!(heap.usable_size(ptr) >= size);
                    heap.payload_mut(ptr)[..size].fill(fill);
                    allocations.push((ptr, size, fill));
                }
            }
            Free { index } => {
                if index as usize >= allocations.len() { continue; }

                let (ptr, size, fill) = allocations.swap_remove(index as usize);
                assert!(holds(&heap, ptr, size, fill));
                heap.free(Some(ptr));
            }
            Resize { index, new_size } => {
                if index as usize >= allocations.len() { continue; }

                let (ptr, size, old_fill) = allocations[index as usize];
                let new_size = new_size as usize;

                match heap.resize(Some(ptr), new_size) {
                    Some(new_ptr) => {
                        assert!(holds(&heap, new_ptr, size.min(new_size), old_fill));

                        heap.payload_mut(new_ptr)[..new_size].fill(fill);
                        allocations[index as usize] = (new_ptr, new_size, fill);
                    }
                    None if new_size == 0 => {
                        allocations.swap_remove(index as usize);
                    }
                    None => assert!(holds(&heap, ptr, size, old_fill)),
                }
            }
            Reinit => {
                if heap.init().is_err() {
                    return;
                }
                allocations.clear();
            }
        }
    }

    for (ptr, size, fill) in allocations {
        assert!(holds(&heap, ptr, size, fill));
        heap.free(Some(ptr));
    }

    assert_eq!(heap.check(), Ok(()));
    assert_eq!(heap.counters().allocation_count, 0);
});
