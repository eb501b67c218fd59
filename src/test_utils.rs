use crate::arena::VecArena;
use crate::base::binning::{exponential_binning, Binning};
use crate::base::Heap;

/// Runs a generic test function under every shipped binning,
/// plus one with very few bins.
macro_rules! for_many_configurations {
    ($test_fn:ident) => {
        $test_fn::<$crate::base::binning::DefaultBinning>();
        $test_fn::<$crate::base::binning::LinearThenExponentialBinning>();
        $test_fn::<$crate::test_utils::TinyBinning>();
    };
}

/// Four bins, so that most blocks share the last one.
#[derive(Debug, Clone, Copy)]
pub struct TinyBinning;

impl Binning for TinyBinning {
    const BIN_COUNT: usize = 4;

    fn size_to_bin(size: usize) -> usize {
        exponential_binning::<4>(size)
    }
}

/// An initialized heap over a 20 MiB [`VecArena`].
pub fn new_heap<B: Binning>() -> Heap<VecArena, B> {
    init_logging();

    let mut heap = Heap::new(VecArena::default());
    heap.init().unwrap();
    heap
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
