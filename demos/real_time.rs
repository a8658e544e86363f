use spdlog::prelude::*;
use std::hint::black_box;

fn main() {
    blockprof::enable();
    info!("[RealTime] instant and smoothed timings are logged as each block ends");

    let mut y = 1u64;
    blockprof::start("ALL");
    for _ in 0..100 {
        blockprof::start("LP1");
        for _ in 0..1_000_000 {
            y = y.wrapping_add(28_138_481);
            y = black_box(623_415_232 % y.max(1));
        }
        blockprof::end("LP1");

        blockprof::start_smooth("LP2");
        for _ in 0..1_000_000 {
            y = black_box(y + 51) % 101;
        }
        blockprof::end_smooth("LP2");
    }
    blockprof::end("ALL");

    info!("[RealTime] done ({})", y);
}
