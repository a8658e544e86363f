use spdlog::prelude::*;
use std::hint::black_box;

fn spin(iterations: u64) -> u64 {
    let mut y = 0u64;
    for _ in 0..iterations {
        y = black_box(y + 51) % 101;
    }
    y
}

fn main() {
    info!("[Demo] Recording offline profiles of two loops...");

    blockprof::enable();
    for i in 0..10 {
        blockprof::start_offline("LP1");
        spin(1_000_000);
        blockprof::end_offline("LP1");

        blockprof::start_offline("LP2");
        spin(100_000 * (i + 1));
        blockprof::end_offline("LP2");
    }

    blockprof::print_offline();
    blockprof::clear_offline();
    blockprof::print_offline();
}
