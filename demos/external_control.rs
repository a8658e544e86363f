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
    info!(
        "[Demo] Instrumented code running. Use `blockprof-ctl --enable`, `--disable`, `--print` or `--clear` to control it."
    );

    loop {
        blockprof::start_offline("OFLN");
        spin(10_000_000);
        blockprof::end_offline("OFLN");

        blockprof::start_smooth("REAL");
        spin(10_000_000);
        blockprof::end_smooth("REAL");
    }
}
