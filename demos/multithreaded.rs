use spdlog::prelude::*;
use std::hint::black_box;
use std::thread;

fn run(worker: usize) {
    info!("[Worker:{}] launched", worker);

    blockprof::start_offline("ALL");
    for _ in 0..20 {
        blockprof::start_offline("LP1");
        let mut y = 1u64;
        for _ in 0..200_000 {
            y = y.wrapping_add(28_138_481);
            y = black_box(623_415_232 % y.max(1));
        }
        blockprof::end_offline("LP1");

        blockprof::start_offline("LP2");
        let mut y = 0u64;
        for _ in 0..200_000 {
            y = black_box(y + 51) % 101;
        }
        blockprof::end_offline("LP2");
    }
    blockprof::end_offline("ALL");

    info!("[Worker:{}] exited", worker);
}

fn main() {
    blockprof::enable();

    let workers: Vec<_> = (0..4).map(|i| thread::spawn(move || run(i))).collect();
    for worker in workers {
        worker.join().unwrap();
    }

    blockprof::print_offline();
}
