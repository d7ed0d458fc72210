use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;
use snapstore::*;

const NAMES: [&str; 4] = ["prod", "staging", "canary", "batch"];

fn rand_model(version: usize) -> ModelEntry {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(2..15);
    let name: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    ModelEntry::new(name, version.to_string(), rng.gen_range(1..16))
        .with_param("batch_size", rng.gen_range(1..64).to_string())
}

fn rand_snapshot(name: &str, seq: u64) -> Snapshot {
    let mut rng = rand::thread_rng();
    let mut s = Snapshot::new(name, seq, seq * 10);
    for i in 0..rng.gen_range(0..8) {
        s.models.push(rand_model(i));
    }
    s
}

fn main() {
    env_logger::init();
    let mut config = config::Config::default();
    config.set_retain_history(2);

    let ser = Arc::new(open_serializer(&config).unwrap());
    let best: Arc<Vec<AtomicU64>> = Arc::new(NAMES.iter().map(|_| AtomicU64::new(0)).collect());
    for (idx, name) in NAMES.iter().enumerate() {
        if let Ok(s) = ser.get_snapshot(name) {
            best[idx].store(s.sequence, Ordering::Release);
        }
    }
    let rejected = Arc::new(AtomicUsize::new(0));

    let total_test: usize = 20_000;
    let pool = threadpool::Builder::new()
        .num_threads(8)
        .thread_name("save".into())
        .build();

    for i in 0..total_test {
        let ser = ser.clone();
        let best = best.clone();
        let rejected = rejected.clone();
        pool.execute(move || {
            let mut rng = rand::thread_rng();
            let idx = rng.gen_range(0..NAMES.len());
            let floor = best[idx].load(Ordering::Acquire);
            let seq = floor.saturating_sub(4) + rng.gen_range(1..8);
            let s = rand_snapshot(NAMES[idx], seq);

            match ser.save_snapshot(&s) {
                Ok(()) => {
                    best[idx].fetch_max(seq, Ordering::AcqRel);
                }
                Err(e) if e.kind() == ErrorKind::InvariantViolation => {
                    rejected.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => panic!("save {} {}: {}", NAMES[idx], seq, e),
            }

            // any reader sees a whole snapshot
            let cur = ser.get_snapshot(NAMES[idx]).unwrap();
            assert!(cur.sequence > 0);
        });

        let p = i / (total_test / 100);
        if i % (total_test / 10) == 0 {
            info!("submitted {}%", p)
        }
    }
    pool.join();
    assert_eq!(pool.panic_count(), 0, "save worker panicked");

    for (idx, name) in NAMES.iter().enumerate() {
        let s = ser.get_snapshot(name).unwrap();
        assert_eq!(
            s.sequence,
            best[idx].load(Ordering::Acquire),
            "{} stored sequence is not the highest saved",
            name
        );
        let history = ser.history(name).unwrap();
        assert!(history.len() <= 2);
        assert!(history.iter().all(|seq| *seq < s.sequence));
        info!("{} at {}, history {:?}", name, s.sequence, history);
    }
    info!(
        "done, {} stale saves rejected",
        rejected.load(Ordering::Relaxed)
    );
}
