use std::{
    collections::HashSet,
    sync::{Arc, Barrier},
    thread,
};

use keyq::KeyedQueue;
use rand::RngCore;

#[test]
fn racing_enqueues_of_one_key_succeed_exactly_once() {
    for _ in 0..100 {
        let queue = Arc::new(KeyedQueue::new());
        let barrier = Arc::new(Barrier::new(8));

        let attempts: Vec<_> = (0..8)
            .map(|id| {
                let c_queue = queue.clone();
                let c_barrier = barrier.clone();
                thread::spawn(move || {
                    c_barrier.wait();
                    c_queue.enqueue("shared", id)
                })
            })
            .collect();

        let successes = attempts
            .into_iter()
            .map(|th| th.join().unwrap())
            .filter(|&succeeded| succeeded)
            .count();

        assert_eq!(1, successes);
        assert_eq!(1, queue.len());
        assert!(queue.contains_key(&"shared"));
    }
}

#[test]
fn racing_removals_deliver_every_entry_exactly_once() {
    let thread_count = 8;
    let queue = Arc::new(KeyedQueue::new());
    for key in 0u64..thread_count {
        assert!(queue.enqueue(key, key * 2));
    }

    let barrier = Arc::new(Barrier::new(thread_count as usize));
    let removers: Vec<_> = (0..thread_count)
        .map(|key| {
            let c_queue = queue.clone();
            let c_barrier = barrier.clone();
            thread::spawn(move || {
                c_barrier.wait();
                c_queue.try_remove(&key)
            })
        })
        .collect();

    for (key, th) in removers.into_iter().enumerate() {
        assert_eq!(Some(key as u64 * 2), th.join().unwrap());
    }
    assert!(queue.is_empty());
}

#[test]
fn racing_dequeues_never_duplicate_an_entry() {
    let queue = Arc::new(KeyedQueue::new());
    let total = 10_000u64;
    for key in 0..total {
        assert!(queue.enqueue(key, key));
    }

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let c_queue = queue.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(value) = c_queue.try_dequeue() {
                    seen.push(value);
                }
                seen
            })
        })
        .collect();

    let mut all = Vec::new();
    for th in consumers {
        let seen = th.join().unwrap();
        // Each Consumer on its own observes the FIFO-Order
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        all.extend(seen);
    }

    assert_eq!(total as usize, all.len());
    assert_eq!(total as usize, all.iter().collect::<HashSet<_>>().len());
    assert!(queue.is_empty());
}

#[test]
fn concurrent_mixed_traffic_stays_consistent() {
    let queue = Arc::new(KeyedQueue::new());
    let key_space = 512u64;

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let c_queue = queue.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..20_000 {
                    let k = rng.next_u64() % key_space;
                    c_queue.enqueue(k, k);
                }
            })
        })
        .collect();

    let removers: Vec<_> = (0..2)
        .map(|_| {
            let c_queue = queue.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..20_000 {
                    let k = rng.next_u64() % key_space;
                    if let Some(value) = c_queue.try_remove(&k) {
                        assert_eq!(k, value);
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let c_queue = queue.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..20_000 {
                    if rng.next_u64() % 2 == 0 {
                        c_queue.try_dequeue();
                    } else {
                        c_queue.try_peek();
                    }
                }
            })
        })
        .collect();

    for th in producers {
        th.join().unwrap();
    }
    for th in removers {
        th.join().unwrap();
    }
    for th in consumers {
        th.join().unwrap();
    }

    // Whatever is left over must be unique Keys with their matching Values
    let remaining = queue.len();
    let mut drained = Vec::new();
    while let Some(value) = queue.try_dequeue() {
        drained.push(value);
    }
    assert_eq!(remaining, drained.len());
    assert_eq!(drained.len(), drained.iter().collect::<HashSet<_>>().len());
    assert!(drained.iter().all(|v| *v < key_space));
}

#[test]
fn snapshots_under_concurrent_mutation_are_consistent() {
    let queue = Arc::new(KeyedQueue::new());
    for key in 0u64..100 {
        queue.enqueue(key, key);
    }

    let mutator = {
        let c_queue = queue.clone();
        thread::spawn(move || {
            for key in 100u64..10_100 {
                c_queue.enqueue(key, key);
                c_queue.try_dequeue();
            }
        })
    };

    let c_queue = queue.clone();
    let reader = thread::spawn(move || {
        for _ in 0..1_000 {
            let values: Vec<_> = c_queue.iter().collect();
            // A Snapshot is taken atomically, so it observes one Point in
            // Time: either before or after a Mutation of the other Thread,
            // never in between, and always in FIFO-Order
            assert!(values.len() == 100 || values.len() == 101);
            assert!(values.windows(2).all(|w| w[0] < w[1]));
        }
    });

    mutator.join().unwrap();
    reader.join().unwrap();
}
