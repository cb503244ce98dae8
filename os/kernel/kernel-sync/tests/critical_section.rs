use kernel_sync::{IrqSpinLock, NoIrqMask, SpinLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

type Critical<T> = IrqSpinLock<T, NoIrqMask>;

#[test]
fn guard_releases_on_drop() {
    let l = Critical::new(0_u32);

    {
        let mut g = l.lock();
        *g = 41;
    }

    let mut g = l.lock();
    *g += 1;
    assert_eq!(*g, 42);
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinLock::new(7u8);

    let held = l.try_lock();
    assert!(held.is_some());
    assert!(l.try_lock().is_none());

    drop(held);
    assert_eq!(l.try_lock().map(|g| *g), Some(7));
}

#[test]
fn with_lock_returns_closure_value() {
    let l = Critical::new(vec![1u32, 2]);
    let len = l.with_lock(|v| {
        v.push(3);
        v.len()
    });
    assert_eq!(len, 3);
    assert_eq!(l.into_inner(), vec![1, 2, 3]);
}

#[test]
fn get_mut_needs_no_locking() {
    let mut l = Critical::new([0u8; 4]);
    l.get_mut()[2] = 9;
    assert_eq!(l.lock()[2], 9);
}

#[test]
fn queue_like_updates_stay_exclusive_under_contention() {
    let threads = 6;
    let iters = 4_000;

    // (head, tail) must always move together
    let lock = Arc::new(Critical::new((0usize, 0usize)));
    let inside = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    lock.with_lock(|(head, tail)| {
                        let overlapping = inside.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(overlapping, 0, "overlapping critical sections");
                        assert_eq!(*head, *tail);
                        *head += 1;
                        *tail += 1;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(lock.with_lock(|(h, _)| *h), threads * iters);
}

#[test]
fn panic_inside_section_unlocks() {
    let l = Critical::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 5;
            panic!("splice failed");
        });
    }));
    assert!(res.is_err());
    assert_eq!(l.with_lock(|v| *v), 5);
}

#[test]
fn critical_section_is_sync_for_send_payload() {
    fn takes_sync<S: Sync>(_s: &S) {}
    takes_sync(&Critical::new(0u64));
}
