use std::sync::Arc;
use std::thread;

use glance_core::SampleHistory;

#[test]
fn test_wrap_around_keeps_last_capacity_items() {
    let capacity = 8;
    let history = SampleHistory::new(capacity);

    // Insert capacity + k items; only the last `capacity` survive, in order
    for i in 0..(capacity + 5) {
        history.add(i);
    }

    assert_eq!(history.len(), capacity);

    let expected: Vec<usize> = (5..capacity + 5).collect();
    assert_eq!(history.to_vec(), expected);

    assert_eq!(history.recent(capacity), history.to_vec());
    assert_eq!(history.recent(capacity + 5), history.to_vec());
    assert_eq!(history.latest(), Some(capacity + 4));
}

#[test]
fn test_recent_subset_is_suffix_of_full_list() {
    let history = SampleHistory::new(10);
    for i in 0..25 {
        history.add(i);
    }

    let full = history.to_vec();
    for n in 0..=10 {
        let recent = history.recent(n);
        assert_eq!(recent.len(), n);
        assert_eq!(recent.as_slice(), &full[full.len() - n..]);
    }
}

#[test]
fn test_exact_capacity_fill() {
    let history = SampleHistory::new(4);
    for i in 0..4 {
        history.add(i);
    }

    assert_eq!(history.len(), 4);
    assert_eq!(history.to_vec(), vec![0, 1, 2, 3]);
}

#[test]
fn test_concurrent_writer_and_reader() {
    let history = Arc::new(SampleHistory::new(64));

    let writer = {
        let history = Arc::clone(&history);
        thread::spawn(move || {
            for i in 0..10_000u64 {
                history.add(i);
            }
        })
    };

    let reader = {
        let history = Arc::clone(&history);
        thread::spawn(move || {
            for _ in 0..1_000 {
                let items = history.to_vec();
                assert!(items.len() <= 64);
                // Chronological order must hold under concurrent writes
                assert!(items.windows(2).all(|w| w[0] < w[1]));
                let _ = history.latest();
                let _ = history.recent(16);
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();

    assert_eq!(history.len(), 64);
    assert_eq!(history.latest(), Some(9_999));
}
