//! Inspector session: weight regeneration and concurrent readers.

use std::sync::Arc;
use std::thread;

use minunet_core::forward::{create_sample_input, forward_pass};
use minunet_core::{Inspector, UNetConfig};

#[test]
fn test_old_handle_survives_regenerate() {
    let mut inspector = Inspector::new(UNetConfig::reference(), 21).unwrap();
    let old = inspector.model();
    let old_trace = forward_pass(&old, create_sample_input(), 1.0).unwrap();

    inspector.regenerate().unwrap();

    // The previous model is untouched and still produces the same trace.
    let again = forward_pass(&old, create_sample_input(), 1.0).unwrap();
    assert_eq!(old_trace, again);
    let fresh = inspector.trace_sample(1.0).unwrap();
    assert_ne!(fresh.output, old_trace.output);
}

#[test]
fn test_concurrent_forward_passes_agree() {
    let inspector = Inspector::new(UNetConfig::reference(), 4).unwrap();
    let model = inspector.model();
    let expected = inspector.trace_sample(0.8).unwrap();

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let model = Arc::clone(&model);
                s.spawn(move || forward_pass(&model, create_sample_input(), 0.8).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for state in results {
        assert_eq!(state, expected);
    }
}

#[test]
fn test_regenerate_while_readers_hold_model() {
    let mut inspector = Inspector::new(UNetConfig::reference(), 99).unwrap();
    let held = inspector.model();
    let baseline = forward_pass(&held, create_sample_input(), 2.0).unwrap();

    thread::scope(|s| {
        let reader = s.spawn(|| {
            (0..50)
                .map(|_| forward_pass(&held, create_sample_input(), 2.0).unwrap())
                .all(|state| state == baseline)
        });
        for _ in 0..5 {
            inspector.regenerate().unwrap();
        }
        assert!(reader.join().unwrap(), "reader saw a changed model");
    });
    assert_eq!(inspector.generation(), 5);
}

#[test]
fn test_trace_random_is_seeded() {
    let mut a = Inspector::new(UNetConfig::reference(), 3).unwrap();
    let mut b = Inspector::new(UNetConfig::reference(), 3).unwrap();
    assert_eq!(a.trace_random(1.0).unwrap(), b.trace_random(1.0).unwrap());
}
