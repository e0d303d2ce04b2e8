use hardmon::core::telemetry::{TopologyResolver, Vendor};

use super::fakes::{thread, FakeProbe};

#[test]
fn test_resolution_is_deterministic() {
    let probe = FakeProbe::new(vec![
        thread(5, 1, 0, Vendor::Amd, 0x19, 0x21),
        thread(0, 0, 0, Vendor::Amd, 0x19, 0x21),
        thread(1, 0, 0, Vendor::Amd, 0x19, 0x21),
        thread(2, 0, 1, Vendor::Amd, 0x19, 0x21),
    ]);

    let first = TopologyResolver::new(&probe).resolve();
    let second = TopologyResolver::new(&probe).resolve();

    assert_eq!(first, second);
    assert_eq!(first.packages.len(), 2);
    assert_eq!(first.core_count(), 3);
    assert_eq!(first.thread_count(), 4);
    // Slots are walked in index order, so threads keep that order per core
    let core = &first.packages[0].cores[0];
    assert_eq!(core.threads.iter().map(|t| t.index).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(first.packages[1].first_thread().map(|t| t.index), Some(5));
}

#[test]
fn test_empty_probe_gives_empty_topology() {
    let probe = FakeProbe::new(Vec::new());
    let topology = TopologyResolver::new(&probe).resolve();
    assert!(topology.is_empty());
    assert_eq!(topology.thread_count(), 0);
}
