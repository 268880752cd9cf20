use crate::RuntimeConfig;
use crate::config::{DEFAULT_GLOBAL_MEMORY, DEFAULT_LOCAL_MEMORY};

#[test]
fn test_default_config() {
    let config = RuntimeConfig::default();
    assert_eq!(config.multiprocessors, 1);
    assert!(config.workers >= 1);
    assert!(config.pin_threads);
    assert_eq!(config.global_memory, DEFAULT_GLOBAL_MEMORY);
    assert_eq!(config.local_memory, 32 * 1024);
    assert_eq!(DEFAULT_LOCAL_MEMORY, 32 * 1024);
}

#[test]
fn test_builder_matches_default() {
    assert_eq!(RuntimeConfig::builder().build(), RuntimeConfig::default());
}

#[test]
fn test_builder_overrides() {
    let config = RuntimeConfig::builder().multiprocessors(2).workers(6).pin_threads(false).local_memory(1024).build();
    assert_eq!(config.multiprocessors, 2);
    assert_eq!(config.workers, 6);
    assert!(!config.pin_threads);
    assert_eq!(config.local_memory, 1024);
}

#[test]
fn test_partition_round_robin() {
    let config = RuntimeConfig::builder().multiprocessors(2).workers(5).build();
    let partition = config.partition();
    let cpus = num_cpus::get();

    assert_eq!(partition.len(), 2);
    assert_eq!(partition[0].len(), 3);
    assert_eq!(partition[1].len(), 2);
    assert_eq!(partition[0][1], 2 % cpus);
    assert_eq!(partition[1][0], 1 % cpus);
}
