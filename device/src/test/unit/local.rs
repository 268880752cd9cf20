use crate::LocalMemory;

#[test]
fn test_reset_and_bump() {
    let mut local = LocalMemory::new(256).unwrap();
    local.reset(64);

    let first = local.alloc(16);
    let second = local.alloc(32);
    assert_eq!(first.addr(), local.base().addr() + 64);
    assert_eq!(second.addr(), first.addr() + 16);
    assert_eq!(local.used(), 112);

    local.reset(0);
    assert_eq!(local.alloc(8), local.base());
}

#[test]
fn test_fill_to_capacity() {
    let mut local = LocalMemory::new(128).unwrap();
    local.reset(28);
    local.alloc(50);
    local.alloc(50);
    assert_eq!(local.remaining(), 0);
}

#[test]
#[should_panic(expected = "overflows local memory")]
fn test_alloc_overflow_is_fatal() {
    let mut local = LocalMemory::new(64).unwrap();
    local.reset(32);
    local.alloc(33);
}

#[test]
#[should_panic(expected = "exceeds local memory capacity")]
fn test_reset_overflow_is_fatal() {
    let mut local = LocalMemory::new(64).unwrap();
    local.reset(65);
}
