//! Tests for the decode buffer

use super::{DecodeBuffer, GrowthPolicy};
use crate::error::BufferError;

#[test]
fn test_next_capacity_doubles() {
    let policy = GrowthPolicy::new(16, 2, 1024);
    assert_eq!(policy.next_capacity(16, 1), 32);
    assert_eq!(policy.next_capacity(32, 10), 64);
}

#[test]
fn test_next_capacity_large_delta() {
    let policy = GrowthPolicy::new(16, 2, 1024);
    assert_eq!(policy.next_capacity(16, 100), 116);
}

#[test]
fn test_next_capacity_first_allocation() {
    let policy = GrowthPolicy::new(16, 2, 1024);
    assert_eq!(policy.next_capacity(0, 4), 16);
    assert_eq!(policy.next_capacity(0, 40), 40);
}

#[test]
fn test_next_capacity_custom_factor() {
    let policy = GrowthPolicy::new(16, 4, 1024);
    assert_eq!(policy.next_capacity(16, 1), 64);
}

#[test]
fn test_lazy_allocation() {
    let buffer = DecodeBuffer::new(GrowthPolicy::new(16, 2, 1024));
    assert_eq!(buffer.allocated(), 0);
    assert_eq!(buffer.used(), 0);
    assert!(buffer.pending().is_empty());
}

#[test]
fn test_append_grows_per_policy() {
    let mut buffer = DecodeBuffer::new(GrowthPolicy::new(16, 2, 1024));

    buffer.append(b"0123456789").unwrap();
    assert_eq!(buffer.allocated(), 16);
    assert_eq!(buffer.used(), 10);

    buffer.append(b"0123456789").unwrap();
    assert_eq!(buffer.allocated(), 32);
    assert_eq!(buffer.used(), 20);

    buffer.append(&[b'x'; 100]).unwrap();
    assert_eq!(buffer.allocated(), 132);
    assert!(buffer.used() <= buffer.allocated());
}

#[test]
fn test_growth_capped_at_max() {
    let mut buffer = DecodeBuffer::new(GrowthPolicy::new(16, 2, 30));

    buffer.append(&[b'a'; 16]).unwrap();
    buffer.append(&[b'b'; 10]).unwrap();
    assert_eq!(buffer.allocated(), 30);
    assert_eq!(buffer.used(), 26);
}

#[test]
fn test_limit_exceeded_leaves_buffer_unchanged() {
    let mut buffer = DecodeBuffer::new(GrowthPolicy::new(16, 2, 32));
    buffer.append(&[b'a'; 30]).unwrap();

    let err = buffer.append(&[b'b'; 3]).unwrap_err();
    assert!(matches!(
        err,
        BufferError::LimitExceeded {
            required: 33,
            limit: 32
        }
    ));
    assert_eq!(buffer.used(), 30);
}

#[test]
fn test_advance_and_compact() {
    let mut buffer = DecodeBuffer::new(GrowthPolicy::default());
    buffer.append(b"{\"a\":1}{\"b\"").unwrap();

    buffer.advance(7);
    assert_eq!(buffer.cursor(), 7);
    assert_eq!(buffer.pending(), b"{\"b\"");

    let allocated = buffer.allocated();
    buffer.compact();
    assert_eq!(buffer.cursor(), 0);
    assert_eq!(buffer.pending(), b"{\"b\"");
    assert_eq!(buffer.allocated(), allocated);
}

#[test]
fn test_clear_and_release() {
    let mut buffer = DecodeBuffer::new(GrowthPolicy::default());
    buffer.append(b"abc").unwrap();

    buffer.clear();
    assert_eq!(buffer.used(), 0);
    assert_eq!(buffer.allocated(), 2048);

    buffer.release();
    assert_eq!(buffer.allocated(), 0);
}
