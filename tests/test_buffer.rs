use citadel::http::buffer::{BufferFull, ReadBuffer, WriteBuffer};

#[test]
fn test_read_buffer_tracks_received_bytes() {
    let mut buf = ReadBuffer::new(16);
    assert_eq!(buf.capacity(), 16);
    assert_eq!(buf.read_pos(), 0);

    buf.spare_mut()[..5].copy_from_slice(b"hello");
    buf.advance_read(5);

    assert_eq!(buf.read_pos(), 5);
    assert_eq!(buf.slice(0..5), b"hello");
    assert_eq!(buf.spare_mut().len(), 11);
    assert!(!buf.is_full());
}

#[test]
fn test_read_buffer_reports_full() {
    let mut buf = ReadBuffer::new(4);
    buf.spare_mut().copy_from_slice(b"abcd");
    buf.advance_read(4);
    assert!(buf.is_full());
    assert!(buf.spare_mut().is_empty());
}

#[test]
#[should_panic]
fn test_read_buffer_rejects_overrun() {
    let mut buf = ReadBuffer::new(4);
    buf.advance_read(5);
}

#[test]
#[should_panic]
fn test_read_buffer_scan_cursor_cannot_pass_received_data() {
    let mut buf = ReadBuffer::new(8);
    buf.spare_mut()[..3].copy_from_slice(b"abc");
    buf.advance_read(3);
    buf.set_checked(4);
}

#[test]
fn test_read_buffer_reset_clears_cursors_and_bytes() {
    let mut buf = ReadBuffer::new(8);
    buf.spare_mut()[..3].copy_from_slice(b"abc");
    buf.advance_read(3);
    buf.set_checked(2);
    buf.start_line();

    buf.reset();
    assert_eq!(buf.read_pos(), 0);
    assert_eq!(buf.checked_pos(), 0);
    assert_eq!(buf.line_start(), 0);

    // Previously received bytes are gone, not merely hidden.
    buf.advance_read(3);
    assert_eq!(buf.slice(0..3), &[0, 0, 0]);
}

#[test]
fn test_write_buffer_appends_and_stages() {
    let mut buf = WriteBuffer::new(16);
    assert!(buf.is_empty());

    buf.append(b"HTTP/1.1 ").unwrap();
    buf.append(b"200").unwrap();
    assert_eq!(buf.staged(), b"HTTP/1.1 200");
    assert_eq!(buf.len(), 12);
    assert_eq!(buf.remaining(), 4);
}

#[test]
fn test_write_buffer_append_is_all_or_nothing() {
    let mut buf = WriteBuffer::new(8);
    buf.append(b"abcde").unwrap();

    assert_eq!(buf.append(b"fghi"), Err(BufferFull));
    // The failed append staged nothing.
    assert_eq!(buf.staged(), b"abcde");
    assert_eq!(buf.len(), 5);

    buf.append(b"fgh").unwrap();
    assert_eq!(buf.staged(), b"abcdefgh");
}

#[test]
fn test_write_buffer_reset_empties() {
    let mut buf = WriteBuffer::new(8);
    buf.append(b"abc").unwrap();
    buf.reset();
    assert!(buf.is_empty());
    assert_eq!(buf.remaining(), 8);
}
