//! Decoder for the byte stream returned by `read(2)` on an inotify descriptor.
//!
//! Each record is a fixed 16-byte header followed by `len` bytes of
//! NUL-padded file name:
//!
//! ```text
//! struct inotify_event {
//!     int      wd;
//!     uint32_t mask;
//!     uint32_t cookie;
//!     uint32_t len;
//!     char     name[];
//! };
//! ```
//!
//! [`EventReader`] validates the header and the declared name length against
//! the bytes actually remaining before slicing, so a short or corrupt buffer
//! produces a [`DecodeError`] instead of reading out of bounds.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;

use super::error::DecodeError;
use super::{EventMask, WatchHandle};

/// Size of the fixed part of `struct inotify_event`.
pub const EVENT_HEADER_LEN: usize = 16;

/// One decoded inotify record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Watch the event was reported on. `-1` for queue overflow.
    pub handle: WatchHandle,
    pub mask: EventMask,
    /// Links `IN_MOVED_FROM`/`IN_MOVED_TO` pairs of one rename.
    pub cookie: u32,
    /// Name of the directory entry, relative to the watched directory.
    /// `None` when the event concerns the watched object itself.
    pub name: Option<OsString>,
}

/// Iterator over the records of one inotify read buffer.
///
/// Decoding stops after the first error.
#[derive(Debug)]
pub struct EventReader<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> EventReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }

    /// Number of bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.offset
    }

    fn read_u32(&self, at: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.buf[at..at + 4]);
        u32::from_ne_bytes(word)
    }

    fn decode_next(&mut self) -> Result<RawEvent, DecodeError> {
        let offset = self.offset;
        let remaining = self.buf.len() - offset;
        if remaining < EVENT_HEADER_LEN {
            return Err(DecodeError::TruncatedHeader { offset, remaining });
        }

        let handle = WatchHandle::new(self.read_u32(offset) as i32);
        let mask = EventMask::from_bits_retain(self.read_u32(offset + 4));
        let cookie = self.read_u32(offset + 8);
        let declared = self.read_u32(offset + 12) as usize;

        let name_start = offset + EVENT_HEADER_LEN;
        let available = remaining - EVENT_HEADER_LEN;
        if declared > available {
            return Err(DecodeError::TruncatedName {
                offset,
                declared,
                available,
            });
        }

        let raw_name = &self.buf[name_start..name_start + declared];
        let trimmed = match raw_name.iter().position(|b| *b == 0) {
            Some(end) => &raw_name[..end],
            None => raw_name,
        };
        let name = if trimmed.is_empty() {
            None
        } else {
            Some(OsString::from_vec(trimmed.to_vec()))
        };

        self.offset = name_start + declared;
        Ok(RawEvent {
            handle,
            mask,
            cookie,
            name,
        })
    }
}

impl Iterator for EventReader<'_> {
    type Item = Result<RawEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }
        let result = self.decode_next();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

#[cfg(test)]
pub(crate) fn encode_event(wd: i32, mask: u32, cookie: u32, name: &str, padded_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(EVENT_HEADER_LEN + padded_len);
    out.extend_from_slice(&wd.to_ne_bytes());
    out.extend_from_slice(&mask.to_ne_bytes());
    out.extend_from_slice(&cookie.to_ne_bytes());
    out.extend_from_slice(&(padded_len as u32).to_ne_bytes());
    let mut name = name.as_bytes().to_vec();
    name.resize(padded_len, 0);
    out.extend_from_slice(&name);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_event_with_padded_name() {
        let buf = encode_event(3, libc::IN_CREATE, 0, "0.log", 16);
        let mut reader = EventReader::new(&buf);

        let event = reader.next().unwrap().unwrap();
        assert_eq!(event.handle, WatchHandle::new(3));
        assert_eq!(event.mask, EventMask::CREATE);
        assert_eq!(event.name, Some(OsString::from("0.log")));
        assert!(reader.next().is_none());
        assert_eq!(reader.consumed(), buf.len());
    }

    #[test]
    fn test_decode_event_without_name() {
        let buf = encode_event(7, libc::IN_MODIFY, 0, "", 0);
        let events: Vec<_> = EventReader::new(&buf).collect();

        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.handle, WatchHandle::new(7));
        assert_eq!(event.name, None);
    }

    #[test]
    fn test_decode_multiple_events() {
        let mut buf = encode_event(1, libc::IN_CREATE | libc::IN_ISDIR, 0, "ns_pod_uid", 32);
        buf.extend(encode_event(2, libc::IN_CLOSE_WRITE, 0, "", 0));
        buf.extend(encode_event(-1, libc::IN_Q_OVERFLOW, 0, "", 0));

        let events: Vec<RawEvent> = EventReader::new(&buf).map(Result::unwrap).collect();
        assert_eq!(events.len(), 3);
        assert!(events[0].mask.contains(EventMask::ISDIR));
        assert_eq!(events[0].name, Some(OsString::from("ns_pod_uid")));
        assert_eq!(events[1].mask, EventMask::CLOSE_WRITE);
        assert_eq!(events[2].handle, WatchHandle::new(-1));
        assert!(events[2].mask.contains(EventMask::Q_OVERFLOW));
    }

    #[test]
    fn test_truncated_header() {
        let mut buf = encode_event(1, libc::IN_MODIFY, 0, "", 0);
        buf.extend_from_slice(&[0u8; 5]);

        let mut reader = EventReader::new(&buf);
        assert!(reader.next().unwrap().is_ok());
        match reader.next().unwrap() {
            Err(DecodeError::TruncatedHeader { offset, remaining }) => {
                assert_eq!(offset, EVENT_HEADER_LEN);
                assert_eq!(remaining, 5);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_declared_name_longer_than_buffer() {
        let mut buf = encode_event(1, libc::IN_CREATE, 0, "0.log", 16);
        buf.truncate(EVENT_HEADER_LEN + 8);

        let mut reader = EventReader::new(&buf);
        match reader.next().unwrap() {
            Err(DecodeError::TruncatedName {
                declared,
                available,
                ..
            }) => {
                assert_eq!(declared, 16);
                assert_eq!(available, 8);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(reader.next().is_none());
    }
}
