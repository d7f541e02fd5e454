bitflags::bitflags! {
    /// Bit mask of inotify event flags, as passed to `inotify_add_watch(2)`
    /// and reported in each `struct inotify_event`.
    ///
    /// Masks read from the kernel go through [`EventMask::from_bits_retain`]
    /// so flags without a name here survive decoding.
    ///
    /// See [`inotify(7)`](https://man7.org/linux/man-pages/man7/inotify.7.html).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        /// File was modified (e.g., `write(2)`, `truncate(2)`).
        const MODIFY = libc::IN_MODIFY;
        /// Metadata changed, e.g. permissions or link count.
        const ATTRIB = libc::IN_ATTRIB;
        /// File opened for writing was closed.
        const CLOSE_WRITE = libc::IN_CLOSE_WRITE;
        /// File moved out of the watched directory.
        const MOVED_FROM = libc::IN_MOVED_FROM;
        /// File moved into the watched directory.
        const MOVED_TO = libc::IN_MOVED_TO;
        /// File/directory created in the watched directory.
        const CREATE = libc::IN_CREATE;
        /// File/directory deleted from the watched directory.
        const DELETE = libc::IN_DELETE;
        /// The kernel event queue overflowed; events were dropped.
        const Q_OVERFLOW = libc::IN_Q_OVERFLOW;
        /// The watch was removed, explicitly or because it was single-shot.
        const IGNORED = libc::IN_IGNORED;
        /// Subject of this event is a directory.
        const ISDIR = libc::IN_ISDIR;
        /// Remove the watch after the first event.
        const ONESHOT = libc::IN_ONESHOT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_intersects() {
        let mask = EventMask::CREATE | EventMask::ISDIR;
        assert!(mask.contains(EventMask::CREATE));
        assert!(mask.contains(EventMask::CREATE | EventMask::ISDIR));
        assert!(!mask.contains(EventMask::CREATE | EventMask::DELETE));
        assert!(mask.intersects(EventMask::DELETE | EventMask::ISDIR));
        assert!(!mask.intersects(EventMask::MODIFY));
    }

    #[test]
    fn test_kernel_mask_keeps_unnamed_flags() {
        let raw = libc::IN_MODIFY | libc::IN_UNMOUNT;
        let mask = EventMask::from_bits_retain(raw);
        assert!(mask.contains(EventMask::MODIFY));
        assert_eq!(mask.bits(), raw);
        assert_eq!(EventMask::from_bits(raw), None);
        assert_eq!(format!("{mask:x}"), format!("{raw:x}"));
    }
}
