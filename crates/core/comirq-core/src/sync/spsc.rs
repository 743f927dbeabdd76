//! Single-producer/single-consumer byte ring.
//!
//! [`RingBuffer`] carries received bytes from an interrupt handler (the
//! producer) to a polling mainline loop (the consumer). The two contexts
//! interleave unpredictably, so every shared field is an atomic: the write
//! cursor and slot stores belong to the producer, the read cursor and slot
//! loads belong to the consumer, and the overflow flag is set by the producer
//! and cleared by the consumer.
//!
//! # Capacity
//!
//! The backing array holds `N` slots but the usable capacity is `N - 1`: the
//! buffer is full when advancing the write cursor would make it equal to the
//! read cursor. A push into a full buffer is rejected, never overwrites, and
//! raises the overflow flag.
//!
//! # Ordering
//!
//! The producer stores the byte, then publishes it with a `Release` store of
//! the write cursor. The consumer `Acquire`-loads the write cursor before
//! reading the slot, and releases the slot back with a `Release` store of the
//! read cursor, which the producer `Acquire`-loads before reusing it.

use super::loom_compat::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// A fixed-capacity lock-free byte queue for one producer and one consumer.
///
/// Calling [`push`](Self::push) from more than one context, or
/// [`pop`](Self::pop)/[`clear`](Self::clear) from more than one context, is a
/// logic error that may lose or duplicate bytes. It cannot cause undefined
/// behavior.
///
/// # Example
///
/// ```ignore
/// static RX: RingBuffer<256> = RingBuffer::new();
///
/// // Interrupt handler:
/// if !RX.push(byte) { /* dropped, overflow flag set */ }
///
/// // Mainline:
/// while let Some(byte) = RX.pop() { /* ... */ }
/// ```
pub struct RingBuffer<const N: usize> {
    buf: [AtomicU8; N],
    /// Next slot the producer stores into.
    write: AtomicUsize,
    /// Next slot the consumer loads from.
    read: AtomicUsize,
    overflow: AtomicBool,
}

impl<const N: usize> RingBuffer<N> {
    /// The total size of the backing array. The usable capacity is `SIZE - 1`.
    pub const SIZE: usize = N;

    /// Creates an empty ring buffer.
    #[cfg(not(loom))]
    #[must_use]
    pub const fn new() -> Self {
        const { assert!(N >= 2, "RingBuffer needs at least two slots") };
        Self {
            buf: [const { AtomicU8::new(0) }; N],
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            overflow: AtomicBool::new(false),
        }
    }

    /// Creates an empty ring buffer.
    #[cfg(loom)]
    #[must_use]
    pub fn new() -> Self {
        const { assert!(N >= 2, "RingBuffer needs at least two slots") };
        Self {
            buf: core::array::from_fn(|_| AtomicU8::new(0)),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            overflow: AtomicBool::new(false),
        }
    }

    /// Returns the maximum number of bytes the buffer can hold (`N - 1`).
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    /// Appends a byte. Producer role.
    ///
    /// Returns `false` and sets the overflow flag without touching storage or
    /// the write cursor if the buffer is full.
    pub fn push(&self, byte: u8) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let next = (write + 1) % N;

        if next == self.read.load(Ordering::Acquire) {
            self.overflow.store(true, Ordering::Release);
            return false;
        }

        self.buf[write].store(byte, Ordering::Relaxed);
        self.write.store(next, Ordering::Release);
        true
    }

    /// Removes the oldest byte. Consumer role.
    ///
    /// Returns `None` if the buffer is empty.
    pub fn pop(&self) -> Option<u8> {
        let read = self.read.load(Ordering::Relaxed);
        if read == self.write.load(Ordering::Acquire) {
            return None;
        }

        let byte = self.buf[read].load(Ordering::Relaxed);
        self.read.store((read + 1) % N, Ordering::Release);
        Some(byte)
    }

    /// Returns the number of queued bytes.
    ///
    /// Correct under wraparound regardless of which cursor is numerically
    /// larger. Does not modify any state.
    #[must_use]
    pub fn available(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        (write + N - read) % N
    }

    /// Returns `true` if no bytes are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Returns `true` if the next push would be rejected.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.available() == N - 1
    }

    /// Reads and clears the overflow flag. Consumer role.
    ///
    /// Returns `true` if at least one push was rejected since the last call.
    pub fn take_overflow(&self) -> bool {
        self.overflow.swap(false, Ordering::AcqRel)
    }

    /// Discards every queued byte and clears the overflow flag. Consumer role.
    ///
    /// Only the read cursor moves, so this is safe to call while the producer
    /// is still active; bytes pushed concurrently may or may not survive.
    pub fn clear(&self) {
        let write = self.write.load(Ordering::Acquire);
        self.read.store(write, Ordering::Release);
        self.overflow.store(false, Ordering::Release);
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for RingBuffer<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("size", &N)
            .field("write", &self.write.load(Ordering::Relaxed))
            .field("read", &self.read.load(Ordering::Relaxed))
            .field("overflow", &self.overflow.load(Ordering::Relaxed))
            .finish()
    }
}


#[cfg(all(test, loom))]
mod loom_tests {
    use super::RingBuffer;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn concurrent_push_pop_preserves_order() {
        loom::model(|| {
            let ring = Arc::new(RingBuffer::<4>::new());

            let producer = {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for byte in 1..=3u8 {
                        assert!(ring.push(byte));
                    }
                })
            };

            let mut seen = Vec::new();
            for _ in 0..3 {
                if let Some(byte) = ring.pop() {
                    seen.push(byte);
                }
            }
            producer.join().unwrap();
            while let Some(byte) = ring.pop() {
                seen.push(byte);
            }

            assert_eq!(seen, [1, 2, 3]);
            assert!(!ring.take_overflow());
        });
    }

    #[test]
    fn overflow_flag_matches_rejected_pushes() {
        loom::model(|| {
            let ring = Arc::new(RingBuffer::<2>::new());

            let producer = {
                let ring = Arc::clone(&ring);
                thread::spawn(move || [1u8, 2].into_iter().filter(|&b| ring.push(b)).count())
            };

            let mut seen: Vec<u8> = ring.pop().into_iter().collect();
            let accepted = producer.join().unwrap();
            while let Some(byte) = ring.pop() {
                seen.push(byte);
            }

            assert_eq!(seen.len(), accepted);
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(ring.take_overflow(), accepted < 2);
            assert!(!ring.take_overflow());
        });
    }
}
