//! Bounded receive ring between a transport's receive path and the poll loop.
//!
//! A UART RX interrupt (or a reader thread) pushes bytes through the
//! [`RxProducer`]; the loop that owns the protocol context drains them
//! through the [`RxConsumer`]. The ring is a `heapless::spsc::Queue`, so
//! neither side takes a lock. When the ring is full, incoming bytes are
//! dropped and counted.
//!
//! # Example
//!
//! ```
//! use mlf_proto::transport::RxQueue;
//!
//! let mut queue: RxQueue<8> = RxQueue::new();
//! let (mut producer, mut consumer) = queue.split();
//!
//! assert_eq!(producer.push_slice(b"0123456789"), 7);
//! assert_eq!(producer.dropped(), 3);
//!
//! let mut buf = [0u8; 16];
//! assert_eq!(consumer.read_into(&mut buf), 7);
//! assert_eq!(&buf[..7], b"0123456");
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use heapless::spsc::{Consumer, Producer, Queue};

/// Default ring size: 63 usable bytes.
pub const DEFAULT_RX_CAPACITY: usize = 64;

/// Fixed-capacity byte ring holding up to `N - 1` bytes.
pub struct RxQueue<const N: usize> {
    queue: Queue<u8, N>,
    dropped: AtomicUsize,
}

impl<const N: usize> RxQueue<N> {
    /// Create an empty ring. Usable in a `static`.
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Split into the single producer and single consumer halves.
    pub fn split(&mut self) -> (RxProducer<'_, N>, RxConsumer<'_, N>) {
        let Self { queue, dropped } = self;
        let dropped = &*dropped;
        let (producer, consumer) = queue.split();
        (
            RxProducer {
                inner: producer,
                dropped,
            },
            RxConsumer {
                inner: consumer,
                dropped,
            },
        )
    }

    /// Total bytes dropped on overflow.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for RxQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Writing half, owned by the receive path.
pub struct RxProducer<'a, const N: usize> {
    inner: Producer<'a, u8, N>,
    dropped: &'a AtomicUsize,
}

impl<'a, const N: usize> RxProducer<'a, N> {
    /// Push one byte. Returns `false` if the ring is full; the byte is
    /// dropped, counted and logged.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.inner.enqueue(byte).is_ok() {
            return true;
        }
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(lost = 1, total, "RX ring overflow, dropping bytes");
        false
    }

    /// Push as many bytes as fit, returning how many were accepted.
    ///
    /// The rest are dropped, counted and logged.
    pub fn push_slice(&mut self, data: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in data {
            if self.inner.enqueue(byte).is_err() {
                break;
            }
            accepted += 1;
        }

        let lost = data.len() - accepted;
        if lost > 0 {
            let total = self.dropped.fetch_add(lost, Ordering::Relaxed) + lost;
            tracing::warn!(lost, total, "RX ring overflow, dropping bytes");
        }
        accepted
    }

    /// Total bytes dropped on overflow.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Reading half, owned by the poll loop.
pub struct RxConsumer<'a, const N: usize> {
    inner: Consumer<'a, u8, N>,
    dropped: &'a AtomicUsize,
}

impl<'a, const N: usize> RxConsumer<'a, N> {
    pub fn pop(&mut self) -> Option<u8> {
        self.inner.dequeue()
    }

    /// Move buffered bytes into `buf`, returning the count.
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.inner.dequeue() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Total bytes dropped on overflow.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}
