use bytes::BytesMut;
use tokio::sync::mpsc;

/// Number of buffers a connection's pool holds.
pub const DEFAULT_POOL_BUFFERS: usize = 50;

/// Capacity of each pooled buffer. Large enough for any message a
/// well-behaved switch emits; larger messages span multiple reads.
pub const BUFFER_CAPACITY: usize = 2048;

/// A fixed set of reusable message buffers shared between the framing and
/// parsing halves of a connection.
///
/// Buffers cycle between two queues: `empty` holds buffers awaiting a
/// message, `full` holds framed messages awaiting a parse. The total across
/// both queues and in-flight holders never changes, so a connection's memory
/// is bounded for its lifetime. When every buffer sits in `full`, the framer
/// blocks on `empty_rx` and stops reading from the socket, pushing back on
/// the peer instead of growing the heap.
pub struct BufferPool {
    pub empty_tx: mpsc::Sender<BytesMut>,
    pub empty_rx: mpsc::Receiver<BytesMut>,
    pub full_tx: mpsc::Sender<BytesMut>,
    pub full_rx: mpsc::Receiver<BytesMut>,
}

impl BufferPool {
    /// Create a pool of `buffers` buffers, all starting on the empty queue.
    pub fn new(buffers: usize) -> BufferPool {
        let (empty_tx, empty_rx) = mpsc::channel(buffers);
        let (full_tx, full_rx) = mpsc::channel(buffers);
        for _ in 0..buffers {
            empty_tx
                .try_send(BytesMut::with_capacity(BUFFER_CAPACITY))
                .expect("empty queue sized to hold the whole pool");
        }
        BufferPool {
            empty_tx,
            empty_rx,
            full_tx,
            full_rx,
        }
    }
}

impl Default for BufferPool {
    fn default() -> BufferPool {
        BufferPool::new(DEFAULT_POOL_BUFFERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_starts_with_all_buffers_empty() {
        let mut pool = BufferPool::new(4);
        for _ in 0..4 {
            let buf = pool.empty_rx.try_recv().unwrap();
            assert_eq!(buf.capacity(), BUFFER_CAPACITY);
            assert!(buf.is_empty());
        }
        assert!(pool.empty_rx.try_recv().is_err());
        assert!(pool.full_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn buffers_cycle_between_queues() {
        let mut pool = BufferPool::new(1);
        let mut buf = pool.empty_rx.recv().await.unwrap();
        buf.extend_from_slice(&[1, 2, 3]);
        pool.full_tx.send(buf).await.unwrap();

        let mut buf = pool.full_rx.recv().await.unwrap();
        assert_eq!(&buf[..], &[1, 2, 3]);
        buf.clear();
        pool.empty_tx.send(buf).await.unwrap();

        let buf = pool.empty_rx.recv().await.unwrap();
        assert!(buf.is_empty());
    }
}
