use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use crate::buffer_pool::{BufferPool, BUFFER_CAPACITY};
use crate::error::{SendError, StreamError};
use crate::ofp_header::OfpHeader;
use crate::ofp_message::OfpMessage;
use crate::openflow0x01::message::Message;

const OUTBOUND_QUEUE_DEPTH: usize = 64;
const INBOUND_QUEUE_DEPTH: usize = 64;

/// A connection to a peer, seen as typed messages instead of bytes.
///
/// Three tasks service the connection: one writes outbound messages to the
/// socket, one reassembles inbound bytes into length-delimited frames using
/// pooled buffers, and one decodes frames into `Message`s. All three exit
/// when the connection shuts down, whether by `shutdown()`, peer close, or
/// socket error.
pub struct MessageStream {
    /// Decoded messages from the peer, paired with their transaction ids.
    /// Yields `None` once the connection is torn down.
    pub inbound: mpsc::Receiver<(u32, Message)>,
    /// Messages to encode and write to the peer.
    pub outbound: mpsc::Sender<(u32, Message)>,
    /// Terminal transport failures. Holds at most one error; the first to
    /// occur wins.
    pub errors: mpsc::Receiver<StreamError>,
    shutdown: mpsc::Sender<()>,
}

impl MessageStream {
    pub fn new<C>(conn: C) -> MessageStream
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
    {
        MessageStream::with_pool(conn, BufferPool::default())
    }

    /// Like `new`, with a caller-sized buffer pool.
    pub fn with_pool<C>(conn: C, pool: BufferPool) -> MessageStream
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(conn);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let (error_tx, error_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (teardown_tx, teardown_rx) = watch::channel(false);
        let BufferPool {
            empty_tx,
            empty_rx,
            full_tx,
            full_rx,
        } = pool;
        tokio::spawn(run_outbound(
            writer,
            outbound_rx,
            shutdown_rx,
            teardown_tx,
            error_tx.clone(),
        ));
        tokio::spawn(run_framer(reader, empty_rx, full_tx, teardown_rx, error_tx));
        tokio::spawn(run_parser(full_rx, empty_tx, inbound_tx));
        MessageStream {
            inbound: inbound_rx,
            outbound: outbound_tx,
            errors: error_rx,
            shutdown: shutdown_tx,
        }
    }

    /// Ask the connection to shut down. Returns immediately; the tasks tear
    /// down in the background and `inbound` closes once they have. Safe to
    /// call more than once.
    pub fn shutdown(&self) {
        let _ = self.shutdown.try_send(());
    }

    /// A cloneable handle for sending on and shutting down this stream.
    pub fn handle(&self) -> StreamHandle {
        StreamHandle {
            outbound: self.outbound.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// The sending side of a `MessageStream`, detached from the receivers so it
/// can be held wherever messages originate.
#[derive(Clone)]
pub struct StreamHandle {
    outbound: mpsc::Sender<(u32, Message)>,
    shutdown: mpsc::Sender<()>,
}

impl StreamHandle {
    /// Queue a message without waiting. Success means the message was handed
    /// to the write task, not that it reached the wire; socket failures after
    /// the handoff surface on the stream's error channel.
    pub fn send(&self, xid: u32, msg: Message) -> Result<(), SendError> {
        self.outbound.try_send((xid, msg)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.try_send(());
    }

    /// Whether two handles refer to the same underlying connection.
    pub fn same_stream(&self, other: &StreamHandle) -> bool {
        self.outbound.same_channel(&other.outbound)
    }
}

/// Marshal queued messages onto the socket. On shutdown, close the write
/// half and flag the framer so the whole connection unwinds.
async fn run_outbound<W>(
    mut writer: W,
    mut outbound_rx: mpsc::Receiver<(u32, Message)>,
    mut shutdown_rx: mpsc::Receiver<()>,
    teardown_tx: watch::Sender<bool>,
    error_tx: mpsc::Sender<StreamError>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            msg = outbound_rx.recv() => match msg {
                None => break,
                Some((xid, msg)) => {
                    let bytes = Message::marshal(xid, msg);
                    if let Err(e) = writer.write_all(&bytes).await {
                        let _ = error_tx.try_send(StreamError::Write(e));
                        break;
                    }
                }
            },
        }
    }
    let _ = writer.shutdown().await;
    let _ = teardown_tx.send(true);
}

enum Framing {
    /// Gathering the version, type, and length fields of the next header.
    Header([u8; 4], usize),
    /// Accumulating the rest of a message into a pooled buffer.
    Body(BytesMut, usize),
}

/// Reassemble the byte stream into whole messages, one pooled buffer per
/// message. Framing state persists across reads, so a message split at any
/// byte boundary comes out intact. Taking a buffer from the empty queue is
/// the backpressure point: when the pool is exhausted, this task stops
/// reading and the peer's writes eventually stall.
async fn run_framer<R>(
    mut reader: R,
    mut empty_rx: mpsc::Receiver<BytesMut>,
    full_tx: mpsc::Sender<BytesMut>,
    mut teardown_rx: watch::Receiver<bool>,
    error_tx: mpsc::Sender<StreamError>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut scratch = [0u8; BUFFER_CAPACITY];
    let mut framing = Framing::Header([0; 4], 0);
    loop {
        let n = tokio::select! {
            _ = teardown_rx.changed() => return,
            r = reader.read(&mut scratch) => match r {
                Ok(0) => return,
                Ok(n) => n,
                Err(e) => {
                    let _ = error_tx.try_send(StreamError::Read(e));
                    return;
                }
            },
        };
        let mut i = 0;
        while i < n {
            framing = match framing {
                Framing::Header(mut hdr, mut have) => {
                    hdr[have] = scratch[i];
                    have += 1;
                    i += 1;
                    if have < hdr.len() {
                        Framing::Header(hdr, have)
                    } else {
                        let total = u16::from_be_bytes([hdr[2], hdr[3]]) as usize;
                        if total < OfpHeader::size() {
                            let _ = error_tx.try_send(StreamError::Read(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!("peer declared message length {}", total),
                            )));
                            return;
                        }
                        match empty_rx.recv().await {
                            None => return,
                            Some(mut buf) => {
                                buf.extend_from_slice(&hdr);
                                Framing::Body(buf, total - hdr.len())
                            }
                        }
                    }
                }
                Framing::Body(mut buf, mut needed) => {
                    let take = needed.min(n - i);
                    buf.extend_from_slice(&scratch[i..i + take]);
                    needed -= take;
                    i += take;
                    if needed > 0 {
                        Framing::Body(buf, needed)
                    } else {
                        if full_tx.send(buf).await.is_err() {
                            return;
                        }
                        Framing::Header([0; 4], 0)
                    }
                }
            };
        }
    }
}

/// Decode framed buffers and recycle them. A message that fails to decode
/// is logged and dropped; the connection keeps running. A buffer that does
/// not hold exactly one whole message means the framer broke its contract,
/// and the task stops rather than guess at the stream state.
async fn run_parser(
    mut full_rx: mpsc::Receiver<BytesMut>,
    empty_tx: mpsc::Sender<BytesMut>,
    inbound_tx: mpsc::Sender<(u32, Message)>,
) {
    while let Some(mut buf) = full_rx.recv().await {
        let header = match OfpHeader::parse(&buf) {
            Ok(h) => h,
            Err(e) => {
                log::error!("framed buffer holds no header: {}", e);
                return;
            }
        };
        if header.length() != buf.len() {
            log::error!(
                "framed buffer holds {} bytes but its header declares {}",
                buf.len(),
                header.length()
            );
            return;
        }
        match Message::parse(&header, &buf[OfpHeader::size()..]) {
            Ok((xid, msg)) => {
                if inbound_tx.send((xid, msg)).await.is_err() {
                    return;
                }
            }
            Err(e) => log::warn!("dropping message from peer: {}", e),
        }
        buf.clear();
        if empty_tx.send(buf).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow0x01::message::{add_flow, Message};
    use crate::openflow0x01::{Action, Pattern, PseudoPort};
    use std::time::Duration;
    use tokio::io::duplex;

    fn flow_mod_bytes(xid: u32) -> Vec<u8> {
        let fm = add_flow(
            9,
            Pattern::match_all(),
            vec![Action::Output(PseudoPort::Flood)],
        );
        Message::marshal(xid, Message::FlowMod(fm))
    }

    #[tokio::test]
    async fn delivers_inbound_messages() {
        let (near, mut far) = duplex(4096);
        let mut stream = MessageStream::new(near);
        far.write_all(&Message::marshal(3, Message::Hello))
            .await
            .unwrap();
        assert_eq!(stream.inbound.recv().await, Some((3, Message::Hello)));
    }

    #[tokio::test]
    async fn writes_outbound_messages() {
        let (near, mut far) = duplex(4096);
        let stream = MessageStream::new(near);
        stream
            .outbound
            .send((7, Message::BarrierRequest))
            .await
            .unwrap();
        let mut buf = [0u8; 8];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, &[1, 18, 0, 8, 0, 0, 0, 7]);
    }

    #[tokio::test]
    async fn reassembles_messages_split_across_reads() {
        let (near, mut far) = duplex(4096);
        let mut stream = MessageStream::new(near);
        let bytes = flow_mod_bytes(11);
        for chunk in bytes.chunks(3) {
            far.write_all(chunk).await.unwrap();
            far.flush().await.unwrap();
            tokio::task::yield_now().await;
        }
        let (xid, msg) = stream.inbound.recv().await.unwrap();
        assert_eq!(xid, 11);
        assert!(matches!(msg, Message::FlowMod(_)));
    }

    #[tokio::test]
    async fn separates_messages_arriving_in_one_read() {
        let (near, mut far) = duplex(4096);
        let mut stream = MessageStream::new(near);
        let mut bytes = Message::marshal(1, Message::EchoRequest(vec![0xaa; 3]));
        bytes.extend(flow_mod_bytes(2));
        bytes.extend(Message::marshal(3, Message::BarrierReply));
        far.write_all(&bytes).await.unwrap();
        assert_eq!(
            stream.inbound.recv().await,
            Some((1, Message::EchoRequest(vec![0xaa; 3])))
        );
        let (xid, _) = stream.inbound.recv().await.unwrap();
        assert_eq!(xid, 2);
        assert_eq!(stream.inbound.recv().await, Some((3, Message::BarrierReply)));
    }

    #[tokio::test]
    async fn undecodable_message_is_dropped_not_fatal() {
        let (near, mut far) = duplex(4096);
        let mut stream = MessageStream::new(near);
        // Valid frame with an unknown type code, then a well-formed message.
        far.write_all(&[1, 99, 0, 8, 0, 0, 0, 5]).await.unwrap();
        far.write_all(&Message::marshal(6, Message::Hello))
            .await
            .unwrap();
        assert_eq!(stream.inbound.recv().await, Some((6, Message::Hello)));
    }

    #[tokio::test]
    async fn shutdown_closes_the_stream() {
        let (near, _far) = duplex(4096);
        let mut stream = MessageStream::new(near);
        stream.shutdown();
        stream.shutdown();
        assert_eq!(stream.inbound.recv().await, None);
    }

    #[tokio::test]
    async fn peer_close_closes_the_stream() {
        let (near, far) = duplex(4096);
        let mut stream = MessageStream::new(near);
        drop(far);
        assert_eq!(stream.inbound.recv().await, None);
    }

    #[tokio::test]
    async fn write_failure_surfaces_on_the_error_channel() {
        let (near, far) = duplex(4096);
        let mut stream = MessageStream::new(near);
        drop(far);
        // The read side notices the close too, so keep trying until the
        // write task reports.
        stream
            .outbound
            .send((0, Message::EchoRequest(vec![0; 32])))
            .await
            .unwrap();
        let err = tokio::time::timeout(Duration::from_secs(1), stream.errors.recv())
            .await
            .unwrap();
        assert!(matches!(err, Some(StreamError::Write(_))));
    }

    #[tokio::test]
    async fn small_pool_stalls_reading_without_losing_messages() {
        let (near, mut far) = duplex(65536);
        let mut stream = MessageStream::with_pool(near, BufferPool::new(2));
        for xid in 0..20 {
            far.write_all(&Message::marshal(xid, Message::Hello))
                .await
                .unwrap();
        }
        for xid in 0..20 {
            let got = tokio::time::timeout(Duration::from_secs(1), stream.inbound.recv())
                .await
                .unwrap();
            assert_eq!(got, Some((xid, Message::Hello)));
        }
    }
}
