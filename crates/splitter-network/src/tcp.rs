//! A plain TCP transport with newline-delimited frames.
//!
//! The local identity is the address the listener is reachable under. An
//! outbound link starts by sending one line holding the connector's own
//! identity, so the accepting side knows who is on the other end. Every
//! later line is one frame.
//!
//! A line that is not UTF-8 or is longer than the frame limit is skipped and
//! the link stays up.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::error::TransportError;
use crate::events::TransportEvent;
use crate::peer::{LinkId, PeerId};
use crate::transport::{EventSender, Transport};

/// Longest accepted frame, in bytes, excluding the newline.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

struct IdentityEntry {
    events: EventSender,
    listener: AbortHandle,
}

struct LinkEntry {
    owner: PeerId,
    writer: mpsc::UnboundedSender<String>,
    task: Option<AbortHandle>,
}

#[derive(Default)]
struct Shared {
    identities: DashMap<PeerId, IdentityEntry>,
    links: DashMap<LinkId, LinkEntry>,
    next_link: AtomicU64,
}

impl Shared {
    fn allocate_link(&self) -> LinkId {
        LinkId(self.next_link.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn register_link(&self, link: LinkId, owner: PeerId) -> mpsc::UnboundedReceiver<String> {
        let (writer, rx) = mpsc::unbounded_channel();
        self.links.insert(
            link,
            LinkEntry {
                owner,
                writer,
                task: None,
            },
        );
        rx
    }

    fn attach_task(&self, link: LinkId, task: AbortHandle) {
        if let Some(mut entry) = self.links.get_mut(&link) {
            entry.task = Some(task);
        }
    }

    fn drop_link(&self, link: LinkId) {
        if let Some((_, entry)) = self.links.remove(&link) {
            if let Some(task) = entry.task {
                task.abort();
            }
        }
    }
}

/// TCP transport listening on a configured address.
#[derive(Clone)]
pub struct TcpTransport {
    listen_addr: String,
    advertise_addr: Option<String>,
    max_frame_len: usize,
    shared: Arc<Shared>,
}

impl TcpTransport {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            advertise_addr: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Publish `addr` as the identity instead of the bound address, for
    /// listeners bound to a wildcard address.
    pub fn with_advertise_addr(mut self, addr: impl Into<String>) -> Self {
        self.advertise_addr = Some(addr.into());
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    pub fn link_count(&self) -> usize {
        self.shared.links.len()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open_identity(&self, events: EventSender) -> Result<PeerId, TransportError> {
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .map_err(|e| TransportError::Network(format!("bind {}: {}", self.listen_addr, e)))?;
        let bound = listener
            .local_addr()
            .map_err(|e| TransportError::Internal(e.to_string()))?;
        let identity = PeerId::new(
            self.advertise_addr
                .clone()
                .unwrap_or_else(|| bound.to_string()),
        );

        let task = tokio::spawn(accept_loop(
            listener,
            identity.clone(),
            events.clone(),
            self.max_frame_len,
            self.shared.clone(),
        ));
        self.shared.identities.insert(
            identity.clone(),
            IdentityEntry {
                events,
                listener: task.abort_handle(),
            },
        );

        tracing::info!(%identity, %bound, "tcp identity listening");
        Ok(identity)
    }

    async fn destroy_identity(&self, identity: &PeerId) {
        if let Some((_, entry)) = self.shared.identities.remove(identity) {
            entry.listener.abort();
        }
        let owned: Vec<LinkId> = self
            .shared
            .links
            .iter()
            .filter(|e| &e.value().owner == identity)
            .map(|e| *e.key())
            .collect();
        for link in owned {
            self.shared.drop_link(link);
        }
        tracing::info!(%identity, "tcp identity destroyed");
    }

    async fn connect(&self, local: &PeerId, remote: &PeerId) -> Result<LinkId, TransportError> {
        let events = self
            .shared
            .identities
            .get(local)
            .map(|e| e.events.clone())
            .ok_or_else(|| TransportError::Disconnected(format!("identity {} is offline", local)))?;

        let link = self.shared.allocate_link();
        let outgoing = self.shared.register_link(link, local.clone());
        let task = tokio::spawn(dial(
            link,
            local.clone(),
            remote.clone(),
            outgoing,
            events,
            self.max_frame_len,
            self.shared.clone(),
        ));
        self.shared.attach_task(link, task.abort_handle());
        Ok(link)
    }

    async fn send(&self, link: LinkId, frame: String) -> Result<(), TransportError> {
        let entry = self
            .shared
            .links
            .get(&link)
            .ok_or_else(|| TransportError::Disconnected(link.to_string()))?;
        entry
            .writer
            .send(frame)
            .map_err(|_| TransportError::Disconnected(link.to_string()))
    }

    async fn close(&self, link: LinkId) {
        self.shared.drop_link(link);
    }
}

async fn accept_loop(
    listener: TcpListener,
    identity: PeerId,
    events: EventSender,
    max_frame_len: usize,
    shared: Arc<Shared>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tracing::debug!(%identity, %addr, "tcp connection accepted");
                let link = shared.allocate_link();
                let outgoing = shared.register_link(link, identity.clone());
                let task = tokio::spawn(serve_inbound(
                    link,
                    FrameReader::new(stream, max_frame_len),
                    outgoing,
                    events.clone(),
                    shared.clone(),
                ));
                shared.attach_task(link, task.abort_handle());
            }
            Err(e) => {
                tracing::error!(%identity, error = %e, "tcp accept failed");
                let _ = events.send(TransportEvent::IdentityError {
                    identity: identity.clone(),
                    error: TransportError::Network(e.to_string()),
                });
                break;
            }
        }
    }
}

async fn serve_inbound(
    link: LinkId,
    (mut frames, write): (FrameReader, OwnedWriteHalf),
    outgoing: mpsc::UnboundedReceiver<String>,
    events: EventSender,
    shared: Arc<Shared>,
) {
    let remote = match frames.next_frame().await {
        Ok(ReadFrame::Frame(line)) if !line.trim().is_empty() => PeerId::new(line.trim()),
        _ => {
            tracing::debug!(%link, "inbound link closed before announcing identity");
            shared.links.remove(&link);
            return;
        }
    };

    let _ = events.send(TransportEvent::Incoming {
        link,
        remote: remote.clone(),
    });
    run_link(link, frames, write, outgoing, events, shared).await;
}

async fn dial(
    link: LinkId,
    local: PeerId,
    remote: PeerId,
    outgoing: mpsc::UnboundedReceiver<String>,
    events: EventSender,
    max_frame_len: usize,
    shared: Arc<Shared>,
) {
    let stream = match TcpStream::connect(remote.as_str()).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(%remote, error = %e, "tcp dial failed");
            shared.links.remove(&link);
            let _ = events.send(TransportEvent::LinkError {
                link,
                error: TransportError::PeerUnavailable(format!("{}: {}", remote, e)),
            });
            return;
        }
    };

    let (frames, mut write) = FrameReader::new(stream, max_frame_len);
    let hello = format!("{}\n", local);
    if let Err(e) = write.write_all(hello.as_bytes()).await {
        shared.links.remove(&link);
        let _ = events.send(TransportEvent::LinkError {
            link,
            error: TransportError::Disconnected(e.to_string()),
        });
        return;
    }

    let _ = events.send(TransportEvent::Opened { link });
    run_link(link, frames, write, outgoing, events, shared).await;
}

/// Pump frames both ways until either side goes away.
async fn run_link(
    link: LinkId,
    mut frames: FrameReader,
    mut write: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: EventSender,
    shared: Arc<Shared>,
) {
    let writer = tokio::spawn(async move {
        while let Some(frame) = outgoing.recv().await {
            let mut bytes = frame.into_bytes();
            bytes.push(b'\n');
            if let Err(e) = write.write_all(&bytes).await {
                tracing::debug!(%link, error = %e, "tcp write failed");
                break;
            }
        }
        let _ = write.shutdown().await;
    });

    let ending = loop {
        match frames.next_frame().await {
            Ok(ReadFrame::Frame(data)) => {
                if events.send(TransportEvent::Frame { link, data }).is_err() {
                    break None;
                }
            }
            Ok(ReadFrame::NotUtf8) => {
                tracing::warn!(%link, "dropping frame that is not valid UTF-8");
            }
            Ok(ReadFrame::TooLong) => {
                tracing::warn!(%link, max = frames.max_len, "dropping oversized frame");
            }
            Ok(ReadFrame::Eof) => break Some(TransportEvent::Closed { link }),
            Err(e) => {
                break Some(TransportEvent::LinkError {
                    link,
                    error: TransportError::Disconnected(e.to_string()),
                })
            }
        }
    };

    writer.abort();
    shared.links.remove(&link);
    if let Some(event) = ending {
        let _ = events.send(event);
    }
}

/// One read from a link.
#[derive(Debug, PartialEq, Eq)]
enum ReadFrame {
    Frame(String),
    NotUtf8,
    TooLong,
    Eof,
}

/// Splits a byte stream into newline-terminated frames of bounded length.
struct FrameReader {
    reader: BufReader<OwnedReadHalf>,
    max_len: usize,
    buf: Vec<u8>,
}

impl FrameReader {
    fn new(stream: TcpStream, max_len: usize) -> (Self, OwnedWriteHalf) {
        let (read, write) = stream.into_split();
        let reader = Self {
            reader: BufReader::new(read),
            max_len,
            buf: Vec::new(),
        };
        (reader, write)
    }

    /// Read the next line. At most `max_len + 1` bytes are buffered; the
    /// rest of a longer line is discarded as it arrives.
    async fn next_frame(&mut self) -> std::io::Result<ReadFrame> {
        self.buf.clear();
        let limit = u64::try_from(self.max_len).unwrap_or(u64::MAX).saturating_add(1);
        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;
        if read == 0 {
            return Ok(ReadFrame::Eof);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        } else if self.buf.len() > self.max_len {
            self.skip_line().await?;
            return Ok(ReadFrame::TooLong);
        }

        match std::str::from_utf8(&self.buf) {
            Ok(line) => Ok(ReadFrame::Frame(line.to_owned())),
            Err(_) => Ok(ReadFrame::NotUtf8),
        }
    }

    /// Consume input up to and including the next newline.
    async fn skip_line(&mut self) -> std::io::Result<()> {
        loop {
            let (consumed, done) = {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    return Ok(());
                }
                match available.iter().position(|b| *b == b'\n') {
                    Some(end) => (end + 1, true),
                    None => (available.len(), false),
                }
            };
            self.reader.consume(consumed);
            if done {
                return Ok(());
            }
        }
    }
}
