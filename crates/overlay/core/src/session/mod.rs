//! Duplex message loop over one stream.
//!
//! A session is a read task and a write task over the two halves of a stream.
//! The halves never signal each other: each one ends on its own I/O error, and
//! the session is gone from the [`SessionRegistry`] once both have ended.

mod registry;

use std::sync::Arc;

use futures::StreamExt;
use libp2p::PeerId;
use meshlite_tasks::TaskExecutor;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::StreamIoError;
pub use registry::{
    SessionId, SessionInfo, SessionKey, SessionRegistry, SessionSource, SessionState,
};
use registry::{Half, HalfGuard};

/// Longest line a session reads before giving up on the read side.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Starts sessions and registers them.
#[derive(Debug, Clone)]
pub struct Sessions {
    registry: SessionRegistry,
    config: SessionConfig,
    local_addr: Arc<str>,
    executor: TaskExecutor,
}

impl Sessions {
    /// `local_addr` is the address this node announces in its session payload.
    pub fn new(
        registry: SessionRegistry,
        config: SessionConfig,
        local_addr: impl Into<Arc<str>>,
        executor: TaskExecutor,
    ) -> Self {
        Self {
            registry,
            config,
            local_addr: local_addr.into(),
            executor,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Executor the session halves are spawned on.
    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    /// Split `stream` and spawn both halves.
    pub fn start<S>(&self, peer: PeerId, stream: S, source: SessionSource) -> SessionKey
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let key = self.registry.register(peer, source);
        let (reader, writer) = tokio::io::split(stream);

        let read_guard = HalfGuard::new(self.registry.clone(), key, Half::Read);
        let write_guard = HalfGuard::new(self.registry.clone(), key, Half::Write);
        let payload = format!("{source}: hello from {}\n", self.local_addr);

        let read = self
            .executor
            .spawn(read_loop(reader, key, source, read_guard));
        let write = self.executor.spawn(write_loop(
            writer,
            key,
            payload,
            self.config.clone(),
            write_guard,
        ));
        self.registry
            .attach(key, vec![read.abort_handle(), write.abort_handle()]);

        info!(%peer, session = %key.id, %source, "session started");
        key
    }
}

async fn read_loop<R>(reader: R, key: SessionKey, source: SessionSource, _guard: HalfGuard)
where
    R: AsyncRead + Unpin,
{
    let peer = key.peer;
    let codec =
        AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), MAX_LINE_LENGTH);
    let mut lines = FramedRead::new(reader, codec);
    loop {
        match lines.next().await {
            None => {
                debug!(%peer, session = %key.id, "stream closed by remote, read side done");
                return;
            }
            Some(Ok(line)) => {
                let message = String::from_utf8_lossy(&line);
                let message = message.trim_end_matches('\r');
                if message.is_empty() {
                    continue;
                }
                info!(%peer, session = %key.id, %source, message, "received");
            }
            Some(Err(e)) => {
                let error = match e {
                    AnyDelimiterCodecError::MaxChunkLengthExceeded => {
                        StreamIoError::LineTooLong(MAX_LINE_LENGTH)
                    }
                    AnyDelimiterCodecError::Io(e) => StreamIoError::Read(e),
                };
                warn!(%peer, session = %key.id, %error, "read side done");
                return;
            }
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    key: SessionKey,
    payload: String,
    config: SessionConfig,
    _guard: HalfGuard,
) where
    W: AsyncWrite + Unpin,
{
    let peer = key.peer;
    loop {
        if let Err(e) = writer.write_all(payload.as_bytes()).await {
            warn!(%peer, session = %key.id, error = %StreamIoError::Write(e), "write side done");
            return;
        }
        if let Err(e) = writer.flush().await {
            warn!(%peer, session = %key.id, error = %StreamIoError::Flush(e), "write side done");
            return;
        }
        tokio::time::sleep(config.write_interval).await;
    }
}
