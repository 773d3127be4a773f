//! Event channel adapter: one realtime connection per run.
//!
//! [`EventChannel::open`] returns an ordered stream of [`ChannelEvent`]s for a
//! run. Opening always closes the previous connection first, so an adapter
//! never holds two live connections. The adapter does not retry; reconnect
//! policy belongs to the caller.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use qarun_core::{CollaboratorEndpoint, InboundMessage, RunId};

/// Buffered events per connection before the reader applies backpressure.
const DEFAULT_CAPACITY: usize = 256;

/// An event delivered by the channel, tagged with its arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    /// Arrival order within one connection, starting at 0.
    pub seq: u64,
    pub kind: ChannelEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEventKind {
    /// The connection is established.
    Connected,
    /// A parsed service message.
    Message(InboundMessage),
    /// The connection ended. Says nothing about the run outcome.
    Closed,
    /// Transport error. Always followed by `Closed`.
    Error(String),
}

/// A realtime channel keyed by run id.
pub trait EventChannel: Send + 'static {
    /// Close any existing connection, then connect for `run_id`.
    fn open(&mut self, run_id: &RunId) -> mpsc::Receiver<ChannelEvent>;

    /// Close the current connection. Idempotent; safe when never opened.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

struct ActiveConnection {
    run_id: RunId,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

/// WebSocket implementation of [`EventChannel`].
pub struct WsChannel {
    endpoint: CollaboratorEndpoint,
    capacity: usize,
    active: Option<ActiveConnection>,
}

impl WsChannel {
    pub fn new(endpoint: CollaboratorEndpoint) -> Self {
        Self {
            endpoint,
            capacity: DEFAULT_CAPACITY,
            active: None,
        }
    }

    /// Run id of the currently open connection, if any.
    pub fn current_run(&self) -> Option<&RunId> {
        self.active.as_ref().map(|a| &a.run_id)
    }
}

impl EventChannel for WsChannel {
    fn open(&mut self, run_id: &RunId) -> mpsc::Receiver<ChannelEvent> {
        self.close();

        let url = self.endpoint.channel_url(run_id);
        let (tx, rx) = mpsc::channel(self.capacity);
        let cancel = CancellationToken::new();

        info!(run_id = %run_id, url = %url, "Opening event channel");
        let task = tokio::spawn(run_connection(url, tx, cancel.clone()));

        self.active = Some(ActiveConnection {
            run_id: run_id.clone(),
            cancel,
            _task: task,
        });
        rx
    }

    fn close(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(run_id = %active.run_id, "Closing event channel");
            active.cancel.cancel();
        }
    }

    fn is_open(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Numbers events and stops forwarding once the receiver is gone.
struct Emitter {
    tx: mpsc::Sender<ChannelEvent>,
    seq: u64,
}

impl Emitter {
    async fn emit(&mut self, kind: ChannelEventKind) -> bool {
        let event = ChannelEvent {
            seq: self.seq,
            kind,
        };
        self.seq += 1;
        self.tx.send(event).await.is_ok()
    }

    /// Parse a text frame; malformed payloads go to the diagnostic log only.
    async fn emit_text(&mut self, text: &str) -> bool {
        match InboundMessage::parse(text) {
            Ok(message) => self.emit(ChannelEventKind::Message(message)).await,
            Err(e) => {
                warn!(target: "qarun::diagnostics", error = %e, "Dropping malformed channel payload");
                true
            }
        }
    }
}

async fn run_connection(url: String, tx: mpsc::Sender<ChannelEvent>, cancel: CancellationToken) {
    let mut emitter = Emitter { tx, seq: 0 };

    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        result = connect_async(url.as_str()) => result,
    };

    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(url = %url, error = %e, "Event channel connect failed");
            if emitter.emit(ChannelEventKind::Error(e.to_string())).await {
                emitter.emit(ChannelEventKind::Closed).await;
            }
            return;
        }
    };

    if !emitter.emit(ChannelEventKind::Connected).await {
        return;
    }

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            // Closing is silent: the caller has already dropped interest.
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                debug!(url = %url, "Event channel closed by client");
                break;
            }
            frame = read.next() => {
                let keep_going = match frame {
                    Some(Ok(Message::Text(text))) => emitter.emit_text(&text).await,
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => emitter.emit_text(text).await,
                        Err(e) => {
                            warn!(target: "qarun::diagnostics", error = %e, "Dropping non-UTF-8 channel frame");
                            true
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!(url = %url, frame = ?frame, "Server closed event channel");
                        emitter.emit(ChannelEventKind::Closed).await;
                        false
                    }
                    Some(Ok(_)) => true,
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "Event channel error");
                        if emitter.emit(ChannelEventKind::Error(e.to_string())).await {
                            emitter.emit(ChannelEventKind::Closed).await;
                        }
                        false
                    }
                    None => {
                        emitter.emit(ChannelEventKind::Closed).await;
                        false
                    }
                };
                if !keep_going {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn next(rx: &mut mpsc::Receiver<ChannelEvent>) -> Option<ChannelEvent> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for channel event")
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            for frame in [
                r#"{"type":"info","message":"hello"}"#,
                "this is not json",
                r#"{"type":"artifact","step":"s1","url":"/artifacts/r1/1.png"}"#,
                r#"{"type":"run_end","ok":true}"#,
            ] {
                ws.send(Message::Text(frame.into())).await.unwrap();
            }
            ws.close(None).await.unwrap();
        });

        let mut channel = WsChannel::new(CollaboratorEndpoint::new(false, "127.0.0.1", port));
        let mut rx = channel.open(&RunId::new("r1"));

        let mut events = Vec::new();
        while let Some(event) = next(&mut rx).await {
            let done = event.kind == ChannelEventKind::Closed;
            events.push(event);
            if done {
                break;
            }
        }

        let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(events[0].kind, ChannelEventKind::Connected);
        let kinds: Vec<&str> = events[1..4]
            .iter()
            .map(|e| match &e.kind {
                ChannelEventKind::Message(m) => m.message.kind(),
                other => panic!("expected message, got {:?}", other),
            })
            .collect();
        assert_eq!(kinds, vec!["info", "artifact", "run_end"]);
        assert_eq!(events[4].kind, ChannelEventKind::Closed);
    }

    #[tokio::test]
    async fn test_connect_failure_reports_error_then_closed() {
        // Bind and drop to get a port with nobody listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut channel = WsChannel::new(CollaboratorEndpoint::new(false, "127.0.0.1", port));
        let mut rx = channel.open(&RunId::new("r1"));

        let first = next(&mut rx).await.unwrap();
        assert!(matches!(first.kind, ChannelEventKind::Error(_)));
        let second = next(&mut rx).await.unwrap();
        assert_eq!(second.kind, ChannelEventKind::Closed);
    }

    #[tokio::test]
    async fn test_reopen_closes_previous_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accept connections and keep them open until the client leaves.
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut ws = accept_async(stream).await.unwrap();
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        let mut channel = WsChannel::new(CollaboratorEndpoint::new(false, "127.0.0.1", port));
        let mut first = channel.open(&RunId::new("r1"));
        assert_eq!(next(&mut first).await.unwrap().kind, ChannelEventKind::Connected);

        let mut second = channel.open(&RunId::new("r2"));
        assert_eq!(channel.current_run(), Some(&RunId::new("r2")));

        // The first reader exits without emitting anything further.
        assert_eq!(next(&mut first).await, None);
        assert_eq!(next(&mut second).await.unwrap().kind, ChannelEventKind::Connected);

        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert_eq!(next(&mut second).await, None);
    }
}
