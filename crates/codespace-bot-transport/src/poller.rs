//! Long-poll loop.
//!
//! Pulls batches of events from an [`EventSource`], hands each to an
//! [`EventHandler`] and delivers the resulting actions through an
//! [`ActionSink`]. Events of different chats run concurrently; events of
//! the same chat run in arrival order. Any polling failure is logged and
//! the loop restarts after a fixed backoff, forever.

use std::{collections::HashMap, future::Future, time::Duration};

use async_trait::async_trait;
use codespace_bot_core::{ChatId, EventHandler, InboundEvent, OutboundAction};
use thiserror::Error;

/// Delay before polling restarts after a failure.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(15);

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Polling failed: {0}")]
    Poll(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Source of inbound events.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next batch. An empty batch is a normal long-poll
    /// timeout.
    async fn next_batch(&mut self) -> Result<Vec<InboundEvent>, TransportError>;
}

/// Destination of outbound actions.
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Deliver one action produced for `origin`.
    async fn deliver(&self, origin: &InboundEvent, action: OutboundAction)
    -> Result<(), TransportError>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn acknowledge(&self, _origin: &InboundEvent) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Polling loop with fixed-backoff restart.
#[derive(Debug, Clone)]
pub struct Poller {
    backoff: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF)
    }
}

impl Poller {
    #[must_use]
    pub const fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    #[must_use]
    pub const fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Poll forever.
    pub async fn run<Src, Snk, H>(&self, source: Src, sink: &Snk, handler: &H)
    where
        Src: EventSource,
        Snk: ActionSink,
        H: EventHandler,
    {
        self.run_until(source, sink, handler, std::future::pending())
            .await;
    }

    /// Poll until `shutdown` resolves.
    pub async fn run_until<Src, Snk, H, F>(
        &self,
        mut source: Src,
        sink: &Snk,
        handler: &H,
        shutdown: F,
    ) where
        Src: EventSource,
        Snk: ActionSink,
        H: EventHandler,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!("Bot polling started");

        loop {
            let batch = tokio::select! {
                () = &mut shutdown => break,
                batch = source.next_batch() => batch,
            };

            match batch {
                Ok(events) => {
                    if !events.is_empty() {
                        tracing::debug!(count = events.len(), "Received updates");
                        dispatch(events, sink, handler).await;
                    }
                }
                Err(e) => {
                    tracing::error!("Bot polling error: {e}");
                    tokio::select! {
                        () = &mut shutdown => break,
                        () = tokio::time::sleep(self.backoff) => {}
                    }
                    tracing::info!("Restarting bot polling");
                }
            }
        }

        tracing::info!("Bot polling stopped");
    }
}

/// Split a batch into per-chat groups, keeping arrival order inside each
/// group and ordering groups by first appearance.
#[must_use]
pub fn group_by_chat(events: Vec<InboundEvent>) -> Vec<Vec<InboundEvent>> {
    let mut groups: Vec<Vec<InboundEvent>> = Vec::new();
    let mut slots: HashMap<ChatId, usize> = HashMap::new();

    for event in events {
        if let Some(&slot) = slots.get(&event.chat_id) {
            groups[slot].push(event);
        } else {
            slots.insert(event.chat_id, groups.len());
            groups.push(vec![event]);
        }
    }
    groups
}

async fn dispatch<Snk, H>(events: Vec<InboundEvent>, sink: &Snk, handler: &H)
where
    Snk: ActionSink,
    H: EventHandler,
{
    let chats = group_by_chat(events).into_iter().map(|group| async move {
        for event in group {
            if let Err(e) = sink.acknowledge(&event).await {
                tracing::warn!(chat_id = %event.chat_id, "Failed to acknowledge button: {e}");
            }

            let actions = handler.handle(event.clone()).await;
            for action in actions {
                if let Err(e) = sink.deliver(&event, action).await {
                    tracing::warn!(chat_id = %event.chat_id, "Failed to deliver action: {e}");
                }
            }
        }
    });

    futures::future::join_all(chats).await;
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Instant,
    };

    use codespace_bot_core::{EventKind, Sender};
    use tokio::sync::Notify;

    use super::*;

    /// Source that replays a script, then signals and blocks.
    struct ScriptedSource {
        script: VecDeque<Result<Vec<InboundEvent>, TransportError>>,
        calls: Arc<AtomicUsize>,
        drained: Arc<Notify>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<InboundEvent>, TransportError>>) -> Self {
            Self {
                script: script.into(),
                calls: Arc::new(AtomicUsize::new(0)),
                drained: Arc::new(Notify::new()),
            }
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn next_batch(&mut self) -> Result<Vec<InboundEvent>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(next) = self.script.pop_front() {
                return next;
            }
            self.drained.notify_one();
            std::future::pending().await
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<(ChatId, String)>>,
        acks: AtomicUsize,
    }

    impl RecordingSink {
        fn delivered(&self) -> Vec<(ChatId, String)> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionSink for RecordingSink {
        async fn deliver(
            &self,
            origin: &InboundEvent,
            action: OutboundAction,
        ) -> Result<(), TransportError> {
            self.delivered
                .lock()
                .unwrap()
                .push((origin.chat_id, action.text().to_string()));
            Ok(())
        }

        async fn acknowledge(&self, _origin: &InboundEvent) -> Result<(), TransportError> {
            self.acks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Echoes text back; "slow" messages take longer to handle.
    struct EchoHandler;

    #[async_trait]
    impl EventHandler for EchoHandler {
        async fn handle(&self, event: InboundEvent) -> Vec<OutboundAction> {
            let EventKind::Text { text } = event.kind else {
                return Vec::new();
            };
            if text.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            vec![OutboundAction::send(text)]
        }
    }

    fn text(chat: i64, text: &str) -> InboundEvent {
        InboundEvent::text(ChatId(chat), Sender::default(), text)
    }

    async fn run_script(
        poller: &Poller,
        script: Vec<Result<Vec<InboundEvent>, TransportError>>,
        sink: &RecordingSink,
    ) -> usize {
        let source = ScriptedSource::new(script);
        let calls = Arc::clone(&source.calls);
        let drained = Arc::clone(&source.drained);

        poller
            .run_until(source, sink, &EchoHandler, async move {
                drained.notified().await;
            })
            .await;
        calls.load(Ordering::SeqCst)
    }

    #[test]
    fn test_group_by_chat_keeps_order() {
        let groups = group_by_chat(vec![text(1, "a"), text(2, "x"), text(1, "b"), text(3, "y")]);

        let chats: Vec<_> = groups.iter().map(|g| g[0].chat_id.0).collect();
        assert_eq!(chats, vec![1, 2, 3]);
        assert_eq!(groups[0], vec![text(1, "a"), text(1, "b")]);
    }

    #[tokio::test]
    async fn test_restarts_after_failure() {
        let poller = Poller::new(Duration::from_millis(30));
        let sink = RecordingSink::default();
        let started = Instant::now();

        let calls = run_script(
            &poller,
            vec![
                Err(TransportError::Poll("connection reset".into())),
                Ok(vec![text(1, "hello")]),
            ],
            &sink,
        )
        .await;

        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(calls, 3);
        assert_eq!(sink.delivered(), vec![(ChatId(1), "hello".to_string())]);
    }

    #[tokio::test]
    async fn test_same_chat_is_sequential_other_chats_concurrent() {
        let poller = Poller::new(Duration::from_millis(10));
        let sink = RecordingSink::default();

        run_script(
            &poller,
            vec![Ok(vec![text(1, "slow-a"), text(2, "x"), text(1, "b")])],
            &sink,
        )
        .await;

        let order: Vec<_> = sink.delivered().into_iter().map(|(_, t)| t).collect();
        let pos = |t: &str| order.iter().position(|o| o == t).unwrap();
        assert_eq!(order.len(), 3);
        assert!(pos("slow-a") < pos("b"));
        assert!(pos("x") < pos("slow-a"));
    }

    #[tokio::test]
    async fn test_every_event_is_acknowledged() {
        let poller = Poller::new(Duration::from_millis(10));
        let sink = RecordingSink::default();

        run_script(&poller, vec![Ok(vec![]), Ok(vec![text(1, "a"), text(2, "b")])], &sink).await;

        assert_eq!(sink.acks.load(Ordering::SeqCst), 2);
        assert_eq!(sink.delivered().len(), 2);
    }
}
