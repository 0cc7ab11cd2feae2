//! Per-operation progress state and its typed update surface.

use serde::Serialize;
use std::time::Duration;

/// Snapshot of an in-flight (or just-finished) production.
///
/// Equality is field-wise; an [`Operation`] only publishes an event when
/// a mutation actually changes this value.
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Progress {
    pub ready: bool,
    pub downloading: bool,
    pub download_progress: f64,
    pub probing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_duration: Option<Duration>,
    pub converting: bool,
    pub convert_pos: Duration,
    pub storing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_progress: Option<f64>,
    pub queued: bool,
}

impl Progress {
    pub fn ready() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// Serializes this snapshot to JSON, matching the wire contract the
    /// websocket endpoint writes. Fails rather than silently emitting
    /// `null` for a `NaN`/infinite float field (`serde_json` does not
    /// reject these on its own).
    pub fn to_json(&self) -> serde_json::Result<String> {
        if !self.download_progress.is_finite()
            || self.store_progress.is_some_and(|p| !p.is_finite())
        {
            return Err(serde::ser::Error::custom("progress field is not finite"));
        }
        serde_json::to_string(self)
    }
}

/// A zero-arg wakeup published whenever a subscribed operation's progress
/// changes. The bus carries no payload — see [`crate::bus::EventBus`].
pub trait Notifier: Send + Sync {
    fn notify(&self);
}

/// Ephemeral record for one in-flight production.
///
/// Exposes a narrow set of typed setters rather than a generic mutator,
/// so the diff-then-publish rule lives in exactly one place ([`Self::apply`])
/// and `convert_pos`'s monotonicity invariant can't be bypassed by a new
/// setter forgetting to enforce it.
pub struct Operation {
    state: tokio::sync::Mutex<Progress>,
    notifier: Box<dyn Notifier>,
}

impl Operation {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self {
            state: tokio::sync::Mutex::new(Progress::default()),
            notifier,
        }
    }

    pub async fn snapshot(&self) -> Progress {
        self.state.lock().await.clone()
    }

    async fn apply(&self, mutate: impl FnOnce(&mut Progress)) {
        let mut guard = self.state.lock().await;
        let before = guard.clone();
        mutate(&mut guard);
        if *guard != before {
            self.notifier.notify();
        }
    }

    pub async fn begin_download(&self) {
        self.apply(|p| p.downloading = true).await;
    }

    pub async fn set_download_progress(&self, fraction: f64) {
        self.apply(|p| p.download_progress = fraction).await;
    }

    pub async fn end_download(&self) {
        self.apply(|p| p.downloading = false).await;
    }

    pub async fn begin_probe(&self) {
        self.apply(|p| p.probing = true).await;
    }

    pub async fn end_probe(&self, duration: Option<Duration>) {
        self.apply(|p| {
            if let Some(d) = duration {
                p.input_duration = Some(d);
            }
            p.probing = false;
        })
        .await;
    }

    pub async fn begin_convert(&self) {
        self.apply(|p| p.converting = true).await;
    }

    /// Updates `convert_pos`, clamped to monotonic non-decreasing — a
    /// regressive value from the encoder's telemetry is silently dropped
    /// rather than treated as an error, since the callback stream is
    /// untrusted input and a single out-of-order sample must not corrupt
    /// the invariant observers rely on.
    pub async fn set_convert_pos(&self, pos: Duration) {
        self.apply(|p| {
            if pos >= p.convert_pos {
                p.convert_pos = pos;
            }
        })
        .await;
    }

    pub async fn end_convert(&self) {
        self.apply(|p| p.converting = false).await;
    }

    pub async fn begin_store(&self) {
        self.apply(|p| p.storing = true).await;
    }

    pub async fn set_store_progress(&self, fraction: f64) {
        self.apply(|p| p.store_progress = Some(fraction)).await;
    }

    pub async fn end_store(&self) {
        self.apply(|p| p.storing = false).await;
    }

    pub async fn set_queued(&self, queued: bool) {
        self.apply(|p| p.queued = queued).await;
    }

    /// Fires an unconditional wakeup without changing any field — used
    /// for the encoder's bare `progress=continue`/`progress=end`
    /// sentinel, which signals "a frame happened" with no new data.
    pub fn nudge(&self) {
        self.notifier.notify();
    }
}
