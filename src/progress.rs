//! Per-job progress tracking and its push-based delivery stream.
//!
//! The registry is a process-wide table keyed by task id. The orchestrator is
//! the sole writer; any number of stream consumers read snapshots. Delivery
//! is a timed polling loop with value-equality suppression: a snapshot is
//! emitted only when the record actually changed since the last emission.
//! A condition-variable handoff would be more efficient, but the polling loop
//! reproduces the exact observable contract with far less machinery.
//!
//! Records reaching [`Stage::Complete`] are retained for a grace window so a
//! trailing read still sees the final state, then removed by a background
//! reaper task. Failures are never written into a record — an abandoned
//! stream ends with [`ProgressEvent::Timeout`] after the inactivity budget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default retention after `complete` before the reaper removes a record.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(60);
/// Default change-detection quantum for [`ProgressRegistry::watch`].
pub const DEFAULT_POLL: Duration = Duration::from_millis(500);
/// Default inactivity budget before a stream gives up with a timeout marker.
pub const DEFAULT_IDLE: Duration = Duration::from_secs(300);

/// Job stages in execution order. Transitions are monotonic; the registry
/// drops writes that would move a record backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Pending,
    Upload,
    Preprocessing,
    Inference,
    Postprocessing,
    Complete,
}

/// One job's observable progress state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub stage: Stage,
    pub current: u32,
    pub total: u32,
    /// Derived: `floor(current / total × 100)`, 0 when `total` is 0.
    pub percent: u32,
    pub message: String,
}

impl ProgressRecord {
    fn new(stage: Stage, current: u32, total: u32, message: &str) -> Self {
        let percent = if total > 0 { current * 100 / total } else { 0 };
        Self {
            stage,
            current,
            total,
            percent,
            message: message.to_string(),
        }
    }
}

/// Events produced by [`ProgressRegistry::watch`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The record changed; here is its new state.
    Snapshot(ProgressRecord),
    /// Terminal marker following the `complete` snapshot.
    Complete(ProgressRecord),
    /// Terminal marker: nothing changed for the whole inactivity budget.
    Timeout,
}

struct Entry {
    record: ProgressRecord,
    completed_at: Option<Instant>,
}

/// Process-wide progress table with atomic per-key updates and an internal
/// reaper for expired records.
pub struct ProgressRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    grace: Duration,
    poll: Duration,
    idle: Duration,
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::with_timings(DEFAULT_GRACE, DEFAULT_POLL, DEFAULT_IDLE)
    }

    /// Registry with explicit timings. Production uses [`ProgressRegistry::new`];
    /// tests shrink the windows.
    pub fn with_timings(grace: Duration, poll: Duration, idle: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            grace,
            poll,
            idle,
        }
    }

    /// Register a freshly issued task id in the `pending` stage.
    pub async fn create_pending(&self, task_id: &str) {
        let mut entries = self.entries.write().await;
        entries.insert(
            task_id.to_string(),
            Entry {
                record: ProgressRecord::new(Stage::Pending, 0, 100, "等待开始..."),
                completed_at: None,
            },
        );
    }

    /// Called by the orchestrator at job entry: (re)register the record in
    /// the `upload` stage. Unlike [`ProgressRegistry::update`] this upserts,
    /// so a job submitted with a caller-generated id is still tracked.
    pub async fn begin(&self, task_id: &str) {
        let mut entries = self.entries.write().await;
        entries.insert(
            task_id.to_string(),
            Entry {
                record: ProgressRecord::new(Stage::Upload, 0, 100, "正在保存上传文件..."),
                completed_at: None,
            },
        );
    }

    /// Advance a tracked record. Writes to unknown ids are dropped (the
    /// record may already have been reaped); backwards stage transitions are
    /// dropped too.
    pub async fn update(&self, task_id: &str, stage: Stage, current: u32, total: u32, message: &str) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(task_id) else {
            return;
        };
        if stage < entry.record.stage {
            warn!(
                task_id,
                requested = ?stage,
                current = ?entry.record.stage,
                "dropping backwards progress transition"
            );
            return;
        }
        entry.record = ProgressRecord::new(stage, current, total, message);
        if stage == Stage::Complete {
            entry.completed_at = Some(Instant::now());
        }
    }

    /// Current snapshot of a record, if tracked.
    pub async fn get(&self, task_id: &str) -> Option<ProgressRecord> {
        self.entries.read().await.get(task_id).map(|e| e.record.clone())
    }

    /// Remove records whose completion outlived the grace window.
    /// Returns how many were removed.
    pub async fn reap_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let grace = self.grace;
        entries.retain(|_, e| match e.completed_at {
            Some(done) => done.elapsed() < grace,
            None => true,
        });
        before - entries.len()
    }

    /// Spawn the background reaper. Runs for the lifetime of the process.
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = (registry.grace / 4).max(Duration::from_millis(250));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = registry.reap_expired().await;
                if removed > 0 {
                    debug!(removed, "reaped expired progress records");
                }
            }
        })
    }

    /// Live-update stream for one task id.
    ///
    /// Emits a [`ProgressEvent::Snapshot`] whenever the record's observable
    /// fields change, then either a [`ProgressEvent::Complete`] marker right
    /// after the `complete` snapshot, or a [`ProgressEvent::Timeout`] marker
    /// once nothing has changed for the inactivity budget. The stream ends
    /// after either terminal marker.
    pub fn watch(self: Arc<Self>, task_id: String) -> impl Stream<Item = ProgressEvent> {
        let poll = self.poll;
        let idle = self.idle;
        let state = WatchState {
            registry: self,
            task_id,
            last: None,
            last_change: Instant::now(),
            terminal: None,
            done: false,
        };
        stream::unfold(state, move |mut st| async move {
            if st.done {
                return None;
            }
            if let Some(ev) = st.terminal.take() {
                st.done = true;
                return Some((ev, st));
            }
            loop {
                if let Some(rec) = st.registry.get(&st.task_id).await {
                    if st.last.as_ref() != Some(&rec) {
                        st.last = Some(rec.clone());
                        st.last_change = Instant::now();
                        if rec.stage == Stage::Complete {
                            st.terminal = Some(ProgressEvent::Complete(rec.clone()));
                        }
                        return Some((ProgressEvent::Snapshot(rec), st));
                    }
                }
                if st.last_change.elapsed() >= idle {
                    st.done = true;
                    return Some((ProgressEvent::Timeout, st));
                }
                tokio::time::sleep(poll).await;
            }
        })
    }
}

struct WatchState {
    registry: Arc<ProgressRegistry>,
    task_id: String,
    last: Option<ProgressRecord>,
    last_change: Instant,
    terminal: Option<ProgressEvent>,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn fast_registry() -> Arc<ProgressRegistry> {
        Arc::new(ProgressRegistry::with_timings(
            Duration::from_secs(1),
            Duration::from_millis(10),
            Duration::from_millis(200),
        ))
    }

    #[test]
    fn percent_is_floored_and_zero_safe() {
        assert_eq!(ProgressRecord::new(Stage::Inference, 1, 3, "m").percent, 33);
        assert_eq!(ProgressRecord::new(Stage::Inference, 2, 3, "m").percent, 66);
        assert_eq!(ProgressRecord::new(Stage::Pending, 5, 0, "m").percent, 0);
        assert_eq!(ProgressRecord::new(Stage::Complete, 100, 100, "m").percent, 100);
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let reg = fast_registry();
        reg.update("ghost", Stage::Inference, 50, 100, "m").await;
        assert!(reg.get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn stage_transitions_are_monotonic() {
        let reg = fast_registry();
        reg.create_pending("t").await;
        reg.update("t", Stage::Inference, 50, 100, "mid").await;
        reg.update("t", Stage::Upload, 0, 100, "backwards").await;
        let rec = reg.get("t").await.unwrap();
        assert_eq!(rec.stage, Stage::Inference);
        assert_eq!(rec.percent, 50);
    }

    #[tokio::test]
    async fn begin_upserts_untracked_ids() {
        let reg = fast_registry();
        reg.begin("caller-made").await;
        assert_eq!(reg.get("caller-made").await.unwrap().stage, Stage::Upload);
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_removes_completed_after_grace() {
        let reg = fast_registry();
        reg.create_pending("t").await;
        reg.update("t", Stage::Complete, 100, 100, "done").await;
        assert_eq!(reg.reap_expired().await, 0);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(reg.reap_expired().await, 1);
        assert!(reg.get("t").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_keeps_in_flight_records() {
        let reg = fast_registry();
        reg.create_pending("t").await;
        reg.update("t", Stage::Inference, 40, 100, "working").await;
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(reg.reap_expired().await, 0);
        assert!(reg.get("t").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn watch_emits_changes_then_terminal_marker() {
        let reg = fast_registry();
        reg.create_pending("t").await;
        let mut stream = Box::pin(Arc::clone(&reg).watch("t".to_string()));

        let first = stream.next().await.unwrap();
        assert!(matches!(first, ProgressEvent::Snapshot(ref r) if r.stage == Stage::Pending));

        reg.update("t", Stage::Complete, 100, 100, "识别完成！").await;
        let second = stream.next().await.unwrap();
        assert!(matches!(second, ProgressEvent::Snapshot(ref r) if r.stage == Stage::Complete));

        let third = stream.next().await.unwrap();
        match third {
            ProgressEvent::Complete(rec) => assert_eq!(rec.percent, 100),
            other => panic!("expected complete marker, got {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn watch_suppresses_value_equal_rewrites() {
        let reg = fast_registry();
        reg.create_pending("t").await;
        let mut stream = Box::pin(Arc::clone(&reg).watch("t".to_string()));

        assert!(matches!(stream.next().await, Some(ProgressEvent::Snapshot(_))));
        // Same values rewritten: no snapshot, the stream idles into timeout.
        reg.update("t", Stage::Pending, 0, 100, "等待开始...").await;
        assert_eq!(stream.next().await, Some(ProgressEvent::Timeout));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn watch_times_out_on_unknown_id() {
        let reg = fast_registry();
        let mut stream = Box::pin(Arc::clone(&reg).watch("missing".to_string()));
        assert_eq!(stream.next().await, Some(ProgressEvent::Timeout));
        assert!(stream.next().await.is_none());
    }
}
