//! Health twin synchronizer.
//!
//! Keeps one patient's twin fresh by combining a fetch on start, optional
//! polling, realtime invalidation and update-then-refetch writes. State lives
//! in a `watch` channel; consumers read snapshots or subscribe.
//!
//! Every pass takes a sequence number when issued and only commits while it
//! is still the newest one, so overlapping passes settle on the latest
//! response. A session's `CancelToken` is checked inside the same commit,
//! so nothing lands after `stop()` or a patient change.

mod cancel;
mod error;
mod options;
mod state;

pub use cancel::CancelToken;
pub use error::SyncError;
pub use options::SyncOptions;
pub use state::{HealthTwinState, SyncPhase};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::select_all;
use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::BroadcastStream;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::DEFAULT_FRESHNESS_WINDOW;
use crate::models::{EventName, HealthTwinUpdate, RealtimeEvent, TwinRecord, UpdateResponse};
use crate::realtime::RealtimeChannel;
use crate::source::HealthTwinSource;
use crate::summary::HealthSummary;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    source: Arc<dyn HealthTwinSource>,
    state: watch::Sender<HealthTwinState>,
    /// Sequence number of the newest pass issued.
    issued: AtomicU64,
}

/// What a pass needs to know about the session that issued it.
#[derive(Clone)]
struct PassContext {
    patient_id: String,
    comprehensive: bool,
    cancel: CancelToken,
}

impl Inner {
    /// Apply `change` unless the session was cancelled or a newer pass exists.
    fn commit(&self, ctx: &PassContext, seq: u64, change: impl FnOnce(&mut HealthTwinState)) -> bool {
        self.state.send_if_modified(|state| {
            if ctx.cancel.is_cancelled() || self.issued.load(Ordering::SeqCst) != seq {
                return false;
            }
            change(state);
            true
        })
    }

    /// One synchronization pass: primary fetch, then both auxiliary fetches
    /// concurrently. Only primary failures reach `error`.
    async fn run_pass(&self, ctx: &PassContext) {
        // Passes from an ended session take no sequence number.
        let mut seq = 0;
        let started = self.state.send_if_modified(|state| {
            if ctx.cancel.is_cancelled() {
                return false;
            }
            seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            state.loading = true;
            state.error = None;
            state.phase = SyncPhase::Loading;
            true
        });
        if !started {
            tracing::debug!("Pass dropped before start, session ended");
            return;
        }

        let primary = if ctx.comprehensive {
            self.source
                .get_comprehensive_health_twin(&ctx.patient_id)
                .await
                .map(TwinRecord::Comprehensive)
        } else {
            self.source
                .get_health_twin(&ctx.patient_id)
                .await
                .map(TwinRecord::Base)
        };

        let record = match primary {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(seq, error = %e, "Health twin fetch failed");
                let message = e.to_string();
                self.commit(ctx, seq, move |state| {
                    state.error = Some(message);
                    state.loading = false;
                    state.phase = SyncPhase::Errored;
                });
                return;
            }
        };

        let fetched_at = Utc::now();
        let accepted = self.commit(ctx, seq, move |state| {
            state.health_twin = Some(record);
            state.last_updated = Some(fetched_at);
        });
        if !accepted {
            tracing::debug!(seq, "Discarding superseded health twin response");
            return;
        }

        let insights = async {
            match self.source.get_predictive_insights(&ctx.patient_id).await {
                Ok(insights) => {
                    self.commit(ctx, seq, move |state| state.predictive_insights = Some(insights));
                }
                Err(e) => tracing::warn!(seq, error = %e, "Predictive insights fetch failed"),
            }
        };
        let visualization = async {
            match self.source.get_visualization_data(&ctx.patient_id).await {
                Ok(data) => {
                    self.commit(ctx, seq, move |state| state.visualization_data = Some(data));
                }
                Err(e) => tracing::warn!(seq, error = %e, "Visualization data fetch failed"),
            }
        };
        tokio::join!(insights, visualization);

        self.commit(ctx, seq, |state| {
            state.loading = false;
            state.phase = SyncPhase::Ready;
        });
        tracing::debug!(seq, "Health twin pass complete");
    }
}

fn spawn_pass(inner: &Arc<Inner>, ctx: &PassContext) {
    let inner = inner.clone();
    let ctx = ctx.clone();
    tokio::spawn(async move { inner.run_pass(&ctx).await }.in_current_span());
}

/// One patient's polling and realtime wiring. Dropping it ends the session.
struct Session {
    id: Uuid,
    patient_id: String,
    options: SyncOptions,
    cancel: CancelToken,
    span: tracing::Span,
    poller: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

impl Session {
    fn context(&self) -> PassContext {
        PassContext {
            patient_id: self.patient_id.clone(),
            comprehensive: self.options.comprehensive,
            cancel: self.cancel.clone(),
        }
    }

    fn spawn_pass(&self, inner: &Arc<Inner>) {
        let _entered = self.span.enter();
        spawn_pass(inner, &self.context());
    }

    fn rewire_poller(&mut self, inner: &Arc<Inner>) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if !self.options.auto_refresh {
            return;
        }
        let every = self.options.refresh_interval;
        if every.is_zero() {
            tracing::warn!(session = %self.id, "Auto refresh requested with a zero interval, polling disabled");
            return;
        }
        let first = Instant::now() + every;
        self.poller = Some(tokio::spawn(
            poll(inner.clone(), self.context(), first, every).instrument(self.span.clone()),
        ));
    }

    fn rewire_listener(&mut self, inner: &Arc<Inner>, channel: Option<&Arc<dyn RealtimeChannel>>) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if !self.options.enable_realtime {
            return;
        }
        let Some(channel) = channel else {
            return;
        };
        // Subscribe before returning so no event published after this call is missed.
        let receivers = EventName::ALL.map(|name| (name, channel.subscribe(name)));
        self.listener = Some(tokio::spawn(
            listen(inner.clone(), self.context(), receivers, self.options.realtime_coalesce)
                .instrument(self.span.clone()),
        ));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

async fn poll(inner: Arc<Inner>, ctx: PassContext, first: Instant, every: Duration) {
    let mut ticks = tokio::time::interval_at(first, every);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = ticks.tick() => {
                if inner.state.borrow().loading {
                    tracing::debug!("Skipping scheduled refresh, a pass is in flight");
                    continue;
                }
                spawn_pass(&inner, &ctx);
            }
        }
    }
}

async fn listen(
    inner: Arc<Inner>,
    ctx: PassContext,
    receivers: [(EventName, broadcast::Receiver<RealtimeEvent>); 3],
    coalesce: Option<Duration>,
) {
    let mut events = select_all(
        receivers
            .into_iter()
            .map(|(name, rx)| BroadcastStream::new(rx).map(move |item| (name, item))),
    );
    let mut flush_at: Option<Instant> = None;

    loop {
        let pending = flush_at;
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = flush(pending) => {
                flush_at = None;
                tracing::debug!("Realtime burst settled, refreshing");
                spawn_pass(&inner, &ctx);
            }
            next = events.next() => {
                let Some((name, item)) = next else {
                    tracing::debug!("Realtime subscriptions closed");
                    break;
                };
                let invalidated = match item {
                    Ok(event) if event.patient_id() == ctx.patient_id => {
                        tracing::info!(event = %name, "Realtime invalidation");
                        true
                    }
                    Ok(event) => {
                        tracing::trace!(event = %name, other = event.patient_id(), "Ignoring event for another patient");
                        false
                    }
                    // Missed events may have concerned this patient.
                    Err(e) => {
                        tracing::warn!(event = %name, error = %e, "Realtime receiver lagged, refreshing once");
                        true
                    }
                };
                if !invalidated {
                    continue;
                }
                match coalesce {
                    Some(window) => flush_at = Some(Instant::now() + window),
                    None => spawn_pass(&inner, &ctx),
                }
            }
        }
    }
}

async fn flush(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Keeps one patient's health twin in sync with the remote service.
///
/// `start` spawns tasks and must be called inside a tokio runtime.
pub struct HealthTwinSynchronizer {
    inner: Arc<Inner>,
    session: Mutex<Option<Session>>,
    channel: Mutex<Option<Arc<dyn RealtimeChannel>>>,
}

impl HealthTwinSynchronizer {
    pub fn new(
        source: Arc<dyn HealthTwinSource>,
        channel: Option<Arc<dyn RealtimeChannel>>,
    ) -> Self {
        let (state, _) = watch::channel(HealthTwinState::default());
        Self {
            inner: Arc::new(Inner {
                source,
                state,
                issued: AtomicU64::new(0),
            }),
            session: Mutex::new(None),
            channel: Mutex::new(channel),
        }
    }

    /// Begin syncing `patient_id`, ending any previous session.
    ///
    /// No-op when the id is absent or empty. Switching to a different
    /// patient resets the state; restarting the same patient keeps it.
    /// Always issues exactly one initial pass.
    pub fn start(&self, patient_id: Option<&str>, options: SyncOptions) {
        let Some(patient_id) = patient_id.filter(|id| !id.is_empty()) else {
            tracing::debug!("No patient selected, synchronizer stays idle");
            return;
        };

        let channel = self.channel();
        let mut slot = lock(&self.session);
        drop(slot.take());

        self.inner.state.send_if_modified(|state| {
            if state.patient_id.as_deref() == Some(patient_id) {
                return false;
            }
            *state = HealthTwinState::for_patient(patient_id);
            true
        });

        let id = Uuid::new_v4();
        let mut session = Session {
            id,
            patient_id: patient_id.to_string(),
            span: tracing::info_span!("twin_session", session = %id, patient = %patient_id),
            options,
            cancel: CancelToken::new(),
            poller: None,
            listener: None,
        };
        session.spawn_pass(&self.inner);
        session.rewire_poller(&self.inner);
        session.rewire_listener(&self.inner, channel.as_ref());

        tracing::info!(
            session = %id,
            patient = %patient_id,
            comprehensive = session.options.comprehensive,
            polling = session.poller.is_some(),
            realtime = session.listener.is_some(),
            "Synchronizer started"
        );
        *slot = Some(session);
    }

    /// Run one pass for the active patient and wait for it to finish.
    pub async fn refetch(&self) {
        let Some((ctx, span)) = self.pass_context() else {
            tracing::debug!("Refetch ignored, no active patient");
            return;
        };
        self.inner.run_pass(&ctx).instrument(span).await;
    }

    /// Submit a write, then refetch once if the server accepted it.
    ///
    /// Failures are returned to the caller and never touch `error`.
    pub async fn update(&self, payload: &HealthTwinUpdate) -> Result<UpdateResponse, SyncError> {
        let Some((ctx, span)) = self.pass_context() else {
            return Err(SyncError::NoPatient);
        };

        async {
            let response = match self.inner.source.update_health_twin(&ctx.patient_id, payload).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, "Health twin update failed");
                    return Err(e.into());
                }
            };
            if !response.success {
                tracing::warn!("Health twin update rejected");
                return Err(SyncError::UpdateRejected);
            }

            tracing::info!(score = response.health_twin.health_score, "Health twin updated, refreshing");
            self.inner.run_pass(&ctx).await;
            Ok(response)
        }
        .instrument(span)
        .await
    }

    pub fn clear_error(&self) {
        self.inner.state.send_if_modified(|state| state.error.take().is_some());
    }

    /// End the session: polling stops, subscriptions are dropped and late
    /// responses are discarded. Safe to call repeatedly.
    pub fn stop(&self) {
        let session = lock(&self.session).take();
        if let Some(session) = session {
            tracing::info!(session = %session.id, patient = %session.patient_id, "Synchronizer stopped");
        }
        self.inner.state.send_if_modified(|state| {
            let changed = state.loading || state.phase != SyncPhase::Idle;
            state.loading = false;
            state.phase = SyncPhase::Idle;
            changed
        });
    }

    /// Swap the realtime channel. The running session resubscribes only
    /// when the instance actually changed.
    pub fn set_channel(&self, channel: Option<Arc<dyn RealtimeChannel>>) {
        {
            let mut current = lock(&self.channel);
            let unchanged = match (current.as_ref(), channel.as_ref()) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return;
            }
            *current = channel.clone();
        }

        if let Some(session) = lock(&self.session).as_mut() {
            tracing::debug!(session = %session.id, "Realtime channel replaced, resubscribing");
            session.rewire_listener(&self.inner, channel.as_ref());
        }
    }

    /// Change the running session's options. Polling and subscriptions are
    /// rebuilt only when their settings change; switching the twin shape
    /// also refetches.
    pub fn set_options(&self, options: SyncOptions) {
        let channel = self.channel();
        let mut slot = lock(&self.session);
        let Some(session) = slot.as_mut() else {
            tracing::debug!("Options ignored, no active patient");
            return;
        };
        if session.options == options {
            return;
        }

        let previous = std::mem::replace(&mut session.options, options);
        let shape_changed = previous.comprehensive != session.options.comprehensive;
        if shape_changed || previous.polling_changed(&session.options) {
            session.rewire_poller(&self.inner);
        }
        if shape_changed || previous.realtime_changed(&session.options) {
            session.rewire_listener(&self.inner, channel.as_ref());
        }
        if shape_changed {
            session.spawn_pass(&self.inner);
        }
    }

    pub fn snapshot(&self) -> HealthTwinState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthTwinState> {
        self.inner.state.subscribe()
    }

    /// Patient of the running session, if any.
    pub fn patient_id(&self) -> Option<String> {
        lock(&self.session).as_ref().map(|s| s.patient_id.clone())
    }

    pub fn is_data_fresh(&self) -> bool {
        let window = lock(&self.session)
            .as_ref()
            .map_or(DEFAULT_FRESHNESS_WINDOW, |s| s.options.freshness_window);
        self.inner.state.borrow().is_data_fresh_at(Utc::now(), window)
    }

    pub fn health_summary(&self) -> Option<HealthSummary> {
        self.inner.state.borrow().health_summary()
    }

    fn channel(&self) -> Option<Arc<dyn RealtimeChannel>> {
        lock(&self.channel).clone()
    }

    fn pass_context(&self) -> Option<(PassContext, tracing::Span)> {
        lock(&self.session)
            .as_ref()
            .map(|s| (s.context(), s.span.clone()))
    }
}

impl Drop for HealthTwinSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, HealthTwinUpdateEvent, RiskAlertEvent, Severity, UpdateKind};
    use crate::realtime::LocalChannel;
    use crate::source::mock::{self, ScriptedSource};
    use crate::source::SourceError;

    const PATIENT: &str = "patient-42";
    const STAMP: &str = "2024-01-01T00:00:00Z";

    fn source() -> Arc<ScriptedSource> {
        Arc::new(ScriptedSource::healthy(PATIENT, STAMP))
    }

    fn synchronizer(
        source: &Arc<ScriptedSource>,
        channel: Option<&Arc<LocalChannel>>,
    ) -> HealthTwinSynchronizer {
        HealthTwinSynchronizer::new(
            source.clone(),
            channel.map(|c| c.clone() as Arc<dyn RealtimeChannel>),
        )
    }

    fn update_event(patient_id: &str) -> RealtimeEvent {
        RealtimeEvent::Update(HealthTwinUpdateEvent {
            patient_id: patient_id.into(),
            kind: UpdateKind::Vitals,
            data: serde_json::json!({ "heartRate": 72 }),
            timestamp: STAMP.into(),
        })
    }

    fn alert_event(patient_id: &str) -> RealtimeEvent {
        RealtimeEvent::RiskAlert(RiskAlertEvent {
            patient_id: patient_id.into(),
            alert_type: AlertKind::RiskScoreChange,
            severity: Severity::Medium,
            message: "Risk score increased".into(),
            timestamp: STAMP.into(),
        })
    }

    fn settled(sync: &HealthTwinSynchronizer) -> bool {
        let state = sync.snapshot();
        !state.loading && matches!(state.phase, SyncPhase::Ready | SyncPhase::Errored)
    }

    /// Step virtual time until `done` holds.
    async fn until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(60), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition never held");
    }

    async fn idle_for(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn subscribers(channel: &LocalChannel) -> usize {
        EventName::ALL.into_iter().map(|n| channel.subscriber_count(n)).sum()
    }

    #[tokio::test(start_paused = true)]
    async fn start_loads_twin_and_auxiliary_records_once() {
        let source = source();
        let sync = synchronizer(&source, None);
        sync.start(
            Some(PATIENT),
            SyncOptions {
                auto_refresh: true,
                ..SyncOptions::default()
            },
        );
        assert_eq!(sync.patient_id().as_deref(), Some(PATIENT));

        until(|| settled(&sync)).await;
        idle_for(50).await;

        assert_eq!(source.calls.primary(), 1);
        assert_eq!(source.calls.insights.load(Ordering::SeqCst), 1);
        assert_eq!(source.calls.visualization.load(Ordering::SeqCst), 1);

        let state = sync.snapshot();
        let record = state.health_twin.as_ref().unwrap();
        assert!(matches!(record, TwinRecord::Base(_)));
        assert_eq!(record.patient_id(), PATIENT);
        assert_eq!(record.last_updated(), STAMP);
        assert!(state.predictive_insights.is_some());
        assert!(state.visualization_data.is_some());
        assert!(state.last_updated.is_some());
        assert_eq!(state.error, None);
        assert_eq!(state.phase, SyncPhase::Ready);
        assert!(sync.health_summary().is_some());
        assert!(!sync.is_data_fresh());
    }

    #[tokio::test(start_paused = true)]
    async fn absent_or_empty_patient_is_a_no_op() {
        let source = source();
        let sync = synchronizer(&source, None);
        sync.start(None, SyncOptions::default());
        sync.start(Some(""), SyncOptions::default());
        idle_for(50).await;

        assert_eq!(source.calls.total(), 0);
        assert_eq!(sync.snapshot(), HealthTwinState::default());
        assert_eq!(sync.patient_id(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn comprehensive_option_selects_extended_twin() {
        let source = source();
        let sync = synchronizer(&source, None);
        sync.start(
            Some(PATIENT),
            SyncOptions {
                comprehensive: true,
                ..SyncOptions::default()
            },
        );
        until(|| settled(&sync)).await;

        assert_eq!(source.calls.twin.load(Ordering::SeqCst), 0);
        assert_eq!(source.calls.comprehensive.load(Ordering::SeqCst), 1);
        match sync.snapshot().health_twin {
            Some(TwinRecord::Comprehensive(twin)) => assert!(twin.population_comparison.is_some()),
            other => panic!("expected comprehensive twin, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_fetch_failure_sets_error_only() {
        let source = source();
        source.set_twin(Err(SourceError::Transport("network timeout".into())));
        let sync = synchronizer(&source, None);
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;

        let state = sync.snapshot();
        assert_eq!(state.error.as_deref(), Some("network timeout"));
        assert_eq!(state.phase, SyncPhase::Errored);
        assert!(state.health_twin.is_none());
        assert!(state.predictive_insights.is_none());
        assert!(state.visualization_data.is_none());
        assert_eq!(source.calls.insights.load(Ordering::SeqCst), 0);
        assert_eq!(source.calls.visualization.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn primary_failure_keeps_previous_twin() {
        let source = source();
        let sync = synchronizer(&source, None);
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;
        let before = sync.snapshot();

        source.set_twin(Err(SourceError::Transport("network timeout".into())));
        sync.refetch().await;

        let failed = sync.snapshot();
        assert_eq!(failed.error.as_deref(), Some("network timeout"));
        assert_eq!(failed.health_twin, before.health_twin);
        assert_eq!(failed.last_updated, before.last_updated);
        assert_eq!(failed.predictive_insights, before.predictive_insights);
        assert!(!failed.loading);
        assert_eq!(failed.phase, SyncPhase::Errored);

        source.set_twin(Ok(mock::twin(PATIENT, "2024-02-01T00:00:00Z")));
        sync.refetch().await;

        let recovered = sync.snapshot();
        assert_eq!(recovered.error, None);
        assert_eq!(recovered.phase, SyncPhase::Ready);
        assert_eq!(
            recovered.health_twin.as_ref().map(|r| r.last_updated()),
            Some("2024-02-01T00:00:00Z")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn auxiliary_failures_are_swallowed_independently() {
        let source = source();
        source.set_insights(Err(SourceError::Api {
            status: 500,
            message: "model offline".into(),
        }));
        let sync = synchronizer(&source, None);
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;

        let state = sync.snapshot();
        assert!(state.predictive_insights.is_none());
        assert!(state.visualization_data.is_some());
        assert_eq!(state.error, None);
        assert_eq!(state.phase, SyncPhase::Ready);

        source.set_insights(Ok(mock::insights(PATIENT, "second")));
        source.set_visualization(Err(SourceError::Transport("reset by peer".into())));
        sync.refetch().await;

        let state = sync.snapshot();
        assert_eq!(state.predictive_insights.unwrap().timestamp, "second");
        assert_eq!(state.visualization_data.unwrap().timestamp, STAMP);
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn auxiliary_fetches_run_concurrently() {
        let source = source();
        source.set_aux_delay(Duration::from_secs(1));
        let sync = synchronizer(&source, None);
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;

        let began = Instant::now();
        sync.refetch().await;
        assert!(began.elapsed() < Duration::from_millis(1_500));
        assert_eq!(source.calls.insights.load(Ordering::SeqCst), 2);
        assert_eq!(source.calls.visualization.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_error_leaves_everything_else() {
        let source = source();
        source.set_twin(Err(SourceError::Transport("network timeout".into())));
        let sync = synchronizer(&source, None);
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;

        let before = sync.snapshot();
        sync.clear_error();
        let after = sync.snapshot();
        assert_eq!(after.error, None);
        assert_eq!(HealthTwinState { error: None, ..before }, after);
    }

    #[tokio::test(start_paused = true)]
    async fn update_without_patient_makes_no_calls() {
        let source = source();
        let sync = synchronizer(&source, None);

        let err = sync.update(&HealthTwinUpdate::default()).await.unwrap_err();
        assert_eq!(err, SyncError::NoPatient);
        assert_eq!(source.calls.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_update_refetches_exactly_once() {
        let source = source();
        let sync = synchronizer(&source, None);
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;

        let update = HealthTwinUpdate {
            notes: Some("Feeling better".into()),
            ..Default::default()
        };
        let response = sync.update(&update).await.unwrap();
        assert!(response.success);
        assert_eq!(source.calls.update.load(Ordering::SeqCst), 1);
        assert_eq!(source.calls.primary(), 2);
        assert!(settled(&sync));

        idle_for(50).await;
        assert_eq!(source.calls.primary(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_update_does_not_refetch_or_set_error() {
        let source = source();
        let sync = synchronizer(&source, None);
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;

        source.set_update(Ok(UpdateResponse::default()));
        let err = sync.update(&HealthTwinUpdate::default()).await.unwrap_err();
        assert_eq!(err, SyncError::UpdateRejected);

        source.set_update(Err(SourceError::Transport("offline".into())));
        let err = sync.update(&HealthTwinUpdate::default()).await.unwrap_err();
        assert_eq!(err, SyncError::Source(SourceError::Transport("offline".into())));
        assert_eq!(err.to_string(), "offline");

        idle_for(50).await;
        assert_eq!(source.calls.primary(), 1);
        assert_eq!(sync.snapshot().error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn realtime_events_for_this_patient_trigger_one_refetch() {
        let source = source();
        let channel = Arc::new(LocalChannel::new());
        let sync = synchronizer(&source, Some(&channel));
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;
        assert_eq!(subscribers(&channel), 3);

        assert_eq!(channel.publish(EventName::RiskAlert, alert_event("someone-else")), 1);
        idle_for(50).await;
        assert_eq!(source.calls.primary(), 1);

        channel.publish(EventName::TwinUpdated, update_event(PATIENT));
        until(|| source.calls.primary() == 2 && settled(&sync)).await;
        idle_for(50).await;
        assert_eq!(source.calls.primary(), 2);

        channel.publish(EventName::PatientDataChanged, update_event(PATIENT));
        channel.publish(EventName::RiskAlert, alert_event(PATIENT));
        until(|| source.calls.primary() == 4 && settled(&sync)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn realtime_disabled_means_no_subscriptions() {
        let source = source();
        let channel = Arc::new(LocalChannel::new());
        let sync = synchronizer(&source, Some(&channel));
        sync.start(
            Some(PATIENT),
            SyncOptions {
                enable_realtime: false,
                ..SyncOptions::default()
            },
        );
        assert_eq!(subscribers(&channel), 0);
        assert_eq!(channel.publish(EventName::TwinUpdated, update_event(PATIENT)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_coalesced_when_enabled() {
        let source = source();
        let channel = Arc::new(LocalChannel::new());
        let sync = synchronizer(&source, Some(&channel));
        sync.start(
            Some(PATIENT),
            SyncOptions {
                realtime_coalesce: Some(Duration::from_millis(500)),
                ..SyncOptions::default()
            },
        );
        until(|| settled(&sync)).await;

        for _ in 0..5 {
            channel.publish(EventName::TwinUpdated, update_event(PATIENT));
            idle_for(100).await;
        }
        assert_eq!(source.calls.primary(), 1);

        idle_for(1_000).await;
        assert_eq!(source.calls.primary(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn lagged_receiver_counts_as_one_invalidation() {
        let source = source();
        let channel = Arc::new(LocalChannel::with_capacity(1));
        let sync = synchronizer(&source, Some(&channel));
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;

        // The listener cannot run in between, so it sees one lag notice
        // followed by the newest event.
        for _ in 0..5 {
            channel.publish(EventName::TwinUpdated, update_event(PATIENT));
        }
        until(|| source.calls.primary() == 3 && settled(&sync)).await;
        idle_for(50).await;
        assert_eq!(source.calls.primary(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_refreshes_on_interval_and_skips_while_loading() {
        let source = source();
        // Initial pass outlasts the first two ticks.
        source.push_twin(Duration::from_millis(2_500), Ok(mock::twin(PATIENT, STAMP)));
        let sync = synchronizer(&source, None);
        sync.start(
            Some(PATIENT),
            SyncOptions {
                auto_refresh: true,
                refresh_interval: Duration::from_secs(1),
                ..SyncOptions::default()
            },
        );

        idle_for(2_400).await;
        assert_eq!(source.calls.primary(), 1);
        assert!(sync.snapshot().loading);

        // t = 3.5s: the tick at 3s refreshed.
        idle_for(1_100).await;
        assert_eq!(source.calls.primary(), 2);

        // t = 5.5s: ticks at 4s and 5s.
        idle_for(2_000).await;
        assert_eq!(source.calls.primary(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_polling_and_subscriptions() {
        let source = source();
        let channel = Arc::new(LocalChannel::new());
        let sync = synchronizer(&source, Some(&channel));
        sync.start(
            Some(PATIENT),
            SyncOptions {
                auto_refresh: true,
                refresh_interval: Duration::from_secs(1),
                ..SyncOptions::default()
            },
        );
        until(|| settled(&sync)).await;

        sync.stop();
        sync.stop();
        idle_for(10).await;

        assert_eq!(subscribers(&channel), 0);
        assert_eq!(sync.snapshot().phase, SyncPhase::Idle);
        assert_eq!(sync.patient_id(), None);

        idle_for(5_000).await;
        assert_eq!(source.calls.primary(), 1);
        assert_eq!(channel.publish(EventName::TwinUpdated, update_event(PATIENT)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn response_after_stop_is_discarded() {
        let source = source();
        source.push_twin(Duration::from_secs(5), Ok(mock::twin(PATIENT, "late")));
        let sync = synchronizer(&source, None);
        sync.start(Some(PATIENT), SyncOptions::default());

        idle_for(10).await;
        assert!(sync.snapshot().loading);

        sync.stop();
        let stopped = sync.snapshot();
        assert!(!stopped.loading);
        assert_eq!(stopped.phase, SyncPhase::Idle);

        idle_for(10_000).await;
        assert_eq!(sync.snapshot(), stopped);
        assert!(sync.snapshot().health_twin.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newest_pass_wins() {
        let source = source();
        source.push_twin(Duration::from_secs(5), Ok(mock::twin(PATIENT, "slow")));
        source.push_twin(Duration::ZERO, Ok(mock::twin(PATIENT, "fast")));
        let sync = synchronizer(&source, None);
        sync.start(Some(PATIENT), SyncOptions::default());

        idle_for(10).await;
        sync.refetch().await;
        assert_eq!(sync.snapshot().health_twin.as_ref().map(|r| r.last_updated()), Some("fast"));

        idle_for(10_000).await;
        let state = sync.snapshot();
        assert_eq!(state.health_twin.as_ref().map(|r| r.last_updated()), Some("fast"));
        assert!(!state.loading);
        assert_eq!(state.phase, SyncPhase::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn late_update_does_not_stall_the_next_patient() {
        let source = source();
        source.set_update_delay(Duration::from_secs(5));
        let sync = Arc::new(synchronizer(&source, None));
        sync.start(Some("p1"), SyncOptions::default());
        until(|| settled(&sync)).await;

        let pending = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.update(&HealthTwinUpdate::default()).await })
        };
        idle_for(1_000).await;

        // p2's first pass is still in flight when p1's update returns.
        source.push_twin(Duration::from_secs(10), Ok(mock::twin("p2", STAMP)));
        sync.start(
            Some("p2"),
            SyncOptions {
                auto_refresh: true,
                refresh_interval: Duration::from_secs(1),
                ..SyncOptions::default()
            },
        );
        assert!(pending.await.unwrap().is_ok());
        // The ended session's refetch never reached the source.
        assert_eq!(source.calls.primary(), 2);

        until(|| settled(&sync)).await;
        let state = sync.snapshot();
        assert_eq!(state.patient_id.as_deref(), Some("p2"));
        assert_eq!(state.phase, SyncPhase::Ready);
        assert_eq!(state.health_twin.as_ref().map(|r| r.patient_id()), Some("p2"));

        // Polling resumes once the first pass lands.
        idle_for(2_500).await;
        assert!(source.calls.primary() >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_patient_resets_state_and_resubscribes() {
        let source = source();
        let channel = Arc::new(LocalChannel::new());
        let sync = synchronizer(&source, Some(&channel));
        sync.start(Some("p1"), SyncOptions::default());
        until(|| settled(&sync)).await;

        sync.start(Some("p2"), SyncOptions::default());
        let reset = sync.snapshot();
        assert_eq!(reset.patient_id.as_deref(), Some("p2"));
        assert!(reset.health_twin.is_none());
        until(|| settled(&sync)).await;
        assert_eq!(subscribers(&channel), 3);

        // Events for the old patient are now ignored.
        channel.publish(EventName::TwinUpdated, update_event("p1"));
        idle_for(50).await;
        assert_eq!(source.calls.primary(), 2);

        sync.start(Some("p2"), SyncOptions::default());
        assert!(sync.snapshot().health_twin.is_some());
        until(|| source.calls.primary() == 3 && settled(&sync)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn set_channel_rewires_only_on_a_new_instance() {
        let source = source();
        let sync = synchronizer(&source, None);
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;

        let first = Arc::new(LocalChannel::new());
        sync.set_channel(Some(first.clone()));
        assert_eq!(subscribers(&first), 3);

        sync.set_channel(Some(first.clone()));
        idle_for(10).await;
        assert_eq!(subscribers(&first), 3);

        first.publish(EventName::RiskAlert, alert_event(PATIENT));
        until(|| source.calls.primary() == 2 && settled(&sync)).await;

        let second = Arc::new(LocalChannel::new());
        sync.set_channel(Some(second.clone()));
        idle_for(10).await;
        assert_eq!(subscribers(&first), 0);
        assert_eq!(subscribers(&second), 3);

        sync.set_channel(None);
        idle_for(10).await;
        assert_eq!(subscribers(&second), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn set_options_rewires_and_refetches_on_shape_change() {
        let source = source();
        let channel = Arc::new(LocalChannel::new());
        let sync = synchronizer(&source, Some(&channel));
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;

        sync.set_options(SyncOptions {
            enable_realtime: false,
            ..SyncOptions::default()
        });
        idle_for(10).await;
        assert_eq!(subscribers(&channel), 0);
        assert_eq!(source.calls.primary(), 1);

        sync.set_options(SyncOptions {
            enable_realtime: false,
            comprehensive: true,
            ..SyncOptions::default()
        });
        until(|| source.calls.comprehensive.load(Ordering::SeqCst) == 1 && settled(&sync)).await;
        assert!(sync.snapshot().health_twin.unwrap().is_comprehensive());
    }

    #[tokio::test(start_paused = true)]
    async fn freshness_is_computed_on_read() {
        let now = Utc::now();
        let source = Arc::new(ScriptedSource::healthy(PATIENT, &now.to_rfc3339()));
        let sync = synchronizer(&source, None);
        assert!(!sync.is_data_fresh());

        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;
        assert!(sync.is_data_fresh());

        let before = sync.snapshot();
        let window = SyncOptions::default().freshness_window;
        assert!(!before.is_data_fresh_at(now + chrono::Duration::hours(25), window));
        assert_eq!(sync.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_synchronizer_unsubscribes() {
        let source = source();
        let channel = Arc::new(LocalChannel::new());
        let sync = synchronizer(&source, Some(&channel));
        sync.start(Some(PATIENT), SyncOptions::default());
        until(|| settled(&sync)).await;

        drop(sync);
        idle_for(10).await;
        assert_eq!(subscribers(&channel), 0);
    }
}
