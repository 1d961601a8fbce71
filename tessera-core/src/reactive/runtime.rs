//! Reactive Runtime
//!
//! The runtime is the explicitly constructed context object that ties the
//! engine together. It owns:
//!
//! - the stale set: fragments invalidated since the last flush,
//! - the sync coordinator: the backlog of consolidated batches and the
//!   wait/notify channel long-poll requests suspend on,
//! - the mutation handler registry,
//! - the session token generated when the runtime is created.
//!
//! # How It Works
//!
//! 1. [`Runtime::track`] turns a render closure into a [`Fragment`] whose
//!    invalidations are reported to this runtime.
//!
//! 2. A cell write marks dependents stale. They are recorded in the stale
//!    set and nothing else happens.
//!
//! 3. [`Runtime::flush`] consolidates every stale fragment still alive into
//!    one batch, appends it to the backlog and wakes all waiting polls.
//!
//! 4. [`Runtime::poll`] answers a client cursor from the backlog, or
//!    suspends until the next flush (bounded by the configured timeout).
//!
//! # Thread Safety
//!
//! The runtime is a cheap `Clone` handle around shared state. All shared
//! state sits behind `parking_lot` locks or `DashMap`, and no lock is held
//! while user render or handler code runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::fragment::{Address, Fragment, FragmentNode, Markup};
use super::ids::FragmentId;
use crate::config::Config;
use crate::error::{Error, HandlerResult, Result};
use crate::page::{Page, PageOptions};
use crate::sync::protocol::{
    now_millis, LogAck, LogRequest, MutateRequest, MutateResponse, PollRequest, SyncBody,
    SyncResponse, Update,
};
use crate::sync::{Coordinator, Replay, SessionId};

/// A registered mutation handler.
pub type Handler = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

/// Fragments invalidated since the last flush, in invalidation order.
///
/// Entries are weak; a fragment dropped before the flush is skipped.
#[derive(Default)]
pub(crate) struct StaleSet {
    entries: Mutex<IndexMap<FragmentId, Weak<FragmentNode>>>,
}

impl StaleSet {
    pub(crate) fn insert(&self, id: FragmentId, fragment: Weak<FragmentNode>) {
        self.entries.lock().insert(id, fragment);
    }

    pub(crate) fn drain(&self) -> Vec<Weak<FragmentNode>> {
        std::mem::take(&mut *self.entries.lock())
            .into_values()
            .collect()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Handle to a registered mutation handler, usable as an event attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callback {
    id: String,
    confirm: Option<u32>,
}

impl Callback {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Inline client snippet that invokes the handler with the DOM event.
    pub fn script(&self) -> String {
        match self.confirm {
            Some(count) => format!("return confirm(\"{}\", {})(arguments[0])", self.id, count),
            None => format!("return mutate(\"{}\")(arguments[0])", self.id),
        }
    }
}

struct RuntimeInner {
    config: Config,
    session: SessionId,
    stale: Arc<StaleSet>,
    coordinator: Coordinator,
    handlers: DashMap<String, Handler>,
    handler_counter: AtomicU64,
}

/// The reactive runtime.
///
/// Independent runtimes share nothing, so tests can create as many as they
/// need.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: Config) -> Self {
        let session = SessionId::generate();
        tracing::debug!(session = %session, backlog_len = config.backlog_len, "runtime created");

        Self {
            inner: Arc::new(RuntimeInner {
                coordinator: Coordinator::new(config.backlog_len),
                config,
                session,
                stale: Arc::new(StaleSet::default()),
                handlers: DashMap::new(),
                handler_counter: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn session(&self) -> &SessionId {
        &self.inner.session
    }

    /// Current tip of the cursor space.
    pub fn tip(&self) -> u64 {
        self.inner.coordinator.tip()
    }

    /// Number of live fragments waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.inner.stale.live_count()
    }

    /// Turn a render closure into a tracked fragment.
    ///
    /// The closure runs immediately to produce the initial markup and again
    /// whenever the fragment is serialized after a cell it read changed.
    /// Arguments are bound by capturing them in the closure.
    pub fn track<F, M>(&self, render: F) -> Fragment
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: Into<Markup>,
    {
        Fragment::tracked(
            Arc::new(move || render().into()),
            Arc::clone(&self.inner.stale),
        )
    }

    /// Wrap a top-level render function as a full page.
    pub fn page<F, M>(&self, options: PageOptions, render: F) -> Page
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: Into<Markup>,
    {
        Page::new(self.clone(), options, Arc::new(move || render().into()))
    }

    /// Consolidate all stale fragments into one batch.
    ///
    /// Returns the new tip, or `None` if nothing was stale. Stale fragments
    /// that have been dropped are skipped. If the same address was
    /// invalidated more than once only its final rendering is kept.
    pub fn flush(&self) -> Option<u64> {
        let stale = self.inner.stale.drain();
        if stale.is_empty() {
            return None;
        }

        let mut rendered: IndexMap<Address, String> = IndexMap::new();
        let mut dead = 0usize;
        let mut unaddressed = 0usize;

        for weak in stale {
            let Some(node) = weak.upgrade() else {
                dead += 1;
                continue;
            };
            let fragment = Fragment::from_node(node);
            let html = fragment.html();
            match fragment.address() {
                Some(address) => {
                    rendered.insert(address.clone(), html);
                }
                None => unaddressed += 1,
            }
        }

        if dead > 0 {
            tracing::trace!(dead, "skipped dropped fragments during flush");
        }
        if unaddressed > 0 {
            tracing::debug!(unaddressed, "skipped unaddressed fragments during flush");
        }

        let updates: Vec<Update> = rendered
            .into_iter()
            .map(|(address, html)| Update::new(address.key, address.index, html))
            .collect();
        let count = updates.len();
        let tip = self.inner.coordinator.publish(updates);

        tracing::debug!(tip, updates = count, "flushed stale fragments");
        Some(tip)
    }

    /// Answer a sync request without waiting.
    ///
    /// Pending invalidations are flushed first. A caught-up cursor gets an
    /// empty update list.
    pub fn poll_now(&self, request: &PollRequest) -> SyncResponse {
        if !self.session_matches(request) {
            return self.reload();
        }
        self.flush();
        self.respond(request.state)
    }

    /// Answer a sync request, long-polling when the cursor is caught up.
    ///
    /// - session mismatch, cursor below the retained window or above the
    ///   tip: reload.
    /// - cursor behind the tip: all updates from the cursor onwards.
    /// - cursor at the tip: wait for the next flush, then answer as above.
    ///   If the poll timeout elapses first the answer is the same cursor
    ///   with no updates.
    ///
    /// Dropping the returned future removes the waiter without affecting
    /// other clients.
    pub async fn poll(&self, request: PollRequest) -> SyncResponse {
        if !self.session_matches(&request) {
            tracing::debug!(cursor = request.state, "session mismatch, signalling reload");
            return self.reload();
        }
        self.flush();

        let cursor = request.state;
        match self.inner.coordinator.replay(cursor) {
            Replay::Reload => return self.reload(),
            Replay::Updates { tip, updates } if tip > cursor => {
                return SyncResponse::Updates(SyncBody::new(tip, updates));
            }
            Replay::Updates { .. } => {}
        }

        let timeout = self.inner.config.poll_timeout();
        if !self.inner.coordinator.wait_past(cursor, timeout).await {
            tracing::debug!(cursor, ?timeout, "poll timed out without new batches");
            return SyncResponse::Updates(SyncBody::new(cursor, Vec::new()));
        }

        self.respond(cursor)
    }

    fn respond(&self, cursor: u64) -> SyncResponse {
        match self.inner.coordinator.replay(cursor) {
            Replay::Reload => {
                tracing::debug!(cursor, "cursor outside retained window, signalling reload");
                self.reload()
            }
            Replay::Updates { tip, updates } => {
                tracing::debug!(cursor, tip, updates = updates.len(), "poll answered");
                SyncResponse::Updates(SyncBody::new(tip, updates))
            }
        }
    }

    fn session_matches(&self, request: &PollRequest) -> bool {
        match &request.session {
            Some(session) => session == self.inner.session.as_str(),
            None => true,
        }
    }

    fn reload(&self) -> SyncResponse {
        SyncResponse::Reload {
            location: self.inner.config.endpoints.reload.clone(),
        }
    }

    /// Register a mutation handler.
    pub fn register_handler<F>(&self, handler: F) -> Callback
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.insert_handler(Arc::new(handler), None)
    }

    /// Register a mutation handler the client only invokes after `count`
    /// confirmations.
    pub fn register_confirmed_handler<F>(&self, count: u32, handler: F) -> Callback
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.insert_handler(Arc::new(handler), Some(count.max(1)))
    }

    fn insert_handler(&self, handler: Handler, confirm: Option<u32>) -> Callback {
        let n = self.inner.handler_counter.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{:x}", self.inner.session, n);
        self.inner.handlers.insert(id.clone(), handler);
        Callback { id, confirm }
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Run a mutation handler and schedule a flush.
    ///
    /// The flush runs on a spawned task when called inside a tokio runtime,
    /// so the acknowledgement never waits on it; otherwise it runs inline.
    /// An unknown id answers reload. Handler failures are returned as
    /// [`Error::Handler`].
    pub fn mutate(&self, request: MutateRequest) -> Result<MutateResponse> {
        // Clone out of the map so the shard lock is released before the
        // handler runs.
        let handler = self
            .inner
            .handlers
            .get(&request.id)
            .map(|entry| Arc::clone(entry.value()));

        let Some(handler) = handler else {
            tracing::warn!(id = %request.id, "unknown mutation handler, signalling reload");
            return Ok(MutateResponse::Reload {
                location: self.inner.config.endpoints.reload.clone(),
            });
        };

        handler(&request.event).map_err(|source| Error::Handler {
            id: request.id.clone(),
            source,
        })?;

        self.schedule_flush();
        Ok(MutateResponse::Ack { time: now_millis() })
    }

    fn schedule_flush(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let runtime = self.clone();
                handle.spawn(async move {
                    runtime.flush();
                });
            }
            Err(_) => {
                self.flush();
            }
        }
    }

    /// Forward a client diagnostic line to the process log.
    pub fn log(&self, request: LogRequest) -> LogAck {
        tracing::info!(target: "tessera::client", "{}", request.log);
        LogAck::success()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::build(Config::default())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("session", &self.inner.session)
            .field("tip", &self.tip())
            .field("pending", &self.pending_count())
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::tags::div;
    use crate::reactive::{Cell, Index};

    fn poll_request(state: u64) -> PollRequest {
        PollRequest {
            state,
            session: None,
        }
    }

    fn updates_of(response: SyncResponse) -> (u64, Vec<Update>) {
        match response {
            SyncResponse::Updates(body) => (body.state, body.updates),
            SyncResponse::Reload { .. } => panic!("unexpected reload"),
        }
    }

    #[test]
    fn huge_backlog_len_is_accepted() {
        let config = Config::from_toml_str("backlog_len = 9223372036854775807").unwrap();
        let runtime = Runtime::new(config).unwrap();
        assert_eq!(runtime.tip(), 0);
        assert!(runtime.poll_now(&poll_request(0)).body().is_some());
    }

    #[test]
    fn flush_with_nothing_stale_is_a_no_op() {
        let runtime = Runtime::default();
        assert_eq!(runtime.flush(), None);
        assert_eq!(runtime.tip(), 0);
    }

    #[test]
    fn writes_between_flushes_collapse_into_one_batch() {
        let runtime = Runtime::default();
        let cell = Cell::new(String::from("a"));

        let source = cell.clone();
        let label = runtime.track(move || source.get());
        let container = div().child(label.clone()).build();
        let key = label.key().cloned().expect("claimed by container");

        cell.set(String::from("b"));
        cell.set(String::from("c"));
        assert_eq!(runtime.flush(), Some(1));

        let (state, updates) = updates_of(runtime.poll_now(&poll_request(0)));
        assert_eq!(state, 1);
        assert_eq!(updates, vec![Update::new(key, Index::Position(0), "c")]);
        drop(container);
    }

    #[test]
    fn write_to_cell_no_longer_read_publishes_nothing() {
        let runtime = Runtime::default();
        let flag = Cell::new(true);
        let a = Cell::new(String::from("a0"));

        let fragment = {
            let flag = flag.clone();
            let a = a.clone();
            runtime.track(move || if flag.get() { a.get() } else { String::from("off") })
        };
        let _container = div().child(&fragment).build();

        flag.set(false);
        assert_eq!(runtime.flush(), Some(1));

        a.set(String::from("a1"));
        assert_eq!(runtime.pending_count(), 0);
        assert_eq!(runtime.flush(), None);
        assert_eq!(runtime.tip(), 1);
    }

    #[test]
    fn dropped_stale_fragments_are_skipped() {
        let runtime = Runtime::default();
        let cell = Cell::new(0);

        let source = cell.clone();
        let fragment = runtime.track(move || source.get().to_string());
        let _container = div().child(fragment.clone()).build();

        cell.set(1);
        drop(_container);
        drop(fragment);

        // The stale set still had an entry, so a batch is appended, but it
        // carries nothing.
        assert_eq!(runtime.flush(), Some(1));
        let (_, updates) = updates_of(runtime.poll_now(&poll_request(0)));
        assert!(updates.is_empty());
    }

    #[test]
    fn unaddressed_fragments_are_rendered_but_not_sent() {
        let runtime = Runtime::default();
        let cell = Cell::new(0);

        let source = cell.clone();
        let fragment = runtime.track(move || source.get().to_string());

        cell.set(5);
        runtime.flush();
        assert!(!fragment.is_stale());

        let (state, updates) = updates_of(runtime.poll_now(&poll_request(0)));
        assert_eq!(state, 1);
        assert!(updates.is_empty());
    }

    #[test]
    fn poll_now_with_wrong_session_reloads() {
        let runtime = Runtime::default();
        let request = PollRequest {
            state: 0,
            session: Some(String::from("stale-session")),
        };
        assert!(matches!(runtime.poll_now(&request), SyncResponse::Reload { .. }));

        let request = PollRequest {
            state: 0,
            session: Some(runtime.session().to_string()),
        };
        assert!(matches!(runtime.poll_now(&request), SyncResponse::Updates(_)));
    }

    #[test]
    fn cursor_ahead_of_tip_reloads() {
        let runtime = Runtime::default();
        assert!(matches!(
            runtime.poll_now(&poll_request(3)),
            SyncResponse::Reload { .. }
        ));
    }

    #[test]
    fn mutate_runs_handler_and_flushes_inline() {
        let runtime = Runtime::default();
        let pressed = Cell::new(false);

        let source = pressed.clone();
        let label = runtime.track(move || if source.get() { "On" } else { "Off" });
        let _page = div().child(label).build();

        let target = pressed.clone();
        let callback = runtime.register_handler(move |_event| {
            target.update(|value| !value);
            Ok(())
        });

        let response = runtime
            .mutate(MutateRequest {
                id: callback.id().to_string(),
                event: Value::Null,
            })
            .expect("handler succeeds");
        assert!(matches!(response, MutateResponse::Ack { .. }));

        // No tokio runtime here, so the flush already happened.
        assert_eq!(runtime.tip(), 1);
        let (_, updates) = updates_of(runtime.poll_now(&poll_request(0)));
        assert_eq!(updates[0].html, "On");
    }

    #[test]
    fn mutate_with_unknown_id_reloads() {
        let runtime = Runtime::default();
        let response = runtime
            .mutate(MutateRequest {
                id: String::from("missing"),
                event: Value::Null,
            })
            .expect("unknown id is not an error");
        assert_eq!(
            response,
            MutateResponse::Reload {
                location: String::from("/")
            }
        );
    }

    #[test]
    fn handler_failure_propagates() {
        let runtime = Runtime::default();
        let callback = runtime.register_handler(|_| Err("boom".into()));

        let result = runtime.mutate(MutateRequest {
            id: callback.id().to_string(),
            event: Value::Null,
        });
        match result {
            Err(Error::Handler { id, source }) => {
                assert_eq!(id, callback.id());
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("expected handler error, got {:?}", other),
        }
    }

    #[test]
    fn handler_ids_are_scoped_to_the_session() {
        let first = Runtime::default();
        let second = Runtime::default();

        let callback = first.register_handler(|_| Ok(()));
        assert!(callback.id().starts_with(first.session().as_str()));

        let response = second
            .mutate(MutateRequest {
                id: callback.id().to_string(),
                event: Value::Null,
            })
            .expect("unknown id is not an error");
        assert!(matches!(response, MutateResponse::Reload { .. }));
    }

    #[test]
    fn callback_scripts() {
        let runtime = Runtime::default();
        let plain = runtime.register_handler(|_| Ok(()));
        let confirmed = runtime.register_confirmed_handler(2, |_| Ok(()));

        assert_eq!(
            plain.script(),
            format!("return mutate(\"{}\")(arguments[0])", plain.id())
        );
        assert_eq!(
            confirmed.script(),
            format!("return confirm(\"{}\", 2)(arguments[0])", confirmed.id())
        );
        assert_eq!(runtime.handler_count(), 2);
    }

    #[test]
    fn log_acknowledges() {
        let runtime = Runtime::default();
        let ack = runtime.log(LogRequest {
            log: String::from("client says hi"),
        });
        assert_eq!(ack, LogAck::success());
    }
}
