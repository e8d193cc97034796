//! Drives fetch cycles for the gamma table and owns its [`LoadState`].
//!
//! Every cycle gets a [`RequestId`] from a monotonic counter. A result is only
//! committed if its id is still the latest one handed out; anything older is
//! dropped on arrival, whatever order the responses come back in.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::engine::types::{LoadState, RequestId, RowSequence, Symbol};
use crate::error::{fallback_message, failure_message, FetchError};
use crate::market_data::adapters::GammaProvider;
use crate::market_data::transform::RowTransformer;

/// Handle for one started cycle, consumed by [`FetchOrchestrator::resolve`].
#[derive(Debug)]
pub struct FetchTicket {
    id: RequestId,
    symbol: Symbol,
}

impl FetchTicket {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }
}

/// What happened to a resolved cycle's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Applied,
    /// A newer cycle was started before this one finished.
    Discarded,
}

/// User intents the view forwards to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    ChangeSymbol(String),
}

struct Session {
    symbol: Symbol,
    latest: RequestId,
    // symbol of the latest cycle while it is still unresolved
    in_flight: Option<Symbol>,
}

struct Inner {
    provider: Arc<dyn GammaProvider>,
    transformer: Arc<dyn RowTransformer>,
    session: Mutex<Session>,
    state: watch::Sender<LoadState>,
}

// Fails the cycle if `resolve` unwinds or is dropped before it commits.
struct CommitGuard<'a> {
    inner: &'a Inner,
    id: RequestId,
    symbol: &'a Symbol,
    armed: bool,
}

impl CommitGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut session = self.inner.session.lock();
        if session.latest != self.id {
            return;
        }
        session.in_flight = None;
        warn!(request = %self.id, symbol = %self.symbol, "fetch aborted before commit");
        metrics::counter!("gexview_fetch_failed_total").increment(1);
        self.inner
            .state
            .send_replace(LoadState::Failed { message: fallback_message(self.symbol.as_str()) });
    }
}

#[derive(Clone)]
pub struct FetchOrchestrator {
    inner: Arc<Inner>,
}

impl FetchOrchestrator {
    pub fn new(
        provider: Arc<dyn GammaProvider>,
        transformer: Arc<dyn RowTransformer>,
        symbol: Symbol,
    ) -> Self {
        let (state, _) = watch::channel(LoadState::Idle);
        Self {
            inner: Arc::new(Inner {
                provider,
                transformer,
                session: Mutex::new(Session { symbol, latest: RequestId::default(), in_flight: None }),
                state,
            }),
        }
    }

    pub fn symbol(&self) -> Symbol {
        self.inner.session.lock().symbol.clone()
    }

    pub fn state(&self) -> LoadState {
        self.inner.state.borrow().clone()
    }

    /// Receives every state transition; the current value is marked seen.
    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.inner.state.subscribe()
    }

    fn begin_locked(&self, session: &mut Session, symbol: Symbol) -> FetchTicket {
        session.latest = session.latest.next();
        session.in_flight = Some(symbol.clone());
        let ticket = FetchTicket { id: session.latest, symbol: symbol.clone() };
        self.inner.state.send_replace(LoadState::Loading { symbol });
        metrics::counter!("gexview_fetch_started_total").increment(1);
        debug!(request = %ticket.id, symbol = %ticket.symbol, "fetch started");
        ticket
    }

    /// Opens a cycle for `symbol`: state becomes `Loading` and every earlier
    /// cycle is superseded. Pair with [`resolve`](Self::resolve).
    pub fn begin(&self, symbol: Symbol) -> FetchTicket {
        let mut session = self.inner.session.lock();
        self.begin_locked(&mut session, symbol)
    }

    async fn fetch_rows(&self, symbol: &Symbol) -> Result<RowSequence, FetchError> {
        let raw = self.inner.provider.get_gamma_data(symbol).await?;
        let rows = self.inner.transformer.transform(&raw)?;
        Ok(rows)
    }

    /// Runs provider + transformer for `ticket` and commits the outcome if the
    /// ticket is still the latest one.
    #[instrument(skip(self), fields(request = %ticket.id, symbol = %ticket.symbol))]
    pub async fn resolve(&self, ticket: FetchTicket) -> Commit {
        let started = Instant::now();
        let guard = CommitGuard { inner: &self.inner, id: ticket.id, symbol: &ticket.symbol, armed: true };
        let outcome = self.fetch_rows(&ticket.symbol).await;
        guard.disarm();
        metrics::histogram!("gexview_fetch_seconds").record(started.elapsed().as_secs_f64());

        let mut session = self.inner.session.lock();
        if session.latest != ticket.id {
            debug!(latest = %session.latest, "stale result dropped");
            metrics::counter!("gexview_fetch_discarded_total").increment(1);
            return Commit::Discarded;
        }
        session.in_flight = None;

        let next = match outcome {
            Ok(rows) => {
                info!(rows = rows.len(), "gamma data loaded");
                LoadState::Ready { symbol: ticket.symbol, rows }
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch gamma data");
                metrics::counter!("gexview_fetch_failed_total").increment(1);
                LoadState::Failed { message: failure_message(&e, ticket.symbol.as_str()) }
            }
        };
        self.inner.state.send_replace(next);
        metrics::counter!("gexview_fetch_applied_total").increment(1);
        Commit::Applied
    }

    fn spawn(&self, ticket: FetchTicket) -> JoinHandle<Commit> {
        let this = self.clone();
        tokio::spawn(async move { this.resolve(ticket).await })
    }

    /// Starts a cycle for `symbol` on the current tokio runtime.
    pub fn start(&self, symbol: Symbol) -> JoinHandle<Commit> {
        let ticket = self.begin(symbol);
        self.spawn(ticket)
    }

    /// Initial load for the held symbol.
    pub fn mount(&self) -> JoinHandle<Commit> {
        self.start(self.symbol())
    }

    /// Re-fetches the held symbol. Returns `None` without doing anything while
    /// a fetch for that same symbol is still loading.
    pub fn refresh(&self) -> Option<JoinHandle<Commit>> {
        let ticket = {
            let mut session = self.inner.session.lock();
            if session.in_flight.as_ref() == Some(&session.symbol) {
                debug!(symbol = %session.symbol, "refresh ignored, fetch already in flight");
                return None;
            }
            let symbol = session.symbol.clone();
            self.begin_locked(&mut session, symbol)
        };
        Some(self.spawn(ticket))
    }

    /// Switches the held symbol and starts a cycle for it. A blank symbol
    /// leaves the held one alone, supersedes any in-flight cycle and moves
    /// straight to `Failed`.
    pub fn on_symbol_change(&self, raw: &str) -> Option<JoinHandle<Commit>> {
        let mut session = self.inner.session.lock();
        match Symbol::new(raw) {
            Ok(symbol) => {
                info!(from = %session.symbol, to = %symbol, "symbol changed");
                session.symbol = symbol.clone();
                let ticket = self.begin_locked(&mut session, symbol);
                drop(session);
                Some(self.spawn(ticket))
            }
            Err(e) => {
                warn!(error = %e, "symbol change rejected");
                session.latest = session.latest.next();
                session.in_flight = None;
                self.inner
                    .state
                    .send_replace(LoadState::Failed { message: failure_message(&e, raw) });
                None
            }
        }
    }

    pub fn dispatch(&self, command: Command) -> Option<JoinHandle<Commit>> {
        match command {
            Command::Refresh => self.refresh(),
            Command::ChangeSymbol(raw) => self.on_symbol_change(&raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::sync::oneshot;

    use crate::error::ProviderError;
    use crate::market_data::adapters::RawDataset;
    use crate::market_data::transform::DealerGammaTransformer;
    use crate::view::columns::ColumnSpec;
    use crate::view::table::cell_grid;

    type Reply = Result<RawDataset, ProviderError>;

    // Answers from `fixed`, unless a gate is armed for the symbol, in which case
    // the call parks until the test sends the reply.
    #[derive(Default)]
    struct ScriptedProvider {
        fixed: Mutex<HashMap<String, Reply>>,
        gates: Mutex<HashMap<String, oneshot::Receiver<Reply>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn reply(&self, symbol: &str, reply: Reply) {
            self.fixed.lock().insert(symbol.to_string(), reply);
        }

        fn gate(&self, symbol: &str) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(symbol.to_string(), rx);
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl GammaProvider for ScriptedProvider {
        async fn get_gamma_data(&self, symbol: &Symbol) -> Result<RawDataset, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gates.lock().remove(symbol.as_str());
            if let Some(rx) = gate {
                return rx.await.unwrap_or_else(|_| Err(ProviderError::Other("gate dropped".into())));
            }
            self.fixed
                .lock()
                .get(symbol.as_str())
                .cloned()
                .unwrap_or_else(|| Err(ProviderError::Other(String::new())))
        }
    }

    fn dataset(symbol: &str, strikes: &[(f64, f64)]) -> RawDataset {
        let levels: Vec<_> = strikes.iter().map(|(s, g)| json!({"strike": s, "gamma": g})).collect();
        RawDataset(json!({"symbol": symbol, "zeroGex": 451.2, "levels": levels}))
    }

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    fn setup(initial: &str) -> (Arc<ScriptedProvider>, FetchOrchestrator) {
        let provider = Arc::new(ScriptedProvider::default());
        let orch = FetchOrchestrator::new(provider.clone(), Arc::new(DealerGammaTransformer), sym(initial));
        (provider, orch)
    }

    fn ready_symbol(state: &LoadState) -> Option<&str> {
        match state {
            LoadState::Ready { symbol, .. } => Some(symbol.as_str()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let (_, orch) = setup("SPY");
        assert_eq!(orch.state(), LoadState::Idle);
        assert_eq!(orch.symbol(), sym("SPY"));
    }

    #[tokio::test]
    async fn test_symbol_change_loads_transformed_rows() {
        let (provider, orch) = setup("SPY");
        let raw = dataset("QQQ", &[(380.0, 0.02), (385.0, 0.01)]);
        provider.reply("QQQ", Ok(raw.clone()));

        let handle = orch.on_symbol_change("QQQ").unwrap();
        assert!(orch.state().is_loading());
        assert_eq!(handle.await.unwrap(), Commit::Applied);

        let expected = DealerGammaTransformer.transform(&raw).unwrap();
        assert_eq!(orch.state(), LoadState::Ready { symbol: sym("QQQ"), rows: expected });
        assert_eq!(orch.symbol(), sym("QQQ"));
    }

    #[tokio::test]
    async fn test_spy_scenario_two_rows_four_columns() {
        let (provider, orch) = setup("SPY");
        provider.reply("SPY", Ok(dataset("SPY", &[(450.0, 0.123456), (455.0, 0.05)])));

        orch.mount().await.unwrap();
        let state = orch.state();
        assert_eq!(ready_symbol(&state), Some("SPY"));

        let columns = ColumnSpec::default();
        let order: Vec<usize> = (0..state.rows().len()).collect();
        let grid = cell_grid(state.rows(), &columns, &order);
        assert_eq!(columns.len(), 4);
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0], vec!["SPY", "451.20", "450.00", "0.1235"]);
        assert_eq!(grid[1][2], "455.00");
    }

    #[tokio::test]
    async fn test_provider_failure_reports_message() {
        let (provider, orch) = setup("SPY");
        provider.reply("SPY", Err(ProviderError::Timeout));

        orch.mount().await.unwrap();
        let state = orch.state();
        assert!(state.error().unwrap().contains("network timeout"));
        assert!(state.rows().is_empty());
    }

    #[tokio::test]
    async fn test_blank_provider_error_uses_template() {
        let (_, orch) = setup("SPY");
        // nothing scripted: provider answers with an empty error
        orch.mount().await.unwrap();
        assert_eq!(
            orch.state().error(),
            Some("Failed to fetch gamma data for SPY. Please try again later.")
        );
    }

    #[tokio::test]
    async fn test_failure_clears_previous_rows() {
        let (provider, orch) = setup("SPY");
        provider.reply("SPY", Ok(dataset("SPY", &[(450.0, 0.1)])));
        orch.mount().await.unwrap();
        assert_eq!(orch.state().rows().len(), 1);

        provider.reply("SPY", Err(ProviderError::Network("connection reset".into())));
        orch.refresh().unwrap().await.unwrap();
        assert_eq!(orch.state(), LoadState::Failed { message: "connection reset".into() });
        assert!(orch.state().rows().is_empty());
    }

    #[tokio::test]
    async fn test_transform_failure_is_failed_state() {
        let (provider, orch) = setup("SPY");
        provider.reply("SPY", Ok(RawDataset(json!({"symbol": "SPY"}))));

        orch.mount().await.unwrap();
        assert_eq!(orch.state().error(), Some("gamma dataset is missing `zeroGex`"));
    }

    #[tokio::test]
    async fn test_late_response_for_older_request_is_discarded() {
        let (provider, orch) = setup("SPY");
        provider.reply("SPY", Ok(dataset("SPY", &[(450.0, 0.1)])));
        provider.reply("QQQ", Ok(dataset("QQQ", &[(380.0, 0.2)])));

        let a = orch.begin(sym("SPY"));
        let b = orch.begin(sym("QQQ"));
        assert!(a.id() < b.id());

        assert_eq!(orch.resolve(b).await, Commit::Applied);
        assert_eq!(orch.resolve(a).await, Commit::Discarded);
        assert_eq!(ready_symbol(&orch.state()), Some("QQQ"));
    }

    #[tokio::test]
    async fn test_early_response_for_older_request_is_discarded() {
        let (provider, orch) = setup("SPY");
        let gate_a = provider.gate("SPY");
        let gate_b = provider.gate("QQQ");

        let a = orch.start(sym("SPY"));
        let b = orch.on_symbol_change("QQQ").unwrap();

        gate_a.send(Ok(dataset("SPY", &[(450.0, 0.1)]))).unwrap();
        assert_eq!(a.await.unwrap(), Commit::Discarded);
        assert_eq!(orch.state(), LoadState::Loading { symbol: sym("QQQ") });

        gate_b.send(Ok(dataset("QQQ", &[(380.0, 0.2)]))).unwrap();
        assert_eq!(b.await.unwrap(), Commit::Applied);
        assert_eq!(ready_symbol(&orch.state()), Some("QQQ"));
    }

    #[tokio::test]
    async fn test_stale_failure_does_not_overwrite() {
        let (provider, orch) = setup("SPY");
        let gate_a = provider.gate("SPY");
        provider.reply("QQQ", Ok(dataset("QQQ", &[(380.0, 0.2)])));

        let a = orch.mount();
        orch.on_symbol_change("QQQ").unwrap().await.unwrap();

        gate_a.send(Err(ProviderError::Timeout)).unwrap();
        assert_eq!(a.await.unwrap(), Commit::Discarded);
        assert_eq!(ready_symbol(&orch.state()), Some("QQQ"));
    }

    #[tokio::test]
    async fn test_refresh_ignored_while_loading_same_symbol() {
        let (provider, orch) = setup("SPY");
        let gate = provider.gate("SPY");

        let first = orch.refresh().unwrap();
        assert!(orch.refresh().is_none());

        gate.send(Ok(dataset("SPY", &[(450.0, 0.1)]))).unwrap();
        assert_eq!(first.await.unwrap(), Commit::Applied);
        assert_eq!(provider.calls(), 1);
        assert_eq!(orch.state().rows().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_twice_matches_refresh_once() {
        let (provider, once) = setup("SPY");
        provider.reply("SPY", Ok(dataset("SPY", &[(450.0, 0.1), (455.0, 0.2)])));
        once.refresh().unwrap().await.unwrap();

        let (provider2, twice) = setup("SPY");
        provider2.reply("SPY", Ok(dataset("SPY", &[(450.0, 0.1), (455.0, 0.2)])));
        let h = twice.refresh().unwrap();
        let second = twice.refresh();
        h.await.unwrap();
        if let Some(h) = second {
            h.await.unwrap();
        }

        assert_eq!(once.state(), twice.state());
    }

    #[tokio::test]
    async fn test_refresh_retries_after_failure() {
        let (provider, orch) = setup("SPY");
        provider.reply("SPY", Err(ProviderError::Timeout));
        orch.mount().await.unwrap();
        assert!(orch.state().error().is_some());

        provider.reply("SPY", Ok(dataset("SPY", &[(450.0, 0.1)])));
        orch.dispatch(Command::Refresh).unwrap().await.unwrap();
        assert_eq!(ready_symbol(&orch.state()), Some("SPY"));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_blank_symbol_change_fails_and_supersedes() {
        let (provider, orch) = setup("SPY");
        let gate = provider.gate("SPY");
        let pending = orch.mount();

        assert!(orch.dispatch(Command::ChangeSymbol("  ".into())).is_none());
        assert_eq!(orch.state().error(), Some("invalid symbol \"  \""));
        assert_eq!(orch.symbol(), sym("SPY"));

        gate.send(Ok(dataset("SPY", &[(450.0, 0.1)]))).unwrap();
        assert_eq!(pending.await.unwrap(), Commit::Discarded);
        assert!(orch.state().error().is_some());
    }

    // Panics on its first call, answers normally afterwards.
    #[derive(Default)]
    struct PanicsOnce {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl GammaProvider for PanicsOnce {
        async fn get_gamma_data(&self, symbol: &Symbol) -> Result<RawDataset, ProviderError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("provider blew up");
            }
            Ok(dataset(symbol.as_str(), &[(450.0, 0.1)]))
        }
    }

    #[tokio::test]
    async fn test_provider_panic_fails_cycle_and_allows_refresh() {
        let orch = FetchOrchestrator::new(Arc::new(PanicsOnce::default()), Arc::new(DealerGammaTransformer), sym("SPY"));

        let err = orch.mount().await.unwrap_err();
        assert!(err.is_panic());
        assert_eq!(
            orch.state(),
            LoadState::Failed { message: "Failed to fetch gamma data for SPY. Please try again later.".into() }
        );

        let retry = orch.refresh().expect("refresh must not be blocked by the aborted cycle");
        assert_eq!(retry.await.unwrap(), Commit::Applied);
        assert_eq!(ready_symbol(&orch.state()), Some("SPY"));
    }

    #[tokio::test]
    async fn test_panic_in_superseded_cycle_leaves_state_alone() {
        let orch = FetchOrchestrator::new(Arc::new(PanicsOnce::default()), Arc::new(DealerGammaTransformer), sym("SPY"));

        let a = orch.begin(sym("SPY"));
        let b = orch.begin(sym("QQQ"));
        let o = orch.clone();
        let err = tokio::spawn(async move { o.resolve(a).await }).await.unwrap_err();
        assert!(err.is_panic());
        assert_eq!(orch.state(), LoadState::Loading { symbol: sym("QQQ") });

        assert_eq!(orch.resolve(b).await, Commit::Applied);
        assert_eq!(ready_symbol(&orch.state()), Some("QQQ"));
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let (provider, orch) = setup("SPY");
        provider.reply("SPY", Ok(dataset("SPY", &[(450.0, 0.1)])));
        let mut rx = orch.subscribe();

        let gate = provider.gate("SPY");
        let handle = orch.mount();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_loading());

        gate.send(Ok(dataset("SPY", &[(450.0, 0.1)]))).unwrap();
        handle.await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().rows().len(), 1);
    }
}
