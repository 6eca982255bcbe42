use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use position_guard_core::{
    symbol_to_inst_id, ApiCredentials, AuditRecord, EvaluationMode, PositionSnapshot,
    StrategyConfig,
};
use position_guard_okx::{FeedConnection, FeedEvent, FeedHandle, FeedKind, FeedSettings, SubscriptionArg};
use serde_json::json;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::commands::{
    AccountCommand, AccountState, AccountStatus, DispatchCounters, FeedStatus, IngestEvent,
    StartOptions,
};
use crate::deps::AccountDeps;
use crate::dispatcher::{ActionDispatcher, ActionReport, DispatchDelays};
use crate::engine::{AccountEngine, PlannedAction};
use crate::tick::{collect_samples, select_symbols, SymbolError, SymbolSample, TickReport};

const RECENT_ACTIONS: usize = 20;
const FEED_BUFFER: usize = 256;
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Results of background work, posted back to the actor.
enum Internal {
    CredentialsLoaded {
        session: u64,
        result: Result<Option<ApiCredentials>>,
    },
    StrategiesLoaded {
        session: u64,
        result: Result<Vec<StrategyConfig>>,
    },
    TickCollected {
        result: Result<TickCollected>,
        reply: oneshot::Sender<Result<TickReport>>,
    },
}

struct TickCollected {
    credentials: Arc<ApiCredentials>,
    strategies: Vec<StrategyConfig>,
    symbols: Vec<String>,
    samples: Vec<SymbolSample>,
    errors: Vec<SymbolError>,
}

/// Owns all state of one account: strategies, candle directions, debounce map,
/// feed connections. Every mutation happens on this task.
pub struct AccountActor {
    account_id: String,
    deps: AccountDeps,
    state: AccountState,
    options: StartOptions,
    /// Bumped on every start and stop so late background results are dropped.
    session: u64,
    rx: mpsc::Receiver<AccountCommand>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    feed_tx: mpsc::Sender<FeedEvent>,
    feed_rx: mpsc::Receiver<FeedEvent>,
    report_tx: mpsc::UnboundedSender<ActionReport>,
    report_rx: mpsc::UnboundedReceiver<ActionReport>,
    engine: AccountEngine,
    credentials: Option<Arc<ApiCredentials>>,
    dispatcher: Option<ActionDispatcher>,
    private_feed: Option<FeedHandle>,
    public_feed: Option<FeedHandle>,
    public_inst_ids: BTreeSet<String>,
    feed_status: FeedStatus,
    dispatch: DispatchCounters,
    recent_actions: VecDeque<ActionReport>,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    status_tx: watch::Sender<AccountStatus>,
}

impl AccountActor {
    /// Creates a new account actor in the stopped state.
    #[must_use]
    pub fn new(
        account_id: String,
        deps: AccountDeps,
        rx: mpsc::Receiver<AccountCommand>,
        status_tx: watch::Sender<AccountStatus>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (feed_tx, feed_rx) = mpsc::channel(FEED_BUFFER);
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let engine = AccountEngine::new(account_id.clone(), &deps.engine);
        Self {
            account_id,
            deps,
            state: AccountState::Stopped,
            options: StartOptions::default(),
            session: 0,
            rx,
            internal_tx,
            internal_rx,
            feed_tx,
            feed_rx,
            report_tx,
            report_rx,
            engine,
            credentials: None,
            dispatcher: None,
            private_feed: None,
            public_feed: None,
            public_inst_ids: BTreeSet::new(),
            feed_status: FeedStatus::default(),
            dispatch: DispatchCounters::default(),
            recent_actions: VecDeque::with_capacity(RECENT_ACTIONS),
            started_at: None,
            last_error: None,
            status_tx,
        }
    }

    /// Processes commands, feed events and background results until shutdown.
    ///
    /// # Errors
    /// Currently never fails; failures are recorded in the account status.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!("Account {} actor started", self.account_id);

        let period = self.deps.refresh_interval.max(MIN_REFRESH_INTERVAL);
        let mut refresh = interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                Some(msg) = self.internal_rx.recv() => self.handle_internal(msg),
                Some(event) = self.feed_rx.recv() => self.handle_feed_event(event),
                Some(report) = self.report_rx.recv() => self.handle_report(report),
                _ = refresh.tick() => {
                    if self.state == AccountState::Running {
                        self.spawn_refresh();
                    }
                }
            }
            self.publish_status();
        }

        self.teardown();
        self.state = AccountState::Stopped;
        self.publish_status();
        tracing::info!("Account {} actor stopped", self.account_id);
        Ok(())
    }

    /// Returns `false` when the actor should exit.
    fn handle_command(&mut self, cmd: AccountCommand) -> bool {
        match cmd {
            AccountCommand::Start(options) => {
                // Only start from stopped or error
                if matches!(self.state, AccountState::Running | AccountState::Starting) {
                    tracing::warn!(
                        "Account {} in invalid state for start (state: {:?}), ignoring command",
                        self.account_id,
                        self.state
                    );
                    return true;
                }
                tracing::info!("Account {} starting (feeds: {})", self.account_id, options.feeds);
                self.session += 1;
                self.options = options;
                self.state = AccountState::Starting;
                self.last_error = None;
                self.spawn_credentials_load();
            }
            AccountCommand::Stop => {
                if self.state == AccountState::Stopped {
                    tracing::warn!("Account {} already stopped, ignoring stop command", self.account_id);
                    return true;
                }
                self.teardown();
                self.state = AccountState::Stopped;
                tracing::info!("Account {} stopped", self.account_id);
            }
            AccountCommand::Refresh { symbol } => {
                if self.state != AccountState::Running {
                    tracing::warn!(
                        "Account {} not running (state: {:?}), cannot refresh",
                        self.account_id,
                        self.state
                    );
                    return true;
                }
                if let Some(symbol) = symbol {
                    match symbol_to_inst_id(&symbol) {
                        Some(inst_id) if self.options.feeds => self.ensure_public_feed(vec![inst_id]),
                        Some(_) => {}
                        None => tracing::warn!("Account {}: unsupported symbol {}", self.account_id, symbol),
                    }
                }
                self.spawn_refresh();
            }
            AccountCommand::Tick { only_symbols, reply } => self.spawn_tick(only_symbols, reply),
            AccountCommand::Ingest(event) => self.handle_ingest(event),
            AccountCommand::GetStatus(tx) => {
                let _ = tx.send(self.build_status());
            }
            AccountCommand::Shutdown => {
                tracing::info!("Account {} shutting down", self.account_id);
                return false;
            }
        }
        true
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::CredentialsLoaded { session, result } => {
                if session != self.session || self.state != AccountState::Starting {
                    tracing::debug!("Account {}: dropping stale credential result", self.account_id);
                    return;
                }
                match result {
                    Ok(Some(credentials)) => {
                        self.install_credentials(Arc::new(credentials));
                        self.state = AccountState::Running;
                        self.started_at = Some(Utc::now());
                        self.feed_status.enabled = self.options.feeds;
                        if self.options.feeds {
                            self.open_private_feed();
                        }
                        self.spawn_refresh();
                        tracing::info!("Account {} is now running", self.account_id);
                    }
                    Ok(None) => self.fail_start("no API credentials found for account".to_string()),
                    Err(e) => self.fail_start(format!("credential lookup failed: {e:#}")),
                }
            }
            Internal::StrategiesLoaded { session, result } => {
                if session != self.session || self.state != AccountState::Running {
                    tracing::debug!("Account {}: dropping stale strategy refresh", self.account_id);
                    return;
                }
                match result {
                    Ok(strategies) => {
                        tracing::info!(
                            "Account {} loaded {} strategies",
                            self.account_id,
                            strategies.len()
                        );
                        self.engine.replace_strategies(strategies, Utc::now());
                        if self.options.feeds {
                            let inst_ids = self.engine.subscribed_inst_ids();
                            self.ensure_public_feed(inst_ids);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Account {} strategy refresh failed, keeping previous mapping: {:#}",
                            self.account_id,
                            e
                        );
                    }
                }
            }
            Internal::TickCollected { result, reply } => {
                let report = result.map(|collected| self.apply_tick(collected));
                // Waiters on the status channel must see the new in-flight count.
                self.publish_status();
                let _ = reply.send(report);
            }
        }
    }

    fn handle_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Connected { kind } => {
                tracing::info!("Account {} {} feed connected", self.account_id, kind);
                self.set_connected(kind, true);
            }
            FeedEvent::Disconnected { kind, reason } => {
                tracing::warn!("Account {} {} feed disconnected: {}", self.account_id, kind, reason);
                self.set_connected(kind, false);
            }
            FeedEvent::Rejected { kind, code, message } => {
                tracing::error!(
                    account_id = %self.account_id,
                    %kind,
                    code = ?code,
                    message = ?message,
                    "Feed rejected request"
                );
                self.audit(AuditRecord::warning(
                    None,
                    format!("{kind} feed error"),
                    json!({ "accountId": self.account_id, "code": code, "msg": message }),
                ));
            }
            FeedEvent::Candle(update) => {
                if let Some(direction) = self.engine.apply_candle(&update) {
                    tracing::debug!(inst_id = %update.inst_id, ?direction, "Candle direction updated");
                }
            }
            FeedEvent::Positions(positions) => {
                if self.state != AccountState::Running {
                    return;
                }
                let evaluation = self.engine.evaluate_positions(&positions, Utc::now());
                self.dispatch(evaluation.actions);
            }
        }
    }

    fn handle_ingest(&mut self, event: IngestEvent) {
        if self.state != AccountState::Running {
            tracing::warn!(
                "Account {} not running, dropping forwarded event for {}",
                self.account_id,
                event.symbol()
            );
            return;
        }
        match event {
            IngestEvent::Direction { symbol, candle_dir } => {
                tracing::debug!(%symbol, direction = ?candle_dir, "Forwarded candle direction");
                self.engine.set_direction(symbol, candle_dir);
            }
            IngestEvent::Position {
                symbol,
                pos_side,
                size,
                upl_ratio,
            } => {
                let Some(inst_id) = symbol_to_inst_id(&symbol) else {
                    tracing::warn!("Account {}: unsupported symbol {}", self.account_id, symbol);
                    return;
                };
                let snapshot = PositionSnapshot {
                    inst_id,
                    symbol,
                    pos_side,
                    size: size.abs(),
                    upl_ratio,
                    mark_price: None,
                };
                let evaluation = self
                    .engine
                    .evaluate(&snapshot, EvaluationMode::Live, Utc::now());
                self.dispatch(evaluation.actions);
            }
        }
    }

    fn handle_report(&mut self, report: ActionReport) {
        self.dispatch.in_flight = self.dispatch.in_flight.saturating_sub(1);
        if report.succeeded() {
            self.dispatch.completed += 1;
        } else {
            self.dispatch.failed += 1;
        }
        tracing::info!(
            account_id = %self.account_id,
            strategy_id = %report.strategy_id,
            symbol = %report.symbol,
            decision = report.decision,
            ok = report.succeeded(),
            "Action finished"
        );
        if self.recent_actions.len() == RECENT_ACTIONS {
            self.recent_actions.pop_back();
        }
        self.recent_actions.push_front(report);
    }

    fn apply_tick(&mut self, collected: TickCollected) -> TickReport {
        if self.credentials.is_none() {
            self.install_credentials(collected.credentials);
        }
        let now = Utc::now();
        self.engine.replace_strategies(collected.strategies, now);

        let mut report = TickReport {
            account_id: self.account_id.clone(),
            symbols: collected.symbols,
            errors: collected.errors,
            ..TickReport::default()
        };

        for sample in collected.samples {
            if let Some(direction) = sample.direction {
                self.engine.set_direction(sample.symbol.clone(), direction);
            }
            let mode = EvaluationMode::Tick {
                last_price: sample.last_price,
            };
            for snapshot in &sample.positions {
                let evaluation = self.engine.evaluate(snapshot, mode, now);
                report.evaluations.extend(evaluation.records);
                report.dispatched += self.dispatch(evaluation.actions);
            }
        }

        if self.state != AccountState::Running {
            self.release_session_state();
        } else if self.options.feeds {
            let inst_ids = self.engine.subscribed_inst_ids();
            self.ensure_public_feed(inst_ids);
        }

        tracing::info!(
            "Account {} tick: {} symbols, {} evaluations, {} dispatched, {} errors",
            self.account_id,
            report.symbols.len(),
            report.evaluations.len(),
            report.dispatched,
            report.errors.len()
        );
        report
    }

    fn dispatch(&mut self, actions: Vec<PlannedAction>) -> usize {
        if actions.is_empty() {
            return 0;
        }
        let Some(dispatcher) = &self.dispatcher else {
            tracing::warn!(
                "Account {} has no credentials, dropping {} actions",
                self.account_id,
                actions.len()
            );
            return 0;
        };

        let mut scheduled = 0;
        for action in actions {
            tracing::info!(
                account_id = %self.account_id,
                strategy_id = %action.strategy.id,
                inst_id = %action.snapshot.inst_id,
                decision = ?action.decision,
                "Scheduling action"
            );
            if dispatcher.dispatch(action).is_some() {
                scheduled += 1;
            }
        }
        self.dispatch.in_flight += scheduled;
        scheduled
    }

    fn install_credentials(&mut self, credentials: Arc<ApiCredentials>) {
        let dispatcher = ActionDispatcher::new(
            credentials.id.clone(),
            self.deps.executor.clone(),
            self.deps.audit.clone(),
            DispatchDelays::from_config(&self.deps.engine),
        )
        .with_reports(self.report_tx.clone());
        self.dispatcher = Some(dispatcher);
        self.credentials = Some(credentials);
    }

    fn fail_start(&mut self, reason: String) {
        tracing::error!("Failed to start account {}: {}", self.account_id, reason);
        self.state = AccountState::Error;
        self.audit(AuditRecord::error(
            None,
            format!("Account {} not started: {reason}", self.account_id),
            json!({ "accountId": self.account_id }),
        ));
        self.last_error = Some(reason);
    }

    fn open_private_feed(&mut self) {
        if self.private_feed.as_ref().is_some_and(FeedHandle::is_alive) {
            tracing::debug!("Account {} private feed already open", self.account_id);
            return;
        }
        let Some(credentials) = self.credentials.clone() else {
            return;
        };
        self.private_feed = Some(FeedConnection::spawn_private(
            FeedSettings::private(&self.deps.okx),
            credentials,
            self.feed_tx.clone(),
        ));
    }

    /// Subscribes candle channels for instruments not yet subscribed. Opens
    /// the public feed on first use and never with an empty set.
    fn ensure_public_feed(&mut self, inst_ids: Vec<String>) {
        let fresh: Vec<String> = inst_ids
            .into_iter()
            .filter(|inst_id| !self.public_inst_ids.contains(inst_id))
            .collect();
        let alive = self.public_feed.as_ref().is_some_and(FeedHandle::is_alive);

        if alive {
            if fresh.is_empty() {
                return;
            }
            if let Some(feed) = &self.public_feed {
                let channel = self.deps.okx.candle_channel();
                feed.subscribe(
                    fresh
                        .iter()
                        .map(|inst_id| SubscriptionArg::candle(&channel, inst_id))
                        .collect(),
                );
            }
            self.public_inst_ids.extend(fresh);
        } else {
            self.public_inst_ids.extend(fresh);
            if self.public_inst_ids.is_empty() {
                return;
            }
            let all: Vec<String> = self.public_inst_ids.iter().cloned().collect();
            tracing::info!(
                "Account {} opening public feed for {} instruments",
                self.account_id,
                all.len()
            );
            self.public_feed = Some(FeedConnection::spawn_public(
                FeedSettings::public(&self.deps.okx),
                &all,
                self.feed_tx.clone(),
            ));
        }
        self.feed_status.public_subscriptions = self.public_inst_ids.len();
    }

    fn set_connected(&mut self, kind: FeedKind, connected: bool) {
        match kind {
            FeedKind::Private => self.feed_status.private_connected = connected,
            FeedKind::Public => self.feed_status.public_connected = connected,
        }
    }

    fn spawn_credentials_load(&self) {
        let source = self.deps.credentials.clone();
        let tx = self.internal_tx.clone();
        let account_id = self.account_id.clone();
        let session = self.session;
        tokio::spawn(async move {
            let result = source.load_credentials(&account_id).await;
            let _ = tx.send(Internal::CredentialsLoaded { session, result });
        });
    }

    fn spawn_refresh(&self) {
        let source = self.deps.strategies.clone();
        let tx = self.internal_tx.clone();
        let account_id = self.account_id.clone();
        let session = self.session;
        tokio::spawn(async move {
            let result = source.load_strategies(&account_id).await;
            let _ = tx.send(Internal::StrategiesLoaded { session, result });
        });
    }

    fn spawn_tick(
        &self,
        only_symbols: Option<Vec<String>>,
        reply: oneshot::Sender<Result<TickReport>>,
    ) {
        let deps = self.deps.clone();
        let tx = self.internal_tx.clone();
        let account_id = self.account_id.clone();
        let cached = self.credentials.clone();
        tokio::spawn(async move {
            let result = collect_tick(&deps, &account_id, cached, only_symbols).await;
            let _ = tx.send(Internal::TickCollected { result, reply });
        });
    }

    fn audit(&self, record: AuditRecord) {
        let sink = self.deps.audit.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.record(record).await {
                tracing::warn!("Audit write failed: {:#}", e);
            }
        });
    }

    /// Drops feeds and per-session state. In-flight actions keep running.
    fn teardown(&mut self) {
        self.session += 1;
        if let Some(feed) = self.private_feed.take() {
            feed.shutdown();
        }
        if let Some(feed) = self.public_feed.take() {
            feed.shutdown();
        }
        self.public_inst_ids.clear();
        self.feed_status = FeedStatus::default();
        self.release_session_state();
        self.started_at = None;
    }

    /// Drops strategies, credentials and the dispatcher. Actions already
    /// dispatched keep running and still report back.
    fn release_session_state(&mut self) {
        self.engine.reset();
        self.credentials = None;
        self.dispatcher = None;
    }

    fn build_status(&self) -> AccountStatus {
        let registry = self.engine.registry();
        AccountStatus {
            account_id: self.account_id.clone(),
            state: self.state,
            started_at: self.started_at,
            last_refresh: registry.refreshed_at(),
            credentials_loaded: self.credentials.is_some(),
            feeds: self.feed_status,
            strategies: registry.strategy_count(),
            symbols: registry.symbols(),
            directions: self.engine.market().snapshot(),
            debounce_entries: self.engine.debounce_entries(),
            dispatch: self.dispatch.clone(),
            recent_actions: self.recent_actions.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.build_status());
    }
}

async fn collect_tick(
    deps: &AccountDeps,
    account_id: &str,
    cached: Option<Arc<ApiCredentials>>,
    only_symbols: Option<Vec<String>>,
) -> Result<TickCollected> {
    let credentials = match cached {
        Some(credentials) => credentials,
        None => Arc::new(
            deps.credentials
                .load_credentials(account_id)
                .await
                .context("Failed to load credentials")?
                .ok_or_else(|| anyhow!("no API credentials found for account {account_id}"))?,
        ),
    };

    let strategies = deps
        .strategies
        .load_strategies(account_id)
        .await
        .context("Failed to load strategies")?;

    let running: BTreeSet<String> = strategies
        .iter()
        .filter(|strategy| strategy.is_running())
        .map(|strategy| strategy.symbol.clone())
        .collect();
    let running: Vec<String> = running.into_iter().collect();
    let symbols = select_symbols(&running, only_symbols.as_deref());

    let (samples, errors) = collect_samples(deps.market.as_ref(), &credentials, &symbols).await;

    Ok(TickCollected {
        credentials,
        strategies,
        symbols,
        samples,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{strategy, RecordingExecutor, RecordingSink, StaticMarket, StaticStore};
    use position_guard_core::{
        AuditLevel, CandleDirection, Decision, EngineConfig, OkxConfig, PosSide, TradeRequest,
    };
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Harness {
        tx: mpsc::Sender<AccountCommand>,
        status_rx: watch::Receiver<AccountStatus>,
        executor: Arc<RecordingExecutor>,
        sink: Arc<RecordingSink>,
        store: Arc<StaticStore>,
    }

    impl Harness {
        fn spawn(store: StaticStore, market: StaticMarket) -> Self {
            Self::spawn_with_refresh(store, market, Duration::from_secs(60))
        }

        fn spawn_with_refresh(
            store: StaticStore,
            market: StaticMarket,
            refresh_interval: Duration,
        ) -> Self {
            let store = Arc::new(store);
            let executor = Arc::new(RecordingExecutor::default());
            let sink = Arc::new(RecordingSink::default());
            let deps = AccountDeps {
                credentials: store.clone(),
                strategies: store.clone(),
                audit: sink.clone(),
                executor: executor.clone(),
                market: Arc::new(market),
                okx: OkxConfig::default(),
                engine: EngineConfig::default(),
                refresh_interval,
            };
            let (tx, rx) = mpsc::channel(32);
            let (status_tx, status_rx) = watch::channel(AccountStatus::new("acc-1"));
            let actor = AccountActor::new("acc-1".to_string(), deps, rx, status_tx);
            tokio::spawn(actor.run());
            Self {
                tx,
                status_rx,
                executor,
                sink,
                store,
            }
        }

        async fn send(&self, cmd: AccountCommand) {
            self.tx.send(cmd).await.unwrap();
        }

        async fn status(&self) -> AccountStatus {
            let (tx, rx) = oneshot::channel();
            self.send(AccountCommand::GetStatus(tx)).await;
            rx.await.unwrap()
        }

        async fn wait_for(&mut self, check: impl Fn(&AccountStatus) -> bool) -> AccountStatus {
            loop {
                {
                    let status = self.status_rx.borrow_and_update();
                    if check(&*status) {
                        return status.clone();
                    }
                }
                self.status_rx.changed().await.unwrap();
            }
        }

        async fn start_without_feeds(&mut self) -> AccountStatus {
            self.send(AccountCommand::Start(StartOptions { feeds: false }))
                .await;
            self.wait_for(|s| s.state == AccountState::Running && s.last_refresh.is_some())
                .await
        }

        async fn tick(&self, only_symbols: Option<Vec<String>>) -> Result<TickReport> {
            let (reply, rx) = oneshot::channel();
            self.send(AccountCommand::Tick { only_symbols, reply }).await;
            rx.await.unwrap()
        }
    }

    fn btc_position(upl_ratio: f64) -> IngestEvent {
        IngestEvent::Position {
            symbol: "BTC/USDT:USDT".to_string(),
            pos_side: PosSide::Long,
            size: dec!(2),
            upl_ratio,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credentials_put_account_in_error() {
        let mut harness = Harness::spawn(StaticStore::default(), StaticMarket::default());
        harness
            .send(AccountCommand::Start(StartOptions { feeds: true }))
            .await;

        let status = harness.wait_for(|s| s.state == AccountState::Error).await;
        assert!(!status.credentials_loaded);
        assert!(status.last_error.unwrap().contains("no API credentials"));
        assert!(!status.feeds.enabled);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let records = harness.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, AuditLevel::Error);
        assert_eq!(records[0].strategy_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn forwarded_take_profit_closes_and_reenters() {
        let store = StaticStore::with_account("acc-1", vec![strategy("s1", "BTC/USDT:USDT")]);
        let mut harness = Harness::spawn(store, StaticMarket::default());
        let status = harness.start_without_feeds().await;
        assert_eq!(status.strategies, 1);

        harness
            .send(AccountCommand::Ingest(IngestEvent::Direction {
                symbol: "BTC/USDT:USDT".to_string(),
                candle_dir: CandleDirection::Up,
            }))
            .await;
        harness.send(AccountCommand::Ingest(btc_position(0.06))).await;
        // Second update inside the debounce window is suppressed.
        harness.send(AccountCommand::Ingest(btc_position(0.07))).await;

        let status = harness
            .wait_for(|s| s.dispatch.completed == 1 && s.dispatch.in_flight == 0)
            .await;
        assert_eq!(status.recent_actions[0].decision, "take_profit");

        let calls = harness.executor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1.action(), "closePosition");
        let TradeRequest::PlaceOrder(reentry) = &calls[1].1 else {
            panic!("expected re-entry order");
        };
        assert_eq!(reentry.side, position_guard_core::Side::Buy);
        assert_eq!(reentry.credential_id, "acc-1");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_registry_never_dispatches() {
        let store = StaticStore::with_account("acc-1", Vec::new());
        let mut harness = Harness::spawn(store, StaticMarket::default());
        let status = harness.start_without_feeds().await;
        assert_eq!(status.strategies, 0);
        assert_eq!(status.feeds.public_subscriptions, 0);

        harness.send(AccountCommand::Ingest(btc_position(0.5))).await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(harness.executor.calls().is_empty());
        assert_eq!(harness.status().await.dispatch.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_dropped_while_stopped() {
        let store = StaticStore::with_account("acc-1", vec![strategy("s1", "BTC/USDT:USDT")]);
        let mut harness = Harness::spawn(store, StaticMarket::default());
        harness.start_without_feeds().await;

        harness.send(AccountCommand::Stop).await;
        harness.send(AccountCommand::Ingest(btc_position(0.2))).await;
        let status = harness.status().await;

        assert_eq!(status.state, AccountState::Stopped);
        assert_eq!(status.strategies, 0);
        assert!(!status.credentials_loaded);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(harness.executor.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_replaces_strategies() {
        let store = StaticStore::with_account("acc-1", vec![strategy("s1", "BTC/USDT:USDT")]);
        let mut harness = Harness::spawn(store, StaticMarket::default());
        harness.start_without_feeds().await;

        harness.store.set_strategies(
            "acc-1",
            vec![
                strategy("s1", "BTC/USDT:USDT"),
                strategy("s2", "ETH/USDT:USDT"),
            ],
        );
        harness
            .send(AccountCommand::Refresh { symbol: None })
            .await;

        let status = harness.wait_for(|s| s.strategies == 2).await;
        assert_eq!(
            status.symbols,
            vec!["BTC/USDT:USDT".to_string(), "ETH/USDT:USDT".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tick_bootstraps_flat_symbol_and_respects_range() {
        let mut in_range = strategy("s1", "BTC/USDT:USDT");
        in_range.entry_size = Some(dec!(1));
        in_range.range_low = Some(dec!(60000));
        in_range.range_high = Some(dec!(70000));
        let mut out_of_range = strategy("s2", "ETH/USDT:USDT");
        out_of_range.entry_size = Some(dec!(5));
        out_of_range.range_high = Some(dec!(3000));
        let store = StaticStore::with_account("acc-1", vec![in_range, out_of_range]);

        let mut market = StaticMarket::default();
        market
            .directions
            .insert("BTC-USDT-SWAP".to_string(), CandleDirection::Down);
        market.prices.insert("BTC-USDT-SWAP".to_string(), dec!(65000));
        market.prices.insert("ETH-USDT-SWAP".to_string(), dec!(3500));

        let mut harness = Harness::spawn(store, market);
        let report = harness.tick(None).await.unwrap();

        assert_eq!(report.symbols.len(), 2);
        assert_eq!(report.dispatched, 1);
        let decisions: Vec<&Decision> = report.evaluations.iter().map(|e| &e.decision).collect();
        assert!(decisions.contains(&&Decision::OpenInitial {
            side: position_guard_core::Side::Sell,
            size: dec!(1),
        }));
        assert!(decisions.contains(&&Decision::hold(
            position_guard_core::HoldReason::OutOfRange
        )));

        let status = harness
            .wait_for(|s| s.dispatch.completed == 1 && s.dispatch.in_flight == 0)
            .await;
        assert_eq!(status.state, AccountState::Stopped);
        assert!(!status.credentials_loaded);
        assert_eq!(status.strategies, 0);
        assert_eq!(harness.executor.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_refresh_interval_is_clamped() {
        let store = StaticStore::with_account("acc-1", vec![strategy("s1", "BTC/USDT:USDT")]);
        let mut harness =
            Harness::spawn_with_refresh(store, StaticMarket::default(), Duration::ZERO);
        harness.start_without_feeds().await;

        harness.store.set_strategies(
            "acc-1",
            vec![
                strategy("s1", "BTC/USDT:USDT"),
                strategy("s2", "ETH/USDT:USDT"),
            ],
        );
        tokio::time::sleep(MIN_REFRESH_INTERVAL * 2).await;

        let status = harness.wait_for(|s| s.strategies == 2).await;
        assert_eq!(status.state, AccountState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_on_running_account_keeps_session() {
        let store = StaticStore::with_account("acc-1", vec![strategy("s1", "BTC/USDT:USDT")]);
        let mut harness = Harness::spawn(store, StaticMarket::default());
        harness.start_without_feeds().await;

        harness.tick(None).await.unwrap();
        let status = harness.status().await;

        assert_eq!(status.state, AccountState::Running);
        assert!(status.credentials_loaded);
        assert_eq!(status.strategies, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_filter_limits_symbols() {
        let store = StaticStore::with_account(
            "acc-1",
            vec![
                strategy("s1", "BTC/USDT:USDT"),
                strategy("s2", "ETH/USDT:USDT"),
            ],
        );
        let harness = Harness::spawn(store, StaticMarket::default());

        let report = harness
            .tick(Some(vec!["ETH-USDT-SWAP".to_string()]))
            .await
            .unwrap();
        assert_eq!(report.symbols, vec!["ETH/USDT:USDT".to_string()]);
        assert_eq!(report.evaluations.len(), 1);
        assert_eq!(report.dispatched, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_without_credentials_fails() {
        let harness = Harness::spawn(StaticStore::default(), StaticMarket::default());
        let err = harness.tick(None).await.unwrap_err();
        assert!(err.to_string().contains("no API credentials"));
    }
}
