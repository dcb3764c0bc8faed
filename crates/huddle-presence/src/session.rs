//! PresenceSession: the presence engine for one signed-in user
//!
//! Wires [`GeoSource`], [`RosterStore`], [`LocationPublisher`],
//! [`ProximityMonitor`] and [`MarkerBoard`] together inside one task.
//!
//! ## Event sources
//!
//! The task multiplexes with `tokio::select!` over:
//! - the shutdown signal
//! - commands from the [`SessionHandle`]
//! - the device position watch
//! - the `user_locations` change feed
//! - the periodic roster resync
//!
//! Each event is handled to completion before the next one is polled, so
//! the components it owns need no locking.

use std::sync::Arc;

use huddle_core::{
    AlertEvent, AuthError, AuthProvider, AuthUser, BackendError, ChangeFeed, ChangeRecord, Clock,
    EventMask, Filter, FriendRecord, GeoError, LocationEvent, Notice, Notifier, PositionProvider,
    PositionReading, PositionSample, PositionWatch, PresenceConfig, Profile, Store, SystemClock,
    Table, UserId,
};
use huddle_logging::session_span;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{Instrument, debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::error::{PresenceError, PresenceResult, bounded};
use crate::friends_list::{FriendSummary, summarize};
use crate::markers::{MapPresenter, MarkerBoard, MarkerOp};
use crate::monitor::{ProximityMonitor, alert_notice};
use crate::publisher::{Cadence, LocationPublisher, PublishOutcome};
use crate::roster::{RosterChange, RosterStore};
use crate::source::{GeoSource, validated};

/// Command channel capacity
const COMMAND_BUFFER: usize = 32;

/// The collaborators a session runs against
#[derive(Clone)]
pub struct SessionDeps {
    pub auth: Arc<dyn AuthProvider>,
    pub store: Arc<dyn Store>,
    pub positions: Arc<dyn PositionProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub presenter: Arc<dyn MapPresenter>,
    pub clock: Arc<dyn Clock>,
}

impl SessionDeps {
    /// Collaborators with the system clock
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn Store>,
        positions: Arc<dyn PositionProvider>,
        notifier: Arc<dyn Notifier>,
        presenter: Arc<dyn MapPresenter>,
    ) -> Self {
        Self {
            auth,
            store,
            positions,
            notifier,
            presenter,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Read-only view of a running session, republished after every event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceSnapshot {
    /// The latest local fix
    pub local: Option<PositionSample>,
    /// The roster, in ascending friend id order
    pub friends: Vec<FriendRecord>,
    /// The most recent proximity alert
    pub last_alert: Option<AlertEvent>,
    /// How many alerts the session has raised
    pub alerts_raised: u64,
    pub cadence: Cadence,
    /// Whether the change feed is connected
    pub live: bool,
}

impl PresenceSnapshot {
    pub fn friend(&self, friend_id: &UserId) -> Option<&FriendRecord> {
        self.friends.iter().find(|record| record.id() == friend_id)
    }

    /// Friends list rows relative to the local fix
    pub fn friends_list(&self) -> Vec<FriendSummary> {
        let local = self.local.as_ref().map(|sample| sample.coordinate);
        summarize(&self.friends, local.as_ref())
    }
}

enum Command {
    SetCadence(Cadence),
    Refresh(oneshot::Sender<Result<(), BackendError>>),
    Locate(oneshot::Sender<Result<PositionSample, GeoError>>),
}

/// Handle to a running session
///
/// Dropping the handle stops the session; [`SessionHandle::shutdown`] also
/// waits for its teardown to finish.
pub struct SessionHandle {
    user: AuthUser,
    instance_id: Uuid,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<PresenceSnapshot>,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn user(&self) -> &AuthUser {
        &self.user
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// The current state of the session
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver notified whenever the snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Switch between foreground and background publish intervals
    pub async fn set_cadence(&self, cadence: Cadence) -> PresenceResult<()> {
        self.commands
            .send(Command::SetCadence(cadence))
            .await
            .map_err(|_| PresenceError::SessionClosed)
    }

    /// Reload the roster now
    pub async fn refresh(&self) -> PresenceResult<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Refresh(tx))
            .await
            .map_err(|_| PresenceError::SessionClosed)?;
        rx.await.map_err(|_| PresenceError::SessionClosed)??;
        Ok(())
    }

    /// Ask for a fix now (the "locate me" button)
    pub async fn locate(&self) -> PresenceResult<PositionSample> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Locate(tx))
            .await
            .map_err(|_| PresenceError::SessionClosed)?;
        Ok(rx.await.map_err(|_| PresenceError::SessionClosed)??)
    }

    /// Stop the session and wait for its teardown
    pub async fn shutdown(mut self) -> PresenceResult<()> {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| PresenceError::Task(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.shutdown_tx.send(());
        }
    }
}

/// The session task
pub struct PresenceSession {
    user: AuthUser,
    config: PresenceConfig,
    deps: SessionDeps,
    geo: GeoSource,
    roster: RosterStore,
    publisher: LocationPublisher,
    monitor: ProximityMonitor,
    markers: MarkerBoard,
    watch: Option<PositionWatch>,
    feed: Option<ChangeFeed>,
    local: Option<PositionSample>,
    last_alert: Option<AlertEvent>,
    alerts_raised: u64,
    commands: mpsc::Receiver<Command>,
    snapshot_tx: watch::Sender<PresenceSnapshot>,
}

impl PresenceSession {
    /// Start a session for the signed-in user
    ///
    /// Fails only when nobody is signed in or the config is invalid. Backend
    /// and device failures during startup are logged and notified, and the
    /// session starts with whatever it could get.
    #[instrument(skip_all)]
    pub async fn start(deps: SessionDeps, config: PresenceConfig) -> PresenceResult<SessionHandle> {
        config.validate()?;
        let user = deps.auth.current_user().ok_or(AuthError::NotSignedIn)?;
        let instance_id = Uuid::new_v4();
        let span = session_span(&user.id, instance_id);

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (snapshot_tx, snapshot_rx) = watch::channel(PresenceSnapshot::default());

        let mut session = Self::new(user.clone(), config, deps, command_rx, snapshot_tx);
        session.open().instrument(span.clone()).await;
        let task = tokio::spawn(session.run(shutdown_rx).instrument(span));

        Ok(SessionHandle {
            user,
            instance_id,
            commands: command_tx,
            snapshots: snapshot_rx,
            shutdown_tx,
            task: Some(task),
        })
    }

    fn new(
        user: AuthUser,
        config: PresenceConfig,
        deps: SessionDeps,
        commands: mpsc::Receiver<Command>,
        snapshot_tx: watch::Sender<PresenceSnapshot>,
    ) -> Self {
        let geo = GeoSource::new(deps.positions.clone(), config.geo.clone(), deps.clock.clone());
        let roster = RosterStore::new(deps.store.clone(), user.id.clone())
            .with_backend_timeout(config.backend_timeout());
        let publisher = LocationPublisher::new(
            deps.store.clone(),
            deps.clock.clone(),
            user.id.clone(),
            &config,
        );
        let monitor = ProximityMonitor::new(&config, deps.clock.clone());

        Self {
            user,
            config,
            deps,
            geo,
            roster,
            publisher,
            monitor,
            markers: MarkerBoard::new(),
            watch: None,
            feed: None,
            local: None,
            last_alert: None,
            alerts_raised: 0,
            commands,
            snapshot_tx,
        }
    }

    /// Mark online, subscribe, load the roster and start the watch
    async fn open(&mut self) {
        if self.config.track_online_status {
            if let Err(e) = self.set_online(true).await {
                warn!(error = %e, "Failed to mark profile online");
            }
        }

        // Subscribe before loading so no change slips between the two
        if let Err(e) = self.connect_feed().await {
            warn!(error = %e, "Failed to subscribe to location changes");
            self.notify(Notice::warning("Live location updates are unavailable"));
        }

        match self.roster.load_initial().await {
            Ok(changes) => self.apply_roster_changes(&changes),
            Err(e) => {
                warn!(error = %e, "Failed to load friends");
                self.notify(Notice::error("Failed to load friends"));
            }
        }

        match self.geo.watch() {
            Ok(watch) => self.watch = Some(watch),
            Err(e) => self.report_geo_error(&e),
        }

        info!(
            friends = self.roster.len(),
            live = self.feed.is_some(),
            "Presence session opened"
        );
        self.publish_snapshot();
    }

    async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        // Initial fix; later ones come from the watch
        let stopped = tokio::select! {
            _ = shutdown_rx.recv() => true,
            _ = self.locate() => false,
        };
        if stopped {
            info!("Presence session shut down before the first fix");
            self.close().await;
            return;
        }

        let mut resync = self.config.resync_interval().map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Presence session shutting down");
                    break;
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }
                reading = next_reading(&mut self.watch) => {
                    self.handle_reading(reading).await;
                }
                change = next_change(&mut self.feed) => {
                    self.handle_change(change).await;
                }
                _ = next_tick(&mut resync) => {
                    if let Err(e) = self.resync().await {
                        warn!(error = %e, "Periodic roster resync failed");
                    }
                }
            }
        }

        self.close().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetCadence(cadence) => {
                self.publisher.set_cadence(cadence);
                self.publish_snapshot();
            }
            Command::Refresh(reply) => {
                let result = self.resync().await;
                if let Err(e) = &result {
                    warn!(error = %e, "Roster refresh failed");
                    self.notify(Notice::error("Failed to load friends"));
                }
                let _ = reply.send(result);
            }
            Command::Locate(reply) => {
                let result = self.locate().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_reading(&mut self, reading: Option<PositionReading>) {
        match reading {
            Some(Ok(sample)) => match validated(sample) {
                Ok(sample) => {
                    self.geo.remember(&sample);
                    self.on_fix(sample).await;
                }
                Err(e) => self.report_geo_error(&e),
            },
            Some(Err(e)) => {
                self.report_geo_error(&e);
                if matches!(e, GeoError::PermissionDenied | GeoError::Unsupported) {
                    self.stop_watch();
                }
            }
            None => {
                warn!("Position watch ended");
                self.watch = None;
            }
        }
    }

    async fn handle_change(&mut self, change: Result<ChangeRecord, BackendError>) {
        match change {
            Ok(record) => match LocationEvent::from_change(&record) {
                Ok(Some(event)) => self.on_location_event(&event),
                Ok(None) => trace!(kind = %record.kind, "Location change without a usable row"),
                Err(e) => warn!(error = %e, "Undecodable location change"),
            },
            Err(e) => {
                if e == BackendError::SubscriptionClosed {
                    warn!("Location feed closed, resyncing");
                    self.feed = None;
                } else {
                    warn!(error = %e, "Location feed error, resyncing");
                }
                if let Err(e) = self.resync().await {
                    warn!(error = %e, "Resync after feed error failed");
                    self.publish_snapshot();
                }
            }
        }
    }

    /// One-shot fix, fed through the same path as watch fixes
    async fn locate(&mut self) -> Result<PositionSample, GeoError> {
        match self.geo.current_position().await {
            Ok(sample) => {
                self.on_fix(sample.clone()).await;
                Ok(sample)
            }
            Err(e) => {
                self.report_geo_error(&e);
                Err(e)
            }
        }
    }

    async fn on_fix(&mut self, sample: PositionSample) {
        for op in self.markers.place_self(sample.coordinate) {
            self.present(&op);
        }
        self.local = Some(sample.clone());

        match self.publisher.maybe_publish(&sample).await {
            PublishOutcome::Failed(_) => {
                self.notify(Notice::error("Failed to share your location"));
            }
            outcome => trace!(?outcome, "Publish outcome"),
        }

        self.evaluate();
        self.publish_snapshot();
    }

    fn on_location_event(&mut self, event: &LocationEvent) {
        let Some(change) = self.roster.apply_location_event(event) else {
            return;
        };
        debug!(friend = %change.friend_id(), kind = %event.kind, "Friend location changed");
        self.apply_roster_changes(std::slice::from_ref(&change));
        self.evaluate();
        self.publish_snapshot();
    }

    /// Reconnect the feed if needed, then reload the roster
    #[instrument(skip(self))]
    async fn resync(&mut self) -> Result<(), BackendError> {
        if self.feed.is_none() {
            self.connect_feed().await?;
            info!("Location feed reconnected");
        }

        let changes = self.roster.load_initial().await?;
        self.apply_roster_changes(&changes);
        for op in self.markers.retain_roster(self.roster.iter()) {
            self.present(&op);
        }
        if !changes.is_empty() {
            self.evaluate();
        }
        self.publish_snapshot();
        Ok(())
    }

    async fn connect_feed(&mut self) -> Result<(), BackendError> {
        let subscribe = self
            .deps
            .store
            .subscribe(Table::UserLocations, EventMask::ALL);
        let feed = bounded(self.config.backend_timeout(), subscribe).await?;
        self.feed = Some(feed);
        Ok(())
    }

    fn apply_roster_changes(&mut self, changes: &[RosterChange]) {
        for change in changes {
            if let Some(op) = self.markers.apply_change(change) {
                self.present(&op);
            }
        }
    }

    fn evaluate(&mut self) {
        let local = self.local.as_ref().map(|sample| sample.coordinate);
        if let Some(alert) = self.monitor.evaluate(local.as_ref(), self.roster.iter()) {
            self.deps.notifier.notify(alert_notice(&alert));
            self.alerts_raised += 1;
            self.last_alert = Some(alert);
        }
    }

    async fn set_online(&self, online: bool) -> Result<usize, BackendError> {
        let patch = Profile::presence_patch(online, self.deps.clock.now_utc());
        let filter = Filter::new().eq("id", &self.user.id);
        bounded(
            self.config.backend_timeout(),
            self.deps.store.update(Table::Profiles, &filter, patch),
        )
        .await
    }

    fn stop_watch(&mut self) {
        if let Some(mut watch) = self.watch.take() {
            GeoSource::cancel(&mut watch);
        }
    }

    /// Cancel the watch, tear down the feed, clear every marker, mark offline
    async fn close(&mut self) {
        self.stop_watch();
        if let Some(mut feed) = self.feed.take() {
            feed.cancel();
        }

        let left = self.roster.clear();
        self.apply_roster_changes(&left);
        if let Some(op) = self.markers.remove_self() {
            self.present(&op);
        }

        if self.config.track_online_status {
            if let Err(e) = self.set_online(false).await {
                warn!(error = %e, "Failed to mark profile offline");
            }
        }

        self.publish_snapshot();
        info!("Presence session stopped");
    }

    fn report_geo_error(&self, error: &GeoError) {
        warn!(error = %error, "Position error");
        self.notify(Notice::error(error.user_message()));
    }

    fn notify(&self, notice: Notice) {
        self.deps.notifier.notify(notice);
    }

    fn present(&self, op: &MarkerOp) {
        self.deps.presenter.apply(op);
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(PresenceSnapshot {
            local: self.local.clone(),
            friends: self.roster.all(),
            last_alert: self.last_alert.clone(),
            alerts_raised: self.alerts_raised,
            cadence: self.publisher.cadence(),
            live: self.feed.is_some(),
        });
    }
}

async fn next_reading(watch: &mut Option<PositionWatch>) -> Option<PositionReading> {
    match watch {
        Some(watch) => watch.next().await,
        None => std::future::pending().await,
    }
}

async fn next_change(feed: &mut Option<ChangeFeed>) -> Result<ChangeRecord, BackendError> {
    match feed {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
