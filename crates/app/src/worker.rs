//! Device worker: the autonomous task driving one device.
//!
//! A worker owns its client, its state machine and its session. It runs
//! one of two loops, picked at start:
//!
//! - **connected mode**: connect with retry and backoff, then run poll
//!   cycles every poll period and forward pushes as they arrive. While the
//!   device is unreachable, each due tick runs an advertisement pass
//!   instead.
//! - **advertisement-only mode**: for devices without characteristic
//!   items. One scan pass per poll period, no connection ever attempted.
//!
//! Gateway requests (read, write, service map) reach the worker through a
//! bounded queue and are served between I/O operations, so no two
//! operations are ever in flight on the same client. Stop requests are
//! observed at the top of every loop iteration and during every wait.

use std::sync::Arc;
use std::time::Duration;

use blegate_domain::device::DeviceProfile;
use blegate_domain::item::CharacteristicItem;
use blegate_domain::state::ConnectionState;
use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use uuid::Uuid;

use crate::advertisement::{AdvertisementEngine, ScanOutcome};
use crate::connection::ConnectionStateMachine;
use crate::envelope::{AcquisitionEnvelope, Payload, SourceConfig};
use crate::error::{BleError, RequestError, SetupError};
use crate::notification::NotificationRegistry;
use crate::ports::{BleClient, ConverterRegistry, Dispatcher, Notification, Scanner};
use crate::retry::RetryPolicy;
use crate::scheduler::{POLL_QUANTUM, PollScheduler, Tick};
use crate::service_map;
use crate::session::Session;

/// Default bound on the round trip of a gateway request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default capacity of a worker's request queue.
pub const DEFAULT_REQUEST_QUEUE: usize = 16;

/// Roughly 30 years, the horizon used for waits that never elapse.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Runtime knobs of a worker that do not come from device configuration.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub request_timeout: Duration,
    pub request_queue: usize,
    /// Delay before the worker starts its loop.
    pub start_delay: Duration,
    /// Shared cap on concurrent connect attempts.
    pub connect_permits: Option<Arc<Semaphore>>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            request_queue: DEFAULT_REQUEST_QUEUE,
            start_delay: Duration::ZERO,
            connect_permits: None,
        }
    }
}

#[derive(Debug)]
enum Request {
    Read {
        uuid: Uuid,
        reply: oneshot::Sender<Result<Vec<u8>, RequestError>>,
    },
    Write {
        uuid: Uuid,
        value: Vec<u8>,
        with_response: bool,
        reply: oneshot::Sender<Result<(), RequestError>>,
    },
    ServiceMap {
        reply: oneshot::Sender<Result<String, RequestError>>,
    },
}

impl Request {
    fn reject(self, err: RequestError) {
        // The caller may have given up already.
        let _ = match self {
            Self::Read { reply, .. } => reply.send(Err(err)).map_err(drop),
            Self::Write { reply, .. } => reply.send(Err(err)).map_err(drop),
            Self::ServiceMap { reply } => reply.send(Err(err)).map_err(drop),
        };
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Handle to a running worker. Cheap to clone.
///
/// Dropping every handle stops the worker.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    name: Arc<str>,
    requests: mpsc::Sender<Request>,
    stop: Arc<watch::Sender<bool>>,
    state: watch::Receiver<ConnectionState>,
    request_timeout: Duration,
}

impl DeviceHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Ask the worker to stop at its next safe point. Does not wait.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Wait until the worker has stopped.
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // An error means the worker is gone, which is just as final.
        let _ = state.wait_for(|state| state.is_stopped()).await;
    }

    /// Read a characteristic through the worker.
    ///
    /// # Errors
    ///
    /// [`RequestError::NotConnected`] outside a session,
    /// [`RequestError::Stopped`] once the worker stops,
    /// [`RequestError::TimedOut`] past the request timeout, or the BLE
    /// error of the read.
    pub async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>, RequestError> {
        let (reply, response) = oneshot::channel();
        self.call(Request::Read { uuid, reply }, response).await
    }

    /// Write a characteristic through the worker.
    ///
    /// # Errors
    ///
    /// Same as [`read_characteristic`](Self::read_characteristic).
    pub async fn write_characteristic(
        &self,
        uuid: Uuid,
        value: impl Into<Vec<u8>>,
        with_response: bool,
    ) -> Result<(), RequestError> {
        let (reply, response) = oneshot::channel();
        let request = Request::Write {
            uuid,
            value: value.into(),
            with_response,
            reply,
        };
        self.call(request, response).await
    }

    /// Render the GATT tree of the connected device.
    ///
    /// # Errors
    ///
    /// Fails only when the request cannot be served; per-item read errors
    /// are embedded in the map.
    pub async fn dump_service_map(&self) -> Result<String, RequestError> {
        let (reply, response) = oneshot::channel();
        self.call(Request::ServiceMap { reply }, response).await
    }

    async fn call<T>(
        &self,
        request: Request,
        response: oneshot::Receiver<Result<T, RequestError>>,
    ) -> Result<T, RequestError> {
        if *self.stop.borrow() {
            return Err(RequestError::Stopped);
        }
        let exchange = async {
            if self.requests.send(request).await.is_err() {
                return Err(RequestError::Stopped);
            }
            match response.await {
                Ok(result) => result,
                Err(_) => Err(RequestError::Stopped),
            }
        };
        tokio::time::timeout(self.request_timeout, exchange)
            .await
            .unwrap_or(Err(RequestError::TimedOut(self.request_timeout)))
    }
}

/// The task driving one device.
pub struct DeviceWorker<C, S, D> {
    profile: DeviceProfile,
    /// Working copy of the characteristic items, carrying session handles.
    items: Vec<CharacteristicItem>,
    client: C,
    scanner: S,
    dispatcher: D,
    characteristic_source: Arc<SourceConfig>,
    advertisement: AdvertisementEngine,
    machine: ConnectionStateMachine,
    scheduler: PollScheduler,
    session: Option<Session>,
    requests: mpsc::Receiver<Request>,
    stop: watch::Receiver<bool>,
    options: WorkerOptions,
    map_shown: bool,
}

impl<C, S, D> DeviceWorker<C, S, D>
where
    C: BleClient,
    S: Scanner,
    D: Dispatcher,
{
    /// Build a worker and its handle. Nothing runs until
    /// [`run`](Self::run) is polled.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::ConverterNotFound`] when either converter of
    /// the device is not registered.
    pub fn new(
        profile: DeviceProfile,
        converters: &ConverterRegistry,
        client: C,
        scanner: S,
        dispatcher: D,
        options: WorkerOptions,
    ) -> Result<(Self, DeviceHandle), SetupError> {
        let resolve = |name: &str| {
            converters
                .resolve(name)
                .ok_or_else(|| SetupError::ConverterNotFound {
                    name: name.to_owned(),
                })
        };
        let characteristic_source = Arc::new(SourceConfig::characteristic(
            &profile,
            resolve(&profile.characteristic_extension)?,
        ));
        let advertisement_source = Arc::new(SourceConfig::advertisement(
            &profile,
            resolve(&profile.advertisement_extension)?,
        ));

        let advertisement = AdvertisementEngine::new(
            profile.address,
            profile.timing.timeout,
            advertisement_source,
        );
        let (machine, state) = ConnectionStateMachine::new(
            profile.name.clone(),
            RetryPolicy::from_timing(&profile.timing),
        );
        let (request_tx, requests) = mpsc::channel(options.request_queue.max(1));
        let (stop_tx, stop) = watch::channel(false);

        let handle = DeviceHandle {
            name: Arc::from(profile.name.as_str()),
            requests: request_tx,
            stop: Arc::new(stop_tx),
            state,
            request_timeout: options.request_timeout,
        };
        let worker = Self {
            items: profile.characteristic_items.clone(),
            scheduler: PollScheduler::new(profile.timing.poll_period),
            profile,
            client,
            scanner,
            dispatcher,
            characteristic_source,
            advertisement,
            machine,
            session: None,
            requests,
            stop,
            options,
            map_shown: false,
        };
        Ok((worker, handle))
    }

    /// Run until stopped.
    #[tracing::instrument(name = "device_worker", skip_all, fields(device = %self.profile.name))]
    pub async fn run(mut self) {
        let start_delay = self.options.start_delay;
        let started = start_delay.is_zero()
            || matches!(
                self.wait_until(deadline_after(start_delay)).await,
                Flow::Continue
            );

        if started {
            if self.profile.is_advertisement_only() {
                tracing::info!(mode = "advertisement", "worker started");
                self.run_advertisement_only().await;
            } else {
                tracing::info!(mode = "connected", "worker started");
                self.run_connected().await;
            }
        }

        self.shutdown().await;
    }

    async fn run_advertisement_only(&mut self) {
        loop {
            if self.stop_requested() {
                return;
            }
            let now = Instant::now();
            match self.scheduler.tick(now) {
                Tick::Due => {
                    self.scheduler.mark_polled(now);
                    self.advertisement_pass(Duration::MAX).await;
                }
                Tick::Wait(wait) => {
                    if matches!(self.wait_until(now + wait).await, Flow::Stop) {
                        return;
                    }
                }
            }
        }
    }

    async fn run_connected(&mut self) {
        loop {
            if self.stop_requested() {
                return;
            }
            let flow = match self.machine.state() {
                ConnectionState::Connected => self.connected_tick().await,
                ConnectionState::Stopped => return,
                ConnectionState::Disconnected
                | ConnectionState::Connecting
                | ConnectionState::ReconnectBackoff => self.connect().await,
            };
            if matches!(flow, Flow::Stop) {
                return;
            }
        }
    }

    async fn connect(&mut self) -> Flow {
        self.machine.begin_connect();

        let result = {
            let _permit = match &self.options.connect_permits {
                Some(permits) => Arc::clone(permits).acquire_owned().await.ok(),
                None => None,
            };
            self.client.connect(self.profile.timing.timeout).await
        };

        match result {
            Ok(()) => {
                self.machine.connected();
                self.session = Some(Session::new());
                tracing::info!("connected");
                if self.profile.show_map && !self.map_shown {
                    self.map_shown = true;
                    let map = service_map::render(&self.client, &self.profile.name).await;
                    tracing::info!("{map}");
                }
                Flow::Continue
            }
            Err(err) => {
                let delay = self.machine.connect_failed();
                tracing::error!(
                    attempt = self.machine.failures(),
                    %err,
                    retry_in = ?delay,
                    "connect failed"
                );
                self.back_off(delay).await
            }
        }
    }

    /// Wait out a reconnect delay, running the advertisement path on every
    /// tick the scheduler finds due. Scans are cut short at the deadline so
    /// the retry pacing holds. The wait never drops below one scheduler
    /// quantum.
    async fn back_off(&mut self, delay: Duration) -> Flow {
        let deadline = Instant::now() + delay.max(POLL_QUANTUM);
        loop {
            if self.stop_requested() {
                return Flow::Stop;
            }
            let now = Instant::now();
            if now >= deadline {
                return Flow::Continue;
            }
            if self.scheduler.tick(now) == Tick::Due {
                self.scheduler.mark_polled(now);
                self.advertisement_pass(deadline - now).await;
                continue;
            }
            if matches!(
                self.wait_until(deadline.min(now + POLL_QUANTUM)).await,
                Flow::Stop
            ) {
                return Flow::Stop;
            }
        }
    }

    async fn connected_tick(&mut self) -> Flow {
        let now = Instant::now();
        match self.scheduler.tick(now) {
            Tick::Wait(wait) => self.wait_until(now + wait).await,
            Tick::Due => {
                self.scheduler.mark_polled(now);
                if self.client.is_connected().await {
                    self.poll_cycle().await;
                } else {
                    self.drop_session(&BleError::NotConnected).await;
                    self.advertisement_pass(Duration::MAX).await;
                }
                Flow::Continue
            }
        }
    }

    async fn poll_cycle(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session
            .poll(&self.client, &self.profile.name, &mut self.items)
            .await
        {
            Ok(data) if data.is_empty() => tracing::trace!("poll cycle collected nothing"),
            Ok(data) => {
                tracing::debug!(items = data.len(), "poll cycle complete");
                self.dispatch(
                    Arc::clone(&self.characteristic_source),
                    Payload::Characteristics(data),
                );
            }
            Err(err) => self.drop_session(&err).await,
        }
    }

    async fn advertisement_pass(&mut self, budget: Duration) {
        if let ScanOutcome::Payload(data) = self
            .advertisement
            .pass_within(&self.scanner, &self.profile.name, budget)
            .await
        {
            self.dispatch(self.advertisement.source(), Payload::Advertisement(data));
        }
    }

    /// Sleep until `deadline` while serving requests and pushes.
    async fn wait_until(&mut self, deadline: Instant) -> Flow {
        loop {
            if self.stop_requested() {
                return Flow::Stop;
            }
            tokio::select! {
                () = sleep_until(deadline) => return Flow::Continue,
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        return Flow::Stop;
                    }
                }
                Some(request) = self.requests.recv() => {
                    if !self.handle_request(request).await {
                        return Flow::Continue;
                    }
                }
                Some(push) = next_push(self.session.as_mut()) => self.on_push(&push),
            }
        }
    }

    /// Serve one request. Returns `false` if it cost the session.
    async fn handle_request(&mut self, request: Request) -> bool {
        if self.session.is_none() || self.machine.state() != ConnectionState::Connected {
            request.reject(RequestError::NotConnected);
            return true;
        }
        match request {
            Request::Read { uuid, reply } => {
                let result = self.client.read_characteristic(uuid).await;
                self.reply(reply, result).await
            }
            Request::Write {
                uuid,
                value,
                with_response,
                reply,
            } => {
                let result = self
                    .client
                    .write_characteristic(uuid, &value, with_response)
                    .await;
                self.reply(reply, result).await
            }
            Request::ServiceMap { reply } => {
                let map = service_map::render(&self.client, &self.profile.name).await;
                let _ = reply.send(Ok(map));
                true
            }
        }
    }

    async fn reply<T: Send>(
        &mut self,
        reply: oneshot::Sender<Result<T, RequestError>>,
        result: Result<T, BleError>,
    ) -> bool {
        match result {
            Ok(value) => {
                let _ = reply.send(Ok(value));
                true
            }
            Err(err) => {
                let alive = err.is_transient();
                if !alive {
                    self.drop_session(&err).await;
                }
                let _ = reply.send(Err(err.into()));
                alive
            }
        }
    }

    fn on_push(&self, push: &Notification) {
        match NotificationRegistry::route(&self.items, push) {
            Some(data) => self.dispatch(
                Arc::clone(&self.characteristic_source),
                Payload::Characteristics(data),
            ),
            None => tracing::debug!(handle = push.handle, "push for unconfigured handle"),
        }
    }

    fn dispatch(&self, source: Arc<SourceConfig>, payload: Payload) {
        let envelope = AcquisitionEnvelope::new(
            self.profile.name.clone(),
            self.profile.device_type.clone(),
            source,
            payload,
        );
        if let Err(err) = self.dispatcher.dispatch(envelope) {
            tracing::warn!(%err, "dispatch failed");
        }
    }

    /// Tear the session down after link loss.
    async fn drop_session(&mut self, err: &BleError) {
        tracing::error!(%err, "link lost");
        self.session = None;
        for item in &mut self.items {
            item.invalidate_handle();
        }
        if let Err(err) = self.client.disconnect().await {
            tracing::debug!(%err, "disconnect after link loss failed");
        }
        self.machine.link_lost();
    }

    async fn shutdown(&mut self) {
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            request.reject(RequestError::Stopped);
        }
        if self.session.take().is_some()
            && let Err(err) = self.client.disconnect().await
        {
            tracing::warn!(%err, "disconnect on stop failed");
        }
        self.machine.stop();
        tracing::info!("worker stopped");
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }
}

/// `delay` from now, clamped to a far-future instant when it does not fit.
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

async fn next_push(session: Option<&mut Session>) -> Option<Notification> {
    match session {
        Some(session) => session.next_push().await,
        None => std::future::pending().await,
    }
}
