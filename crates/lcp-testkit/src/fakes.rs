//! Fake collaborators for service tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use lcp::{AuthenticationReason, Authenticating, Clock, ResourceContainer};
use lcp_core::{LicenseDocument, StatusDocument};
use lcp_protocol::{DeviceInfo, ProtocolClient, ProtocolError, TransportError};

/// A status-protocol operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchStatus,
    FetchLicense,
    Register,
    Renew,
    Return,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Self::FetchStatus => "status",
            Self::FetchLicense => "license",
            Self::Register => "register",
            Self::Renew => "renew",
            Self::Return => "return",
        }
    }
}

#[derive(Default)]
struct Server {
    statuses: HashMap<String, StatusDocument>,
    transitions: HashMap<(String, Operation), StatusDocument>,
    licenses: HashMap<String, LicenseDocument>,
    failures: HashMap<(String, Operation), ProtocolError>,
    offline: bool,
    calls: Vec<(Operation, String)>,
}

/// An in-process status server.
///
/// Holds the current status of each license. A mutation answers with the
/// status scripted for it with [`FakeProtocol::on`] and makes it current;
/// an unscripted register answers with the current status, like a server
/// seeing a device twice.
///
/// Tracks how many mutations run at the same time.
#[derive(Default)]
pub struct FakeProtocol {
    server: Mutex<Server>,
    status_delay: Duration,
    license_delay: Duration,
    mutation_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every status fetch.
    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    /// Delay every license fetch.
    pub fn with_license_delay(mut self, delay: Duration) -> Self {
        self.license_delay = delay;
        self
    }

    /// Delay every mutation.
    pub fn with_mutation_delay(mut self, delay: Duration) -> Self {
        self.mutation_delay = delay;
        self
    }

    fn server(&self) -> std::sync::MutexGuard<'_, Server> {
        self.server.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `status` the current status of its license.
    pub fn set_status(&self, status: StatusDocument) {
        self.server().statuses.insert(status.id().to_string(), status);
    }

    /// Answer `operation` on the license of `status` with `status`.
    pub fn on(&self, operation: Operation, status: StatusDocument) {
        self.server()
            .transitions
            .insert((status.id().to_string(), operation), status);
    }

    /// Serve `license` from the status document's `license` link.
    pub fn set_license(&self, license: LicenseDocument) {
        self.server().licenses.insert(license.id().to_string(), license);
    }

    /// Answer `operation` on `license_id` with `error`.
    pub fn fail(&self, license_id: &str, operation: Operation, error: ProtocolError) {
        self.server()
            .failures
            .insert((license_id.to_string(), operation), error);
    }

    /// Make every call fail as if the server were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.server().offline = offline;
    }

    /// Number of calls of `operation` so far.
    pub fn calls(&self, operation: Operation) -> usize {
        self.server()
            .calls
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }

    /// Highest number of mutations observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn begin(&self, operation: Operation, license_id: &str) -> Result<(), ProtocolError> {
        let mut server = self.server();
        server.calls.push((operation, license_id.to_string()));
        if server.offline {
            return Err(TransportError::Connect("fake server offline".into()).into());
        }
        match server.failures.get(&(license_id.to_string(), operation)) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn mutate(
        &self,
        operation: Operation,
        status: &StatusDocument,
    ) -> Result<StatusDocument, ProtocolError> {
        let license_id = status.id().to_string();
        self.begin(operation, &license_id)?;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);
        if !self.mutation_delay.is_zero() {
            tokio::time::sleep(self.mutation_delay).await;
        }

        let mut server = self.server();
        match server.transitions.get(&(license_id.clone(), operation)).cloned() {
            Some(next) => {
                server.statuses.insert(license_id, next.clone());
                Ok(next)
            }
            None if operation == Operation::Register => Ok(server
                .statuses
                .get(&license_id)
                .cloned()
                .unwrap_or_else(|| status.clone())),
            None => Err(ProtocolError::LinkNotAvailable(operation.name())),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProtocolClient for FakeProtocol {
    async fn fetch_status(&self, license: &LicenseDocument) -> Result<StatusDocument, ProtocolError> {
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        self.begin(Operation::FetchStatus, license.id())?;
        self.server()
            .statuses
            .get(license.id())
            .cloned()
            .ok_or(ProtocolError::LinkNotAvailable("status"))
    }

    async fn fetch_license(&self, status: &StatusDocument) -> Result<LicenseDocument, ProtocolError> {
        self.begin(Operation::FetchLicense, status.id())?;
        if !self.license_delay.is_zero() {
            tokio::time::sleep(self.license_delay).await;
        }
        self.server()
            .licenses
            .get(status.id())
            .cloned()
            .ok_or(ProtocolError::LinkNotAvailable("license"))
    }

    async fn register(
        &self,
        status: &StatusDocument,
        _device: &DeviceInfo,
    ) -> Result<StatusDocument, ProtocolError> {
        self.mutate(Operation::Register, status).await
    }

    async fn renew(
        &self,
        status: &StatusDocument,
        _device: &DeviceInfo,
        _end: Option<DateTime<Utc>>,
    ) -> Result<StatusDocument, ProtocolError> {
        self.mutate(Operation::Renew, status).await
    }

    async fn return_license(
        &self,
        status: &StatusDocument,
        _device: &DeviceInfo,
    ) -> Result<StatusDocument, ProtocolError> {
        self.mutate(Operation::Return, status).await
    }
}

/// A publication held in memory.
#[derive(Debug, Default)]
pub struct MemoryContainer {
    resources: HashMap<String, Bytes>,
    reads: Mutex<Vec<(String, Option<Range<u64>>)>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, data: impl Into<Bytes>) -> Self {
        self.resources.insert(path.to_string(), data.into());
        self
    }

    /// Reads served so far, in order.
    pub fn reads(&self) -> Vec<(String, Option<Range<u64>>)> {
        self.reads.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn resource(&self, path: &str) -> io::Result<&Bytes> {
        self.resources
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }
}

#[async_trait]
impl ResourceContainer for MemoryContainer {
    async fn length(&self, path: &str) -> io::Result<u64> {
        Ok(self.resource(path)?.len() as u64)
    }

    async fn read(&self, path: &str, range: Option<Range<u64>>) -> io::Result<Bytes> {
        let data = self.resource(path)?;
        if let Ok(mut reads) = self.reads.lock() {
            reads.push((path.to_string(), range.clone()));
        }
        Ok(match range {
            Some(range) => {
                let end = (range.end as usize).min(data.len());
                let start = (range.start as usize).min(end);
                data.slice(start..end)
            }
            None => data.clone(),
        })
    }
}

/// Answers passphrase prompts from a script and records why it was asked.
///
/// `None` entries cancel the prompt; an exhausted script cancels too.
#[derive(Debug, Default)]
pub struct StaticAuthenticator {
    answers: Mutex<VecDeque<Option<String>>>,
    reasons: Mutex<Vec<AuthenticationReason>>,
    delay: Duration,
}

impl StaticAuthenticator {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(|a| a.map(Into::into)).collect()),
            reasons: Mutex::default(),
            delay: Duration::ZERO,
        }
    }

    /// Take `delay` to answer each prompt, like a user typing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answer the first prompt with `passphrase`.
    pub fn answering(passphrase: &str) -> Self {
        Self::new([Some(passphrase)])
    }

    /// Cancel every prompt.
    pub fn cancelling() -> Self {
        Self::default()
    }

    /// Reasons of the prompts so far.
    pub fn reasons(&self) -> Vec<AuthenticationReason> {
        self.reasons.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Authenticating for StaticAuthenticator {
    async fn retrieve_passphrase(
        &self,
        _license: &LicenseDocument,
        reason: AuthenticationReason,
    ) -> Option<String> {
        if let Ok(mut reasons) = self.reasons.lock() {
            reasons.push(reason);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answers.lock().ok()?.pop_front().flatten()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut current) = self.now.lock() {
            *current += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}
