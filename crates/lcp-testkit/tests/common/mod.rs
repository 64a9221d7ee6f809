//! Shared setup for the service tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use lcp::protocol::{DeviceInfo, RetryPolicy};
use lcp::store::MemoryStore;
use lcp::{LcpConfig, LcpService, License};
use lcp_testkit::{date, FakeProtocol, ManualClock};

pub type Service = LcpService<MemoryStore, MemoryStore, FakeProtocol>;
pub type Session = License<MemoryStore, FakeProtocol>;

pub const DEVICE_ID: &str = "device-1";

/// A service wired to in-memory collaborators, at 2024-06-01.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub server: Arc<FakeProtocol>,
    pub clock: ManualClock,
    pub service: Service,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_server(FakeProtocol::new())
    }

    pub fn with_server(server: FakeProtocol) -> Self {
        Self::with_parts(Arc::new(MemoryStore::new()), Arc::new(server))
    }

    /// A second device: another store against the same server.
    pub fn other_device(&self) -> Self {
        Self::with_parts(Arc::new(MemoryStore::new()), self.server.clone())
    }

    fn with_parts(store: Arc<MemoryStore>, server: Arc<FakeProtocol>) -> Self {
        let clock = ManualClock::new(date(2024, 6, 1));
        let config = LcpConfig {
            device: DeviceInfo::new(DEVICE_ID, "Test reader"),
            status_timeout: Duration::from_millis(300),
            retry: RetryPolicy::none(),
            ..LcpConfig::default()
        };
        let service = LcpService::new(store.clone(), store.clone(), server.clone(), config)
            .with_clock(Arc::new(clock.clone()));
        Self {
            store,
            server,
            clock,
            service,
        }
    }
}

/// Install a log subscriber once, for debugging failing tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}
