//! Scripted Cube used by the daemon's tests.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use maxcube::Connection;
use maxcube::ConnectionError;

pub const GREETING: &str = concat!(
    "H:KEQ0566338,0b6444,0113,00000000,335b04d2,33,32,0f0c19,1527,03,0000\r\n",
    "M:00,01,VgIEAQdLaXRjaGVuBrxTAgZMaXZpbmcIq4IDCFNsZWVwaW5nCxwtDAZPZmZpY2UKCwwGAQa8U0tFUTAzMzYxMDgLS2l0Y2hlbiBUUlYBAwirgktFUTAzMzU4NjILTGl2aW5nIFdhbGwCAQa8WktFUTAzMzYxMDAKTGl2aW5nIFRSVgIECxwtS0VRMDcwMDAwMQZXaW5kb3cDAgoLDEtFUTA5MDAwMDEKT2ZmaWNlIFRSVgwFDA0OS0VRMDgwMDAwMQNFY28AAQ==\r\n",
    "C:06bc53,0ga8UwEBGf9LRVEwMzM2MTA4KiI9CQcYAzsH/wA=\r\n",
    "L:Cwa8UwASGCAqANcADAirggASGQAsAAAA4QsGvFoAEptkPAAAAAYLHC0AEhILCgsMABIZACQAvgAGDA0OABIQ\r\n",
);

pub const LIST_REPLY: &str =
    "L:Cwa8UwASGCAqANcADAirggASGQAsAAAA4QsGvFoAEptkPAAAAAYLHC0AEhILCgsMABIZACQAvgAGDA0OABIQ\r\n";

/// Shared view of what a [`FakeCube`] has seen, kept by the test after the
/// connection is handed to a coordinator.
#[derive(Debug, Default)]
pub struct FakeCubeLog {
    pub sent: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub offline: AtomicBool,
}

impl FakeCubeLog {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

/// Answers like a Cube holding the fixture devices.
pub struct FakeCube {
    pub log: Arc<FakeCubeLog>,
    pub ack: String,
    pub delay: Duration,
    pending: String,
}

impl FakeCube {
    pub fn new() -> (Self, Arc<FakeCubeLog>) {
        let log = Arc::new(FakeCubeLog::default());
        let cube = Self {
            log: log.clone(),
            ack: "S:00,0,31\r\n".to_string(),
            delay: Duration::ZERO,
            pending: String::new(),
        };
        (cube, log)
    }

    pub fn boxed() -> (Box<dyn Connection>, Arc<FakeCubeLog>) {
        let (cube, log) = Self::new();
        (Box::new(cube), log)
    }
}

#[async_trait]
impl Connection for FakeCube {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.log.offline.load(Ordering::SeqCst) {
            return Err(ConnectionError::Connect {
                addr: "fake:62910".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        let now = self.log.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        self.pending = GREETING.to_string();
        Ok(())
    }

    async fn send(&mut self, line: &str) -> Result<(), ConnectionError> {
        self.log.sent.lock().unwrap().push(line.to_string());
        self.pending = if line.starts_with("s:") {
            self.ack.clone()
        } else {
            LIST_REPLY.to_string()
        };
        Ok(())
    }

    async fn read_response(&mut self, _terminator: &str) -> Result<String, ConnectionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(std::mem::take(&mut self.pending))
    }

    async fn disconnect(&mut self) {
        self.log.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
