//! Scripted in-memory transport for tests.
//!
//! Clones share state, so a test keeps one handle to queue responses and inspect writes
//! while the protocol owns the other.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::timing::Sleep;
use crate::transport::Transport;
use crate::TransportError;

/// Failure a mock operation should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Device unplugged
    NoDevice,
    /// OS refused access
    Access,
    /// No answer
    Timeout,
}

impl From<Fault> for TransportError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::NoDevice => TransportError::Usb(rusb::Error::NoDevice),
            Fault::Access => TransportError::Usb(rusb::Error::Access),
            Fault::Timeout => TransportError::Usb(rusb::Error::Timeout),
        }
    }
}

/// One recorded write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub endpoint: u8,
    pub data: Vec<u8>,
    pub timeout: Duration,
}

#[derive(Debug, Default)]
struct State {
    reads: VecDeque<Result<Vec<u8>, Fault>>,
    writes: Vec<Write>,
    write_faults: VecDeque<Option<Fault>>,
    open_fault: Option<Fault>,
    open: bool,
    opens: usize,
    reads_attempted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a response for the next read
    pub fn push_read(&self, data: impl Into<Vec<u8>>) -> &Self {
        self.state().reads.push_back(Ok(data.into()));
        self
    }

    /// Queue a failure for the next read
    pub fn push_read_fault(&self, fault: Fault) -> &Self {
        self.state().reads.push_back(Err(fault));
        self
    }

    /// Make the n-th upcoming write (0-based) fail
    pub fn fail_write(&self, nth: usize, fault: Fault) -> &Self {
        let mut state = self.state();
        if state.write_faults.len() <= nth {
            state.write_faults.resize(nth + 1, None);
        }
        state.write_faults[nth] = Some(fault);
        self
    }

    pub fn fail_open(&self, fault: Fault) -> &Self {
        self.state().open_fault = Some(fault);
        self
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state().writes.clone()
    }

    /// Write payloads only
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().writes.iter().map(|w| w.data.clone()).collect()
    }

    /// Total reads and writes performed
    pub fn io_count(&self) -> usize {
        let state = self.state();
        state.writes.len() + state.reads_attempted
    }

    pub fn opens(&self) -> usize {
        self.state().opens
    }

    pub fn pending_reads(&self) -> usize {
        self.state().reads.len()
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        if let Some(fault) = state.open_fault {
            return Err(fault.into());
        }
        if !state.open {
            state.open = true;
            state.opens += 1;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.state().open = false;
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        let mut state = self.state();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        if let Some(Some(fault)) = state.write_faults.pop_front() {
            return Err(fault.into());
        }
        state.writes.push(Write {
            endpoint,
            data: data.to_vec(),
            timeout,
        });
        Ok(data.len())
    }

    fn read(&mut self, _endpoint: u8, len: usize, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        state.reads_attempted += 1;
        match state.reads.pop_front() {
            Some(Ok(mut data)) => {
                data.truncate(len);
                Ok(data)
            },
            Some(Err(fault)) => Err(fault.into()),
            // Silent device
            None => Err(TransportError::Usb(rusb::Error::Timeout)),
        }
    }
}

/// Records requested sleeps instead of blocking
#[derive(Debug, Clone, Default)]
pub struct RecordingSleep {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn total(&self) -> Duration {
        self.slept().iter().sum()
    }
}

impl Sleep for RecordingSleep {
    fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}
