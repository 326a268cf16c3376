//! Scripted pass-through for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use trcc_core::mock::Fault;
use trcc_core::TransportError;

use crate::ScsiTransport;

/// One recorded data-out command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdbWrite {
    pub cdb: [u8; 16],
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    reads: VecDeque<Vec<u8>>,
    read_cdbs: Vec<[u8; 16]>,
    writes: Vec<CdbWrite>,
    write_faults: VecDeque<Option<Fault>>,
    open: bool,
}

/// Clones share state
#[derive(Debug, Clone, Default)]
pub struct MockScsi {
    state: Arc<Mutex<State>>,
}

impl MockScsi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_read(&self, data: impl Into<Vec<u8>>) -> &Self {
        self.state().reads.push_back(data.into());
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

    pub fn writes(&self) -> Vec<CdbWrite> {
        self.state().writes.clone()
    }

    /// Number of data-in commands issued
    pub fn reads(&self) -> usize {
        self.state().read_cdbs.len()
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }
}

impl ScsiTransport for MockScsi {
    fn open(&mut self) -> Result<(), TransportError> {
        self.state().open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.state().open = false;
    }

    fn read(&mut self, cdb: &[u8; 16], len: usize) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        state.read_cdbs.push(*cdb);
        let mut data = state
            .reads
            .pop_front()
            .ok_or_else(|| TransportError::from(Fault::Timeout))?;
        data.truncate(len);
        Ok(data)
    }

    fn write(&mut self, cdb: &[u8; 16], data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        if let Some(Some(fault)) = state.write_faults.pop_front() {
            return Err(fault.into());
        }
        state.writes.push(CdbWrite {
            cdb: *cdb,
            data: data.to_vec(),
        });
        Ok(())
    }
}
