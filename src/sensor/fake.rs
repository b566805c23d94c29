//! Scripted in-memory sensor used by tests.
//!
//! Clones share one device state, so a test can keep a clone around and
//! inspect what the session did after handing the original over.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{CancelFlag, Measurement, ReportingMode, Sensor, MAX_CYCLE_MINUTES};
use crate::error::ExporterError;
use crate::Result;

const CANCEL_POLL: Duration = Duration::from_millis(5);

/// One scripted response, optionally delivered after a delay.
pub struct FakeEntry<T> {
    response: Result<T>,
    delay: Option<Duration>,
}

impl<T> FakeEntry<T> {
    pub fn immediate(response: Result<T>) -> Self {
        Self {
            response,
            delay: None,
        }
    }

    pub fn with_delay(response: Result<T>, delay: Duration) -> Self {
        Self {
            response,
            delay: Some(delay),
        }
    }

    /// Wait out the delay, giving up early once `cancel` is set.
    fn deliver(self, cancel: &CancelFlag) -> Result<T> {
        if let Some(delay) = self.delay {
            let until = Instant::now() + delay;
            loop {
                let now = Instant::now();
                if now >= until {
                    break;
                }
                if cancel.is_cancelled() {
                    return Err(ExporterError::Cancelled);
                }
                std::thread::sleep(CANCEL_POLL.min(until - now));
            }
        }
        if cancel.is_cancelled() {
            return Err(ExporterError::Cancelled);
        }
        self.response
    }
}

impl<T> From<Result<T>> for FakeEntry<T> {
    fn from(response: Result<T>) -> Self {
        Self::immediate(response)
    }
}

#[derive(Default)]
struct FakeState {
    cycle: u8,
    mode: Option<ReportingMode>,
    passive_script: VecDeque<FakeEntry<()>>,
    reads: VecDeque<FakeEntry<Measurement>>,
    cycle_error: Option<String>,
    set_cycle_error: Option<String>,
    active_error: Option<String>,
    clone_error: Option<String>,
    passive_calls: usize,
    cycle_reads: usize,
    cycle_writes: Vec<u8>,
    mode_changes: Vec<ReportingMode>,
    reads_taken: usize,
}

/// Scripted stand-in for a real sensor.
///
/// Unscripted passive-mode requests succeed immediately. A delayed response
/// whose handle is cancelled fails with `Cancelled` and changes nothing.
/// Once the read script is exhausted, `read_measurement` blocks forever,
/// like a sensor that stopped reporting.
#[derive(Clone, Default)]
pub struct FakeSensor {
    state: Arc<Mutex<FakeState>>,
    cancel: CancelFlag,
}

impl FakeSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cycle the device reports before anything is written.
    pub fn with_cycle(self, minutes: u8) -> Self {
        self.lock().cycle = minutes;
        self
    }

    /// Responses for successive passive-mode requests.
    pub fn with_passive_script(self, script: Vec<FakeEntry<()>>) -> Self {
        self.lock().passive_script = script.into();
        self
    }

    /// Responses for successive measurement reads.
    pub fn with_reads(self, reads: Vec<Result<Measurement>>) -> Self {
        self.lock().reads = reads.into_iter().map(FakeEntry::from).collect();
        self
    }

    pub fn failing_cycle_read(self, reason: &str) -> Self {
        self.lock().cycle_error = Some(reason.to_string());
        self
    }

    pub fn failing_cycle_write(self, reason: &str) -> Self {
        self.lock().set_cycle_error = Some(reason.to_string());
        self
    }

    pub fn failing_active(self, reason: &str) -> Self {
        self.lock().active_error = Some(reason.to_string());
        self
    }

    pub fn failing_clone(self, reason: &str) -> Self {
        self.lock().clone_error = Some(reason.to_string());
        self
    }

    /// Mode the device is currently in, if any was set.
    pub fn mode(&self) -> Option<ReportingMode> {
        self.lock().mode
    }

    pub fn current_cycle(&self) -> u8 {
        self.lock().cycle
    }

    pub fn passive_calls(&self) -> usize {
        self.lock().passive_calls
    }

    pub fn cycle_reads(&self) -> usize {
        self.lock().cycle_reads
    }

    /// Every value written with `set_cycle`, in order.
    pub fn cycle_writes(&self) -> Vec<u8> {
        self.lock().cycle_writes.clone()
    }

    /// Every mode applied successfully, in order.
    pub fn mode_changes(&self) -> Vec<ReportingMode> {
        self.lock().mode_changes.clone()
    }

    pub fn reads_taken(&self) -> usize {
        self.lock().reads_taken
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_mode(&self, mode: ReportingMode) {
        let mut state = self.lock();
        state.mode = Some(mode);
        state.mode_changes.push(mode);
    }
}

impl Sensor for FakeSensor {
    fn try_clone(&self) -> Result<Self> {
        match &self.lock().clone_error {
            Some(reason) => Err(ExporterError::Device(reason.clone())),
            None => Ok(Self {
                state: Arc::clone(&self.state),
                cancel: CancelFlag::new(),
            }),
        }
    }

    fn set_cancel_flag(&mut self, cancel: CancelFlag) {
        self.cancel = cancel;
    }

    fn set_mode(&mut self, mode: ReportingMode) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ExporterError::Cancelled);
        }
        match mode {
            ReportingMode::Passive => {
                let entry = {
                    let mut state = self.lock();
                    state.passive_calls += 1;
                    state.passive_script.pop_front()
                };
                // Deliver outside the lock so a slow call does not stall others.
                if let Some(entry) = entry {
                    entry.deliver(&self.cancel)?;
                }
            }
            ReportingMode::Active => {
                if let Some(reason) = self.lock().active_error.clone() {
                    return Err(ExporterError::Device(reason));
                }
            }
        }
        self.record_mode(mode);
        Ok(())
    }

    fn cycle(&mut self) -> Result<u8> {
        let mut state = self.lock();
        state.cycle_reads += 1;
        match &state.cycle_error {
            Some(reason) => Err(ExporterError::Device(reason.clone())),
            None => Ok(state.cycle),
        }
    }

    fn set_cycle(&mut self, minutes: u8) -> Result<()> {
        if minutes > MAX_CYCLE_MINUTES {
            return Err(ExporterError::InvalidCycle(minutes));
        }
        let mut state = self.lock();
        if let Some(reason) = &state.set_cycle_error {
            return Err(ExporterError::Device(reason.clone()));
        }
        state.cycle_writes.push(minutes);
        state.cycle = minutes;
        Ok(())
    }

    fn read_measurement(&mut self) -> Result<Measurement> {
        let entry = {
            let mut state = self.lock();
            let entry = state.reads.pop_front();
            if entry.is_some() {
                state.reads_taken += 1;
            }
            entry
        };
        match entry {
            Some(entry) => entry.deliver(&self.cancel),
            None => loop {
                std::thread::park();
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let sensor = FakeSensor::new().with_cycle(7);
        let mut handle = sensor.try_clone().unwrap();

        handle.set_cycle(3).unwrap();
        assert_eq!(sensor.current_cycle(), 3);
        assert_eq!(sensor.cycle_writes(), vec![3]);
    }

    #[test]
    fn test_set_cycle_same_value_is_idempotent() {
        let mut sensor = FakeSensor::new().with_cycle(5);
        for _ in 0..3 {
            sensor.set_cycle(5).unwrap();
            assert_eq!(sensor.cycle().unwrap(), 5);
        }
        assert_eq!(sensor.cycle_writes(), vec![5, 5, 5]);
    }

    #[test]
    fn test_set_cycle_out_of_range() {
        let mut sensor = FakeSensor::new();
        assert!(matches!(
            sensor.set_cycle(31),
            Err(ExporterError::InvalidCycle(31))
        ));
        assert!(sensor.cycle_writes().is_empty());
    }

    #[test]
    fn test_passive_script_order() {
        let mut sensor = FakeSensor::new().with_passive_script(vec![
            FakeEntry::immediate(Err(ExporterError::Device("glitch".into()))),
            FakeEntry::immediate(Ok(())),
        ]);

        assert!(sensor.set_mode(ReportingMode::Passive).is_err());
        assert_eq!(sensor.mode(), None);
        assert!(sensor.set_mode(ReportingMode::Passive).is_ok());
        assert_eq!(sensor.mode(), Some(ReportingMode::Passive));
        assert_eq!(sensor.passive_calls(), 2);
    }

    #[test]
    fn test_cancelled_delay_changes_nothing() {
        let sensor = FakeSensor::new().with_passive_script(vec![FakeEntry::with_delay(
            Ok(()),
            Duration::from_secs(5),
        )]);
        let mut handle = sensor.try_clone().unwrap();
        let cancel = CancelFlag::new();
        handle.set_cancel_flag(cancel.clone());

        let worker = std::thread::spawn(move || handle.set_mode(ReportingMode::Passive));
        std::thread::sleep(Duration::from_millis(20));
        cancel.cancel();

        assert!(matches!(worker.join().unwrap(), Err(ExporterError::Cancelled)));
        assert_eq!(sensor.mode(), None);
        assert_eq!(sensor.passive_calls(), 1);
    }

    #[test]
    fn test_clone_gets_own_cancel_flag() {
        let mut sensor = FakeSensor::new();
        let cancel = CancelFlag::new();
        cancel.cancel();
        sensor.set_cancel_flag(cancel);

        let mut handle = sensor.try_clone().unwrap();
        assert!(handle.set_mode(ReportingMode::Passive).is_ok());
        assert!(matches!(
            sensor.set_mode(ReportingMode::Passive),
            Err(ExporterError::Cancelled)
        ));
    }

    #[test]
    fn test_reads_in_order() {
        let mut sensor = FakeSensor::new().with_reads(vec![
            Err(ExporterError::Device("checksum".into())),
            Ok(Measurement::new(1.0, 2.0)),
        ]);
        assert!(sensor.read_measurement().is_err());
        assert_eq!(sensor.read_measurement().unwrap(), Measurement::new(1.0, 2.0));
        assert_eq!(sensor.reads_taken(), 2);
    }
}
