//! Sensor session startup.
//!
//! [`SessionManager`] takes a sensor from an unknown boot state to active
//! reporting:
//!
//! 1. open the serial device,
//! 2. switch to passive mode (the only step guarded by [`BoundedRetry`]),
//! 3. reconcile the sampling cycle,
//! 4. switch to active mode,
//!
//! and then hands the handle to the [`MeasurementLoop`]. Any failure along
//! the way is returned as [`ExporterError::Startup`] naming the step.
//!
//! [`BoundedRetry`]: super::BoundedRetry

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::measure::MeasurementLoop;
use super::{SessionConfig, SessionState};
use crate::error::{ExporterError, StartupStep};
use crate::metrics::PmGauges;
use crate::sensor::{ReportingMode, Sensor};
use crate::Result;

/// What cycle reconciliation did to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleAction {
    /// Cycle written without reading it first.
    Forced,
    /// Sensor had a different cycle, which was replaced.
    Updated { from: u8 },
    /// Sensor already had the configured cycle.
    Unchanged,
}

impl fmt::Display for CycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => f.write_str("written unconditionally"),
            Self::Updated { from } => write!(f, "changed from {} minutes", from),
            Self::Unchanged => f.write_str("already set"),
        }
    }
}

/// An open sensor handle together with its lifecycle state.
pub struct Session<S: Sensor> {
    sensor: S,
    state: SessionState,
    config: SessionConfig,
}

impl<S: Sensor> Session<S> {
    /// Open the sensor at the configured path.
    pub fn open<O>(config: SessionConfig, open: O) -> Result<Self>
    where
        O: FnOnce(&str) -> Result<S>,
    {
        let mut state = SessionState::Unopened;
        let sensor =
            open(config.port_path.as_str()).map_err(ExporterError::at(StartupStep::Open))?;
        state.transition_to(SessionState::Opened)?;
        info!("Opened sensor at {}", config.port_path);

        Ok(Self {
            sensor,
            state,
            config,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Switch the sensor to passive mode under the configured retry policy.
    ///
    /// Every attempt talks to its own clone of the handle, tied to the
    /// attempt's cancel flag. An attempt abandoned after a timeout gives up
    /// the port before the next one starts.
    pub async fn enter_passive(&mut self) -> Result<()> {
        self.expect_next(SessionState::PassiveConfirmed)?;

        let retry = self.config.retry;
        let sensor = &mut self.sensor;
        retry
            .call("passive mode switch", move |cancel| {
                let mut handle = sensor.try_clone()?;
                handle.set_cancel_flag(cancel.clone());
                Ok(move || handle.set_mode(ReportingMode::Passive))
            })
            .await
            .map_err(ExporterError::at(StartupStep::Passive))?;

        debug!("Sensor is in passive mode");
        self.state.transition_to(SessionState::PassiveConfirmed)
    }

    /// Make the sensor cycle match the configured one.
    ///
    /// With `force_set_cycle` the cycle is written without looking at the
    /// current value. Otherwise it is read and written only when it differs.
    pub fn reconcile_cycle(&mut self) -> Result<CycleAction> {
        self.expect_next(SessionState::CycleReconciled)?;

        let desired = self.config.cycle;
        let action = if self.config.force_set_cycle {
            info!("Setting sensor cycle to {} minutes", desired);
            self.write_cycle(desired)?;
            CycleAction::Forced
        } else {
            let current = self
                .sensor
                .cycle()
                .map_err(ExporterError::at(StartupStep::GetCycle))?;
            if current == desired {
                debug!("Sensor cycle already {} minutes", current);
                CycleAction::Unchanged
            } else {
                info!(
                    "Setting sensor cycle to {} minutes (was {})",
                    desired, current
                );
                self.write_cycle(desired)?;
                CycleAction::Updated { from: current }
            }
        };

        self.state.transition_to(SessionState::CycleReconciled)?;
        Ok(action)
    }

    /// Switch the sensor to active reporting.
    pub fn activate(&mut self) -> Result<()> {
        self.expect_next(SessionState::Active)?;

        info!("Switching sensor to active mode");
        self.sensor
            .set_mode(ReportingMode::Active)
            .map_err(ExporterError::at(StartupStep::Active))?;

        self.state.transition_to(SessionState::Active)
    }

    /// Hand the sensor over to the measurement loop.
    pub fn into_measurement_loop(mut self, gauges: Arc<PmGauges>) -> Result<MeasurementLoop<S>> {
        self.state.transition_to(SessionState::Running)?;
        Ok(MeasurementLoop::new(self.sensor, gauges))
    }

    fn write_cycle(&mut self, minutes: u8) -> Result<()> {
        self.sensor
            .set_cycle(minutes)
            .map_err(ExporterError::at(StartupStep::SetCycle))
    }

    fn expect_next(&self, target: SessionState) -> Result<()> {
        if self.state.can_transition_to(target) {
            Ok(())
        } else {
            Err(ExporterError::InvalidStateTransition {
                from: self.state,
                to: target,
            })
        }
    }
}

/// Drives one sensor from boot to the measurement loop.
pub struct SessionManager<O> {
    config: SessionConfig,
    open: O,
}

impl<S, O> SessionManager<O>
where
    S: Sensor,
    O: FnOnce(&str) -> Result<S> + Send + 'static,
{
    /// Create a manager that opens the sensor with `open`.
    pub fn new(config: SessionConfig, open: O) -> Self {
        Self { config, open }
    }

    /// Run startup steps 1-4 and return the active session.
    pub async fn start(self) -> Result<Session<S>> {
        let Self { config, open } = self;

        let mut session = run_blocking(move || Session::open(config, open)).await?;
        session.enter_passive().await?;

        let (session, action) = run_blocking(move || {
            let action = session.reconcile_cycle()?;
            session.activate()?;
            Ok((session, action))
        })
        .await?;

        info!(
            "Sensor active with a {} minute cycle ({})",
            session.config.cycle, action
        );
        Ok(session)
    }

    /// Start the session and measure until the process ends.
    ///
    /// Only returns on a fatal startup error or if the measurement thread
    /// dies.
    pub async fn run(self, gauges: Arc<PmGauges>) -> Result<Infallible> {
        let session = self.start().await?;
        let measurements = session.into_measurement_loop(gauges)?;
        info!("Sensor ready, entering measurement loop");

        match tokio::task::spawn_blocking(move || measurements.run()).await {
            Ok(never) => match never {},
            Err(e) => Err(ExporterError::Task(format!(
                "measurement loop stopped: {}",
                e
            ))),
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExporterError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{FakeEntry, FakeSensor};
    use crate::session::BoundedRetry;
    use std::time::Duration;

    fn open_fake(sensor: &FakeSensor) -> impl FnOnce(&str) -> Result<FakeSensor> {
        let sensor = sensor.clone();
        move |_| Ok(sensor)
    }

    fn opened(sensor: &FakeSensor, config: SessionConfig) -> Session<FakeSensor> {
        Session::open(config, open_fake(sensor)).unwrap()
    }

    fn reconciling(sensor: &FakeSensor, cycle: u8, force: bool) -> Session<FakeSensor> {
        let config = SessionConfig::default()
            .with_cycle(cycle)
            .with_force_set_cycle(force);
        let mut session = opened(sensor, config);
        session.state = SessionState::PassiveConfirmed;
        session
    }

    #[test]
    fn test_open_failure_names_step() {
        let result: Result<Session<FakeSensor>> =
            Session::open(SessionConfig::new("/dev/missing"), |path| {
                Err(ExporterError::SensorOpen {
                    path: path.to_string(),
                    reason: "no such device".into(),
                })
            });
        match result {
            Err(ExporterError::Startup { step, source }) => {
                assert_eq!(step, StartupStep::Open);
                assert!(source.to_string().contains("/dev/missing"));
            }
            _ => panic!("expected startup error"),
        }
    }

    #[test]
    fn test_open_passes_configured_path() {
        let sensor = FakeSensor::new();
        let session = Session::open(SessionConfig::new("/dev/ttyAMA0"), |path| {
            assert_eq!(path, "/dev/ttyAMA0");
            Ok(sensor.clone())
        })
        .unwrap();
        assert_eq!(session.state(), SessionState::Opened);
    }

    #[test]
    fn test_unforced_matching_cycle_is_left_alone() {
        let sensor = FakeSensor::new().with_cycle(5);
        let mut session = reconciling(&sensor, 5, false);

        assert_eq!(session.reconcile_cycle().unwrap(), CycleAction::Unchanged);
        assert!(sensor.cycle_writes().is_empty());
        assert_eq!(sensor.cycle_reads(), 1);
        assert_eq!(session.state(), SessionState::CycleReconciled);
    }

    #[test]
    fn test_unforced_different_cycle_is_written_once() {
        let sensor = FakeSensor::new().with_cycle(7);
        let mut session = reconciling(&sensor, 5, false);

        assert_eq!(
            session.reconcile_cycle().unwrap(),
            CycleAction::Updated { from: 7 }
        );
        assert_eq!(sensor.cycle_writes(), vec![5]);
    }

    #[test]
    fn test_forced_cycle_is_always_written() {
        let sensor = FakeSensor::new().with_cycle(5);
        let mut session = reconciling(&sensor, 5, true);

        assert_eq!(session.reconcile_cycle().unwrap(), CycleAction::Forced);
        assert_eq!(sensor.cycle_writes(), vec![5]);
        assert_eq!(sensor.cycle_reads(), 0);
    }

    #[test]
    fn test_cycle_read_failure() {
        let sensor = FakeSensor::new().failing_cycle_read("no reply");
        let mut session = reconciling(&sensor, 5, false);

        let err = session.reconcile_cycle().unwrap_err();
        assert!(err.to_string().starts_with("cannot get current cycle"));
        assert_eq!(session.state(), SessionState::PassiveConfirmed);
    }

    #[test]
    fn test_cycle_write_failure() {
        let sensor = FakeSensor::new().failing_cycle_write("rejected");
        let mut session = reconciling(&sensor, 5, true);

        let err = session.reconcile_cycle().unwrap_err();
        assert!(matches!(
            err,
            ExporterError::Startup {
                step: StartupStep::SetCycle,
                ..
            }
        ));
    }

    #[test]
    fn test_out_of_range_cycle_is_fatal() {
        let sensor = FakeSensor::new();
        let mut session = reconciling(&sensor, 31, true);
        assert!(session.reconcile_cycle().is_err());
    }

    #[test]
    fn test_cannot_skip_passive_mode() {
        let sensor = FakeSensor::new();
        let mut session = opened(&sensor, SessionConfig::default());

        assert!(matches!(
            session.reconcile_cycle(),
            Err(ExporterError::InvalidStateTransition { .. })
        ));
        assert!(session.activate().is_err());
        assert!(sensor.cycle_writes().is_empty());
        assert!(sensor.mode_changes().is_empty());
    }

    #[test]
    fn test_activate_failure() {
        let sensor = FakeSensor::new().failing_active("no ack");
        let mut session = reconciling(&sensor, 5, true);
        session.reconcile_cycle().unwrap();

        let err = session.activate().unwrap_err();
        assert!(err.to_string().starts_with("cannot switch sensor to active mode"));
        assert_eq!(session.state(), SessionState::CycleReconciled);
    }

    #[tokio::test]
    async fn test_enter_passive_retries_then_confirms() {
        let sensor = FakeSensor::new().with_passive_script(vec![
            FakeEntry::immediate(Err(ExporterError::Device("garbled".into()))),
            FakeEntry::immediate(Ok(())),
        ]);
        let retry =
            BoundedRetry::new(1, Duration::from_millis(200)).with_backoff_unit(Duration::ZERO);
        let mut session = opened(&sensor, SessionConfig::default().with_retry(retry));

        session.enter_passive().await.unwrap();
        assert_eq!(session.state(), SessionState::PassiveConfirmed);
        assert_eq!(sensor.passive_calls(), 2);
        assert_eq!(sensor.mode(), Some(ReportingMode::Passive));
    }

    #[tokio::test]
    async fn test_enter_passive_timeout_is_fatal() {
        let sensor = FakeSensor::new().with_passive_script(vec![FakeEntry::with_delay(
            Ok(()),
            Duration::from_millis(300),
        )]);
        let retry = BoundedRetry::new(0, Duration::from_millis(30));
        let mut session = opened(&sensor, SessionConfig::default().with_retry(retry));

        let err = session.enter_passive().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().starts_with("cannot switch sensor to passive mode"));
        assert_eq!(session.state(), SessionState::Opened);
    }

    #[tokio::test]
    async fn test_enter_passive_clone_failure() {
        let sensor = FakeSensor::new().failing_clone("port busy");
        let mut session = opened(&sensor, SessionConfig::default());

        assert!(session.enter_passive().await.is_err());
        assert_eq!(sensor.passive_calls(), 0);
    }

    #[tokio::test]
    async fn test_manager_start_reaches_active() {
        let sensor = FakeSensor::new().with_cycle(7);
        let config = SessionConfig::default().with_force_set_cycle(false);

        let session = SessionManager::new(config, open_fake(&sensor))
            .start()
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(sensor.cycle_writes(), vec![5]);
        assert_eq!(
            sensor.mode_changes(),
            vec![ReportingMode::Passive, ReportingMode::Active]
        );
    }

    #[test]
    fn test_cycle_action_display() {
        assert_eq!(CycleAction::Forced.to_string(), "written unconditionally");
        assert_eq!(
            CycleAction::Updated { from: 7 }.to_string(),
            "changed from 7 minutes"
        );
        assert_eq!(CycleAction::Unchanged.to_string(), "already set");
    }

    #[tokio::test]
    async fn test_enter_passive_abandoned_attempt_changes_nothing() {
        let sensor = FakeSensor::new().with_passive_script(vec![
            FakeEntry::with_delay(Ok(()), Duration::from_millis(300)),
            FakeEntry::immediate(Err(ExporterError::Device("garbled".into()))),
        ]);
        let retry = BoundedRetry::new(1, Duration::from_millis(30))
            .with_backoff_unit(Duration::from_millis(5));
        let mut session = opened(&sensor, SessionConfig::default().with_retry(retry));

        assert!(session.enter_passive().await.is_err());
        // Let the first call's full delay pass; it must not report late.
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(sensor.mode(), None);
        assert!(sensor.mode_changes().is_empty());
    }

    #[test]
    fn test_into_measurement_loop_requires_active() {
        let sensor = FakeSensor::new();
        let session = opened(&sensor, SessionConfig::default());
        let gauges = Arc::new(PmGauges::new().unwrap());
        assert!(session.into_measurement_loop(gauges).is_err());
    }
}
