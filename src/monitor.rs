use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    dispatch::{dispatch_commands, DeviceCommandChannel, DispatchReport, Notifier},
    engine::{GeofenceAutomationEngine, GeofenceDecision},
    error::AutomationError,
    location::{GeoPoint, PositionError, PositionSource},
    store::{HomeSettings, KeyByteValueStore},
};

const ACTIVATION_TITLE: &str = "Automation activated";

/// Result of a completed zone check.
#[derive(Debug)]
pub struct CheckOutcome {
    pub sample: GeoPoint,
    pub decision: GeofenceDecision,
    pub dispatch: DispatchReport,
    /// Text handed to the notifier, if anything was dispatched.
    pub summary: Option<String>,
}

/// Runs the geofence engine against the stored home settings.
///
/// Foreground checks and the background polling loop share one monitor (or
/// clones of it), so all reads and writes of the zone membership go through
/// the same lock.
pub struct ZoneMonitor<S>
where S: KeyByteValueStore
{
    settings: Arc<Mutex<HomeSettings<S>>>,
    engine: GeofenceAutomationEngine,
    positions: Arc<dyn PositionSource>,
    channel: Arc<dyn DeviceCommandChannel>,
    notifier: Arc<dyn Notifier>,
}

impl<S> Clone for ZoneMonitor<S>
where S: KeyByteValueStore
{
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            engine: self.engine,
            positions: self.positions.clone(),
            channel: self.channel.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S> ZoneMonitor<S>
where S: KeyByteValueStore + 'static
{
    pub fn new(
        store: S,
        positions: Arc<dyn PositionSource>,
        channel: Arc<dyn DeviceCommandChannel>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings: Arc::new(Mutex::new(HomeSettings::new(store))),
            engine: GeofenceAutomationEngine::new(),
            positions,
            channel,
            notifier,
        }
    }

    /// Shared settings, e.g. for changing toggles while the monitor runs.
    pub fn settings(&self) -> Arc<Mutex<HomeSettings<S>>> {
        self.settings.clone()
    }

    async fn sample(&self) -> Result<GeoPoint, AutomationError> {
        let sample = self.positions.current_position().await?;
        if !sample.is_valid() {
            return Err(PositionError::Unavailable(format!("invalid sample {sample:?}")).into());
        }
        Ok(sample)
    }

    /// Takes a position sample and applies it.
    pub async fn check_now(&self) -> Result<CheckOutcome, AutomationError> {
        // sampling may take a while, don't hold the lock for it
        let sample = self.sample().await?;
        log::debug!("checking home zone against {sample:?}");
        self.apply_sample(sample).await
    }

    /// Takes a position sample and applies it. If only storing the new
    /// membership failed, the write is retried once with the same decision.
    ///
    /// This is what both the foreground check and the polling loop run.
    pub async fn check(&self) -> Result<CheckOutcome, AutomationError> {
        match self.check_now().await {
            Err(AutomationError::PersistenceFailure { sample, decision, source }) => {
                log::warn!("retrying zone membership write after: {source:#}");
                self.retry_persist(sample, decision).await
            }
            result => result,
        }
    }

    /// Evaluates `sample` against whatever membership is stored right now,
    /// records the new membership, then dispatches any activation.
    ///
    /// The membership is only written if nobody else changed it since it was
    /// read; otherwise the sample is evaluated again against the new value.
    pub async fn apply_sample(&self, sample: GeoPoint) -> Result<CheckOutcome, AutomationError> {
        let decision = {
            let mut settings = self.settings.lock().await;

            let home = settings
                .home_location()
                .map_err(AutomationError::SettingsUnavailable)?
                .ok_or(AutomationError::HomeNotConfigured)?;
            let toggles = settings.toggles().map_err(AutomationError::SettingsUnavailable)?;

            loop {
                let was_inside = settings
                    .was_in_home_zone()
                    .map_err(AutomationError::SettingsUnavailable)?;
                let decision = self.engine.evaluate(&home, &sample, &toggles, was_inside);
                if decision.is_inside == was_inside {
                    break decision;
                }
                match settings.replace_was_in_home_zone(was_inside, decision.is_inside) {
                    Ok(true) => break decision,
                    Ok(false) => log::debug!("zone membership changed by another writer, re-evaluating"),
                    Err(source) => {
                        log::error!("failed to store zone membership: {source:#}");
                        return Err(AutomationError::PersistenceFailure { sample, decision, source });
                    }
                }
            }
        };

        if decision.crossed_into_zone {
            log::info!("Entered home zone ({:.1} m)", decision.distance_meters);
        } else if decision.crossed_out_of_zone {
            log::info!("Left home zone ({:.1} m)", decision.distance_meters);
        }

        Ok(self.dispatch(sample, decision).await)
    }

    /// Retries storing the membership of a decision that failed with
    /// [`AutomationError::PersistenceFailure`].
    ///
    /// If another check already recorded the same membership in the meantime,
    /// the decision's commands are dropped since that check has fired them.
    pub async fn retry_persist(
        &self,
        sample: GeoPoint,
        decision: GeofenceDecision,
    ) -> Result<CheckOutcome, AutomationError> {
        let decision = {
            let mut settings = self.settings.lock().await;
            match settings.replace_was_in_home_zone(!decision.is_inside, decision.is_inside) {
                Ok(true) => decision,
                Ok(false) => {
                    log::debug!("zone membership already recorded, dropping commands");
                    GeofenceDecision {
                        crossed_into_zone: false,
                        crossed_out_of_zone: false,
                        commands: Vec::new(),
                        ..decision
                    }
                }
                Err(source) => {
                    return Err(AutomationError::PersistenceFailure { sample, decision, source });
                }
            }
        };

        Ok(self.dispatch(sample, decision).await)
    }

    async fn dispatch(&self, sample: GeoPoint, decision: GeofenceDecision) -> CheckOutcome {
        let dispatch = dispatch_commands(&self.channel, &decision.commands).await;
        let summary = dispatch.summary(decision.distance_meters);
        if let Some(summary) = &summary {
            self.notifier.notify(ACTIVATION_TITLE, summary);
        }
        CheckOutcome {
            sample,
            decision,
            dispatch,
            summary,
        }
    }

    /// Stores the current position as the new home location.
    pub async fn set_home_from_current_position(&self) -> Result<GeoPoint, AutomationError> {
        let sample = self.sample().await?;
        self.settings
            .lock()
            .await
            .set_home_location(&sample)
            .map_err(AutomationError::HomeNotSaved)?;
        log::info!("home location set to {sample:?}");
        Ok(sample)
    }

    /// Checks the zone every `interval` while automatic checking is enabled.
    pub fn spawn_polling(&self, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut poll_interval = tokio::time::interval(interval);
            poll_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                poll_interval.tick().await;
                monitor.poll().await;
            }
        })
    }

    async fn poll(&self) {
        let auto_check = self.settings.lock().await.auto_check();
        match auto_check {
            Ok(true) => {}
            Ok(false) => {
                log::trace!("automatic location check disabled");
                return;
            }
            Err(e) => {
                log::error!("could not read auto check flag: {e:#}");
                return;
            }
        }

        match self.check().await {
            Ok(outcome) => {
                log::trace!("poll done: {:?}", outcome.decision);
            }
            Err(e @ (AutomationError::PositionUnavailable(_) | AutomationError::HomeNotConfigured)) => {
                log::warn!("skipping zone check: {e}");
            }
            Err(e) => {
                log::error!("zone check failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;
    use crate::{
        device::{Device, DeviceState},
        dispatch::LogNotifier,
        location::FixedPositionSource,
        memory_store::MemoryStore,
        store::WAS_IN_HOME_ZONE_KEY,
    };

    const HOME: GeoPoint = GeoPoint {
        latitude: 44.4268,
        longitude: 26.1025,
    };

    #[derive(Default)]
    struct RecordingChannel {
        sent: StdMutex<Vec<(Device, DeviceState)>>,
    }

    #[async_trait]
    impl DeviceCommandChannel for RecordingChannel {
        async fn set_device_state(&self, device: Device, state: DeviceState) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push((device, state));
            Ok(())
        }
    }

    /// Fails writes of the zone membership a set number of times.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failures_left: Arc<StdMutex<u32>>,
    }

    impl KeyByteValueStore for FlakyStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
            let mut left = self.failures_left.lock().unwrap();
            if key == WAS_IN_HOME_ZONE_KEY && *left > 0 {
                *left -= 1;
                return Err(anyhow!("disk full"));
            }
            self.inner.set(key, value)
        }

        fn delete(&mut self, key: &str) -> anyhow::Result<()> {
            self.inner.delete(key)
        }
    }

    fn monitor_at<S: KeyByteValueStore + 'static>(
        store: S,
        position: GeoPoint,
    ) -> (ZoneMonitor<S>, Arc<RecordingChannel>) {
        let channel = Arc::new(RecordingChannel::default());
        let monitor = ZoneMonitor::new(
            store,
            Arc::new(FixedPositionSource::new(position)),
            channel.clone(),
            Arc::new(LogNotifier),
        );
        (monitor, channel)
    }

    #[tokio::test]
    async fn refuses_without_home() {
        let (monitor, channel) = monitor_at(MemoryStore::new(), HOME);
        let err = monitor.check_now().await.unwrap_err();
        assert!(matches!(err, AutomationError::HomeNotConfigured));
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_sample_changes_nothing() {
        let store = MemoryStore::new();
        let (monitor, _) = monitor_at(store.clone(), GeoPoint::new(f64::NAN, 0.));
        monitor.settings().lock().await.set_home_location(&HOME).unwrap();

        let err = monitor.check_now().await.unwrap_err();
        assert!(matches!(err, AutomationError::PositionUnavailable(_)));
        assert_eq!(store.get(WAS_IN_HOME_ZONE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn persistence_failure_carries_decision_and_retry_fires() {
        let store = FlakyStore {
            failures_left: Arc::new(StdMutex::new(1)),
            ..Default::default()
        };
        let (monitor, channel) = monitor_at(store.clone(), HOME);
        {
            let settings = monitor.settings();
            let mut settings = settings.lock().await;
            settings.set_home_location(&HOME).unwrap();
            settings.set_toggle(Device::Lamp, true).unwrap();
        }

        let (sample, decision) = match monitor.check_now().await {
            Err(AutomationError::PersistenceFailure { sample, decision, .. }) => (sample, decision),
            other => panic!("expected persistence failure, got {other:?}"),
        };
        assert!(decision.crossed_into_zone);
        assert!(channel.sent.lock().unwrap().is_empty());

        let outcome = monitor.retry_persist(sample, decision).await.unwrap();
        assert!(outcome.dispatch.all_succeeded());
        assert_eq!(*channel.sent.lock().unwrap(), vec![(Device::Lamp, DeviceState::On)]);
        assert!(HomeSettings::new(store).was_in_home_zone().unwrap());
    }

    #[tokio::test]
    async fn retry_after_someone_else_recorded_does_not_fire_again() {
        let (monitor, channel) = monitor_at(MemoryStore::new(), HOME);
        {
            let settings = monitor.settings();
            let mut settings = settings.lock().await;
            settings.set_home_location(&HOME).unwrap();
            settings.set_toggle(Device::Led, true).unwrap();
        }

        let first = monitor.check_now().await.unwrap();
        assert_eq!(channel.sent.lock().unwrap().len(), 1);

        let outcome = monitor.retry_persist(HOME, first.decision).await.unwrap();
        assert!(outcome.dispatch.is_empty());
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn set_home_uses_current_position() {
        let here = GeoPoint::new(0., 0.);
        let (monitor, _) = monitor_at(MemoryStore::new(), here);
        assert_eq!(monitor.set_home_from_current_position().await.unwrap(), here);
        assert_eq!(
            monitor.settings().lock().await.home_location().unwrap(),
            Some(here)
        );
    }
}
