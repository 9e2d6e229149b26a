use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::device::{Device, DeviceCommand, DeviceState};

/// Where device state changes are sent, e.g. the realtime database.
#[async_trait]
pub trait DeviceCommandChannel: Send + Sync {
    async fn set_device_state(&self, device: Device, state: DeviceState) -> anyhow::Result<()>;
}

/// Receives user facing messages. Delivery is up to the implementation.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Only logs what it would have written. Used when no database is wired up.
#[derive(Debug, Default, Clone)]
pub struct LoggingCommandChannel;

#[async_trait]
impl DeviceCommandChannel for LoggingCommandChannel {
    async fn set_device_state(&self, device: Device, state: DeviceState) -> anyhow::Result<()> {
        log::info!("{} = \"{state}\"", device.state_path());
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        log::info!("{title}: {body}");
    }
}

/// Per device result of sending a batch of commands.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub succeeded: Vec<DeviceCommand>,
    pub failed: Vec<(Device, String)>,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Summary of a batch where some commands may have failed.
    pub fn summary(&self, distance_meters: f64) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut lines = Vec::new();
        if !self.succeeded.is_empty() {
            let devices: Vec<_> = self.succeeded.iter().map(|(d, _)| d.label()).collect();
            lines.push(format!("Activated: {}", devices.join(", ")));
        }
        if !self.failed.is_empty() {
            let devices: Vec<_> = self.failed.iter().map(|(d, _)| d.label()).collect();
            lines.push(format!("Failed: {}", devices.join(", ")));
        }
        lines.push(format!("Distance: {distance_meters:.1} m"));
        Some(lines.join("\n"))
    }
}

/// Sends all `commands` concurrently. A failing command doesn't stop the
/// others and nothing is retried.
pub async fn dispatch_commands(
    channel: &Arc<dyn DeviceCommandChannel>,
    commands: &[DeviceCommand],
) -> DispatchReport {
    let sends = commands
        .iter()
        .map(|(device, state)| async move {
            let result = channel.set_device_state(*device, *state).await;
            ((*device, *state), result)
        });

    let mut report = DispatchReport::default();
    for (command, result) in join_all(sends).await {
        match result {
            Ok(()) => report.succeeded.push(command),
            Err(e) => {
                log::warn!("failed to set {} to {}: {e:#}", command.0, command.1);
                report.failed.push((command.0, format!("{e:#}")));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakyChannel {
        broken: Vec<Device>,
        sent: Mutex<Vec<DeviceCommand>>,
    }

    #[async_trait]
    impl DeviceCommandChannel for FlakyChannel {
        async fn set_device_state(&self, device: Device, state: DeviceState) -> anyhow::Result<()> {
            if self.broken.contains(&device) {
                anyhow::bail!("{device} offline");
            }
            self.sent.lock().unwrap().push((device, state));
            Ok(())
        }
    }

    #[tokio::test]
    async fn partial_failure_keeps_the_rest() {
        let channel = Arc::new(FlakyChannel {
            broken: vec![Device::Led],
            ..Default::default()
        });
        let dyn_channel: Arc<dyn DeviceCommandChannel> = channel.clone();
        let commands = [
            (Device::Lamp, DeviceState::On),
            (Device::Led, DeviceState::On),
            (Device::Barrier, DeviceState::Open),
        ];

        let report = dispatch_commands(&dyn_channel, &commands).await;

        assert!(!report.all_succeeded());
        assert_eq!(
            report.succeeded,
            vec![(Device::Lamp, DeviceState::On), (Device::Barrier, DeviceState::Open)]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Device::Led);
        assert!(report.failed[0].1.contains("offline"));
        assert_eq!(channel.sent.lock().unwrap().len(), 2);
        assert_eq!(
            report.summary(10.).unwrap(),
            "Activated: Lamp, Barrier\nFailed: LED\nDistance: 10.0 m"
        );
    }

    #[tokio::test]
    async fn nothing_to_send() {
        let channel: Arc<dyn DeviceCommandChannel> = Arc::new(LoggingCommandChannel);
        let report = dispatch_commands(&channel, &[]).await;
        assert!(report.is_empty());
        assert_eq!(report.summary(0.), None);
    }
}
