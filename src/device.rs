use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// The actuators the home automation can switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Lamp,
    Led,
    /// Power outlet.
    Priza,
    Barrier,
}

impl Device {
    /// Fixed iteration order, also the order activations are reported in.
    pub const ALL: [Device; 4] = [Device::Lamp, Device::Led, Device::Priza, Device::Barrier];

    pub fn key(&self) -> &'static str {
        match self {
            Device::Lamp => "lamp",
            Device::Led => "led",
            Device::Priza => "priza",
            Device::Barrier => "barrier",
        }
    }

    /// Path of the device's state in the realtime database.
    pub fn state_path(&self) -> String {
        format!("{}/status/state", self.key())
    }

    /// State the device is put into when arriving home.
    pub fn arrival_state(&self) -> DeviceState {
        match self {
            Device::Barrier => DeviceState::Open,
            _ => DeviceState::On,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Device::Lamp => "Lamp",
            Device::Led => "LED",
            Device::Priza => "Outlet",
            Device::Barrier => "Barrier",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lamp" => Ok(Device::Lamp),
            "led" => Ok(Device::Led),
            "priza" | "outlet" => Ok(Device::Priza),
            "barrier" => Ok(Device::Barrier),
            _ => Err(anyhow!("unknown device '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceState {
    On,
    Off,
    Open,
    Close,
}

impl DeviceState {
    /// Value written to the device's state path.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::On => "ON",
            DeviceState::Off => "OFF",
            DeviceState::Open => "OPEN",
            DeviceState::Close => "CLOSE",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type DeviceCommand = (Device, DeviceState);

/// Per device "activate on arrival" flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationToggles {
    pub lamp: bool,
    pub led: bool,
    pub priza: bool,
    pub barrier: bool,
}

impl AutomationToggles {
    pub fn get(&self, device: Device) -> bool {
        match device {
            Device::Lamp => self.lamp,
            Device::Led => self.led,
            Device::Priza => self.priza,
            Device::Barrier => self.barrier,
        }
    }

    pub fn set(&mut self, device: Device, enabled: bool) {
        let flag = match device {
            Device::Lamp => &mut self.lamp,
            Device::Led => &mut self.led,
            Device::Priza => &mut self.priza,
            Device::Barrier => &mut self.barrier,
        };
        *flag = enabled;
    }

    pub fn any(&self) -> bool {
        Device::ALL.iter().any(|d| self.get(*d))
    }
}

/// Commands to send when arriving home, in [`Device::ALL`] order.
pub fn build_activation_commands(toggles: &AutomationToggles) -> Vec<DeviceCommand> {
    Device::ALL
        .iter()
        .filter(|d| toggles.get(**d))
        .map(|d| (*d, d.arrival_state()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_follow_fixed_order() {
        let toggles = AutomationToggles {
            lamp: true,
            led: false,
            priza: true,
            barrier: false,
        };
        assert_eq!(
            build_activation_commands(&toggles),
            vec![(Device::Lamp, DeviceState::On), (Device::Priza, DeviceState::On)]
        );
    }

    #[test]
    fn barrier_opens() {
        let mut toggles = AutomationToggles::default();
        toggles.set(Device::Barrier, true);
        toggles.set(Device::Led, true);
        assert_eq!(
            build_activation_commands(&toggles),
            vec![(Device::Led, DeviceState::On), (Device::Barrier, DeviceState::Open)]
        );
    }

    #[test]
    fn nothing_enabled_means_no_commands() {
        let toggles = AutomationToggles::default();
        assert!(!toggles.any());
        assert!(build_activation_commands(&toggles).is_empty());
    }

    #[test]
    fn parse_and_paths() {
        assert_eq!("Outlet".parse::<Device>().unwrap(), Device::Priza);
        assert!("toaster".parse::<Device>().is_err());
        assert_eq!(Device::Barrier.state_path(), "barrier/status/state");
        assert_eq!(
            serde_json::to_string(&DeviceState::Open).unwrap(),
            "\"OPEN\""
        );
    }
}
