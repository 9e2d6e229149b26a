use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    device::{AutomationToggles, Device},
    location::GeoPoint,
};

pub const HOME_LOCATION_KEY: &str = "home/location";
pub const WAS_IN_HOME_ZONE_KEY: &str = "wasInHomeZone";
pub const AUTO_CHECK_KEY: &str = "autoCheckLocation";

/// Define an abstract key value store using `str` values as keys and `Vec<u8>` as 
/// values. 
/// 
/// The goal is to decouple durable storage (a file, device preferences, ...)
/// from the places where it's used (home location, zone membership, toggles).
pub trait KeyByteValueStore: Send {
    /// `Ok(None)` if there is no entry for `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, anyhow::Error>;
    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<(), anyhow::Error>;
    fn delete(&mut self, key: &str) -> Result<(), anyhow::Error>;

    /// Stores `value` only if `key` currently holds `expected` (`None` meaning
    /// absent). Returns whether the value was stored.
    ///
    /// Stores shared between processes must do the comparison and the write
    /// atomically.
    fn set_if(
        &mut self,
        key: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
    ) -> Result<bool, anyhow::Error> {
        if self.get(key)?.as_deref() != expected {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }
}

/// Storage key of a device's "activate on arrival" toggle.
pub fn toggle_key(device: Device) -> &'static str {
    match device {
        Device::Lamp => "autoLamp",
        Device::Led => "autoLed",
        Device::Priza => "autoPriza",
        Device::Barrier => "autoBarrier",
    }
}

/// Typed access to the automation settings kept in a `KeyByteValueStore`.
/// Values are stored as JSON.
#[derive(Debug, Default, Clone)]
pub struct HomeSettings<S>
where S: KeyByteValueStore
{
    store: S
}

impl <S> HomeSettings<S>
where S: KeyByteValueStore {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        log::trace!("reading {key}");
        match self.store.get(key)? {
            Some(raw) => {
                let value = serde_json::from_slice(&raw)
                    .with_context(|| format!("broken entry {key} in store"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        log::trace!("writing {key}");
        self.store.set(key, serde_json::to_vec(value)?)
    }

    /// `None` until a home location has been saved.
    pub fn home_location(&self) -> anyhow::Result<Option<GeoPoint>> {
        self.get_json(HOME_LOCATION_KEY)
    }

    pub fn set_home_location(&mut self, home: &GeoPoint) -> anyhow::Result<()> {
        self.set_json(HOME_LOCATION_KEY, home)
    }

    /// Last known zone membership, outside if never recorded.
    pub fn was_in_home_zone(&self) -> anyhow::Result<bool> {
        Ok(self.get_json(WAS_IN_HOME_ZONE_KEY)?.unwrap_or(false))
    }

    /// Records `is_inside` as the zone membership, but only while the stored
    /// membership still is `was_inside`. Returns `false` if some other writer
    /// changed it first.
    pub fn replace_was_in_home_zone(
        &mut self,
        was_inside: bool,
        is_inside: bool,
    ) -> anyhow::Result<bool> {
        let current = self.store.get(WAS_IN_HOME_ZONE_KEY)?;
        let stored = match &current {
            Some(raw) => serde_json::from_slice(raw)
                .with_context(|| format!("broken entry {WAS_IN_HOME_ZONE_KEY} in store"))?,
            None => false,
        };
        if stored != was_inside {
            return Ok(false);
        }
        log::trace!("writing {WAS_IN_HOME_ZONE_KEY}");
        self.store.set_if(
            WAS_IN_HOME_ZONE_KEY,
            current.as_deref(),
            serde_json::to_vec(&is_inside)?,
        )
    }

    pub fn toggles(&self) -> anyhow::Result<AutomationToggles> {
        let mut toggles = AutomationToggles::default();
        for device in Device::ALL {
            let enabled = self.get_json(toggle_key(device))?.unwrap_or(false);
            toggles.set(device, enabled);
        }
        Ok(toggles)
    }

    pub fn set_toggle(&mut self, device: Device, enabled: bool) -> anyhow::Result<()> {
        self.set_json(toggle_key(device), &enabled)
    }

    /// Whether the background driver should poll at all.
    pub fn auto_check(&self) -> anyhow::Result<bool> {
        Ok(self.get_json(AUTO_CHECK_KEY)?.unwrap_or(false))
    }

    pub fn set_auto_check(&mut self, enabled: bool) -> anyhow::Result<()> {
        self.set_json(AUTO_CHECK_KEY, &enabled)
    }
}
