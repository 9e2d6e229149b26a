//! Geofence-triggered home automation.
//!
//! The [`engine`] decides, from the saved home location and a position
//! sample, whether arriving home should switch devices on. The
//! [`monitor`] wires it to durable settings, a position source and a device
//! command channel, for both on-demand and periodic checks.

pub mod device;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod file_store;
pub mod location;
pub mod memory_store;
pub mod monitor;
pub mod schedule;
pub mod store;
pub mod zone;

pub use device::{AutomationToggles, Device, DeviceState};
pub use engine::{GeofenceAutomationEngine, GeofenceDecision};
pub use error::AutomationError;
pub use location::{distance_meters, GeoPoint, PositionError, PositionSource};
pub use monitor::{CheckOutcome, ZoneMonitor};
pub use zone::{evaluate_crossing, ZoneCrossing, HOME_RADIUS_METERS};

pub fn init_logging(cfg: &dyn homezone_config::Config) {
    let rust_log_config = cfg.get(homezone_config::RUST_LOG).ok();
    let mut logger_builder = env_logger::builder();
    if let Some(rust_log) = rust_log_config {
        logger_builder.parse_filters(&rust_log);
    } else {
        logger_builder.filter_level(log::LevelFilter::Info);
    }
    logger_builder.init();
    log::debug!("max logging level is: {}.", log::max_level());
}
