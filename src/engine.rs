use crate::{
    device::{build_activation_commands, AutomationToggles, DeviceCommand},
    location::{distance_meters, GeoPoint},
    zone::{evaluate_crossing, HOME_RADIUS_METERS},
};

/// Outcome of one geofence evaluation. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceDecision {
    pub crossed_into_zone: bool,
    pub crossed_out_of_zone: bool,
    /// Commands to issue; only ever non-empty when `crossed_into_zone`.
    pub commands: Vec<DeviceCommand>,
    pub distance_meters: f64,
    /// Zone membership to persist.
    pub is_inside: bool,
}

/// Decides what arriving at or leaving home should trigger.
///
/// The engine holds no zone state of its own: the previous membership goes
/// in as `was_inside` and the new one comes out as
/// [`GeofenceDecision::is_inside`].
#[derive(Debug, Clone, Copy)]
pub struct GeofenceAutomationEngine {
    radius_meters: f64,
}

impl Default for GeofenceAutomationEngine {
    fn default() -> Self {
        Self {
            radius_meters: HOME_RADIUS_METERS,
        }
    }
}

impl GeofenceAutomationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &self,
        home: &GeoPoint,
        sample: &GeoPoint,
        toggles: &AutomationToggles,
        was_inside: bool,
    ) -> GeofenceDecision {
        let distance = distance_meters(sample, home);
        let crossing = evaluate_crossing(distance, self.radius_meters, was_inside);
        log::debug!("distance to home: {distance:.1} m, {crossing:?}");

        let commands = if crossing.crossed_in {
            build_activation_commands(toggles)
        } else {
            Vec::new()
        };

        GeofenceDecision {
            crossed_into_zone: crossing.crossed_in,
            crossed_out_of_zone: crossing.crossed_out,
            commands,
            distance_meters: distance,
            is_inside: crossing.membership(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceState};

    const HOME: GeoPoint = GeoPoint {
        latitude: 44.4268,
        longitude: 26.1025,
    };

    fn all_on() -> AutomationToggles {
        AutomationToggles {
            lamp: true,
            led: true,
            priza: true,
            barrier: true,
        }
    }

    #[test]
    fn arriving_fires_once() {
        let engine = GeofenceAutomationEngine::new();

        let first = engine.evaluate(&HOME, &HOME, &all_on(), false);
        assert!(first.crossed_into_zone);
        assert!(first.is_inside);
        assert_eq!(first.commands.len(), 4);
        assert_eq!(first.commands[3], (Device::Barrier, DeviceState::Open));

        let second = engine.evaluate(&HOME, &HOME, &all_on(), first.is_inside);
        assert!(!second.crossed_into_zone);
        assert!(second.is_inside);
        assert!(second.commands.is_empty());
    }

    #[test]
    fn leaving_updates_membership_without_commands() {
        let engine = GeofenceAutomationEngine::new();
        let away = GeoPoint::new(44.4368, 26.1025);

        let d = engine.evaluate(&HOME, &away, &all_on(), true);
        assert!(d.crossed_out_of_zone);
        assert!(!d.is_inside);
        assert!(d.commands.is_empty());
        assert!(d.distance_meters > 1000.);
    }

    #[test]
    fn crossing_without_toggles_still_enters() {
        let engine = GeofenceAutomationEngine::new();
        let d = engine.evaluate(&HOME, &HOME, &AutomationToggles::default(), false);
        assert!(d.crossed_into_zone);
        assert!(d.is_inside);
        assert!(d.commands.is_empty());
    }

    #[test]
    fn equatorial_home_is_a_real_home() {
        let engine = GeofenceAutomationEngine::new();
        let origin = GeoPoint::new(0., 0.);
        let d = engine.evaluate(&origin, &GeoPoint::new(0.0005, 0.), &all_on(), false);
        assert!(d.is_inside);
        assert!(d.crossed_into_zone);
    }
}
