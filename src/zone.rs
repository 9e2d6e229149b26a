/// Radius of the home zone around the saved home location.
pub const HOME_RADIUS_METERS: f64 = 150.0;

/// Zone membership of one sample relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneCrossing {
    pub is_inside: bool,
    pub crossed_in: bool,
    pub crossed_out: bool,
}

impl ZoneCrossing {
    /// The membership flag to persist after this evaluation.
    pub fn membership(&self) -> bool {
        self.is_inside
    }

    pub fn is_steady(&self) -> bool {
        !self.crossed_in && !self.crossed_out
    }
}

/// Classifies a sample `distance` meters away from home.
///
/// A sample exactly at `threshold` counts as outside.
pub fn evaluate_crossing(distance: f64, threshold: f64, was_inside: bool) -> ZoneCrossing {
    let is_inside = distance < threshold;
    ZoneCrossing {
        is_inside,
        crossed_in: is_inside && !was_inside,
        crossed_out: !is_inside && was_inside,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entering_from_outside() {
        for d in [0., 1., 99.9, 149.999] {
            let c = evaluate_crossing(d, HOME_RADIUS_METERS, false);
            assert!(c.is_inside, "{d}");
            assert!(c.crossed_in, "{d}");
            assert!(!c.crossed_out, "{d}");
        }
    }

    #[test]
    fn at_or_beyond_threshold_is_outside() {
        for (d, was_inside) in [(150., false), (150., true), (150.0001, false), (5000., true)] {
            let c = evaluate_crossing(d, HOME_RADIUS_METERS, was_inside);
            assert!(!c.is_inside, "{d}");
            assert!(!c.crossed_in, "{d}");
        }
    }

    #[test]
    fn staying_inside_does_not_cross() {
        assert_eq!(
            evaluate_crossing(100., HOME_RADIUS_METERS, true),
            ZoneCrossing {
                is_inside: true,
                crossed_in: false,
                crossed_out: false
            }
        );
    }

    #[test]
    fn leaving() {
        let c = evaluate_crossing(200., HOME_RADIUS_METERS, true);
        assert_eq!(
            c,
            ZoneCrossing {
                is_inside: false,
                crossed_in: false,
                crossed_out: true
            }
        );
        assert!(!c.membership());
    }

    #[test]
    fn staying_outside_is_steady() {
        let c = evaluate_crossing(200., HOME_RADIUS_METERS, false);
        assert!(c.is_steady());
        assert!(!c.membership());
    }
}
