use foundation::math::{Coordinate, distance_km};
use markers::marker::Marker;

use crate::config::PlacementConfig;

/// Verdict on a candidate marker location.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Decision {
    Accepted,
    /// The candidate is farther than the range limit from the user.
    RejectedOutOfRange { distance_km: f64 },
    /// The candidate is closer than the minimum separation to a marker.
    RejectedTooCloseToExisting { distance_km: f64 },
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }
}

/// Stateless placement rules.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlacementPolicy {
    pub max_range_km: f64,
    pub min_separation_km: f64,
}

impl PlacementPolicy {
    pub fn new(max_range_km: f64, min_separation_km: f64) -> Self {
        Self {
            max_range_km,
            min_separation_km,
        }
    }

    pub fn from_config(cfg: &PlacementConfig) -> Self {
        Self::new(cfg.max_range_km, cfg.min_separation_km)
    }

    /// Checks `candidate` against the range limit, then against every marker.
    ///
    /// The first failing rule wins. For the separation rule the reported
    /// distance is to the nearest offending marker, so the result does not
    /// depend on marker order.
    pub fn evaluate(
        &self,
        user_location: Coordinate,
        candidate: Coordinate,
        existing: &[Marker],
    ) -> Decision {
        let from_user = distance_km(user_location, candidate);
        if from_user > self.max_range_km {
            return Decision::RejectedOutOfRange {
                distance_km: from_user,
            };
        }

        let nearest = existing
            .iter()
            .map(|m| distance_km(m.location, candidate))
            .fold(f64::INFINITY, f64::min);
        if nearest < self.min_separation_km {
            return Decision::RejectedTooCloseToExisting {
                distance_km: nearest,
            };
        }

        Decision::Accepted
    }
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self::from_config(&PlacementConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::{Decision, PlacementPolicy};
    use foundation::ids::{MarkerId, UserId};
    use foundation::math::{Coordinate, distance_km};
    use markers::marker::Marker;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn marker_at(id: &str, at: Coordinate) -> Marker {
        Marker {
            id: MarkerId::new(id),
            location: at,
            title: String::new(),
            description: String::new(),
            owner_id: UserId::new("u1"),
            created_at: String::new(),
            image_url: None,
            address: None,
        }
    }

    #[test]
    fn accepts_within_range_on_empty_map() {
        let policy = PlacementPolicy::default();
        assert_eq!(
            policy.evaluate(c(0.0, 0.0), c(0.0, 0.0008), &[]),
            Decision::Accepted
        );
    }

    #[test]
    fn second_marker_five_meters_away_is_too_close() {
        let policy = PlacementPolicy::default();
        let user = c(0.0, 0.0);
        let first = marker_at("m1", c(0.0, 0.0008));

        let decision = policy.evaluate(user, c(0.0, 0.00085), &[first]);
        let Decision::RejectedTooCloseToExisting { distance_km } = decision else {
            panic!("expected too-close rejection, got {decision:?}");
        };
        assert!(distance_km < 0.005, "{distance_km}");
    }

    #[test]
    fn london_candidate_144m_north_is_out_of_range() {
        let policy = PlacementPolicy::default();
        let decision = policy.evaluate(c(51.5007, -0.1246), c(51.5020, -0.1246), &[]);
        assert!(matches!(
            decision,
            Decision::RejectedOutOfRange { distance_km } if distance_km > 0.14
        ));
    }

    #[test]
    fn range_is_checked_before_separation() {
        let policy = PlacementPolicy::default();
        let far = c(0.0, 0.002);
        let crowded = vec![marker_at("m1", far)];
        assert!(matches!(
            policy.evaluate(c(0.0, 0.0), far, &crowded),
            Decision::RejectedOutOfRange { .. }
        ));
    }

    #[test]
    fn exactly_at_limits_is_accepted() {
        let user = c(0.0, 0.0);
        let candidate = c(0.0, 0.0008);
        let d = distance_km(user, candidate);
        // Limits equal to the measured distances.
        let policy = PlacementPolicy::new(d, d);
        let existing = vec![marker_at("at-user", user)];
        assert_eq!(policy.evaluate(user, candidate, &existing), Decision::Accepted);
    }

    #[test]
    fn rejection_does_not_depend_on_marker_order() {
        let policy = PlacementPolicy::default();
        let user = c(10.0, 10.0);
        let candidate = c(10.0, 10.0003);
        let close = marker_at("close", c(10.0, 10.00031));
        let far_a = marker_at("a", c(10.0, 9.9996));
        let far_b = marker_at("b", c(10.0004, 10.0));

        let orders = [
            vec![close.clone(), far_a.clone(), far_b.clone()],
            vec![far_a.clone(), close.clone(), far_b.clone()],
            vec![far_a.clone(), far_b.clone(), close.clone()],
        ];
        let results: Vec<Decision> = orders
            .iter()
            .map(|markers| policy.evaluate(user, candidate, markers))
            .collect();
        assert!(results.iter().all(|d| *d == results[0]));
        assert!(matches!(results[0], Decision::RejectedTooCloseToExisting { .. }));
    }

    #[test]
    fn ring_of_candidates_classifies_by_distance() {
        let policy = PlacementPolicy::default();
        let user = c(45.0, 7.0);
        for i in 0..36 {
            let bearing = (i as f64 * 10.0).to_radians();
            for offset_deg in [0.0002, 0.0005, 0.0008, 0.0012, 0.002] {
                let candidate = c(
                    45.0 + offset_deg * bearing.cos(),
                    7.0 + offset_deg * bearing.sin(),
                );
                let d = distance_km(user, candidate);
                let decision = policy.evaluate(user, candidate, &[]);
                if d > 0.1 {
                    assert!(matches!(decision, Decision::RejectedOutOfRange { .. }), "{d}");
                } else {
                    assert_eq!(decision, Decision::Accepted, "{d}");
                }
            }
        }
    }
}
