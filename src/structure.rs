use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// 3D coordinate vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Calculate Euclidean distance to another coordinate
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Axis-aligned periodic simulation box.
///
/// Only orthogonal boxes are supported. Every axis must have `max > min`,
/// which is checked once in [`SimulationBox::new`] so that [`SimulationBox::wrap`]
/// is total for any finite input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationBox {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    z_min: f64,
    z_max: f64,
}

impl SimulationBox {
    pub fn new(
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        z_min: f64,
        z_max: f64,
    ) -> Result<Self> {
        for (axis, min, max) in [("x", x_min, x_max), ("y", y_min, y_max), ("z", z_min, z_max)] {
            if !min.is_finite() || !max.is_finite() {
                return Err(Error::InvalidBox(format!(
                    "{} bounds must be finite, got [{}, {})",
                    axis, min, max
                )));
            }
            if max <= min {
                return Err(Error::InvalidBox(format!(
                    "{} extent must be positive, got [{}, {})",
                    axis, min, max
                )));
            }
        }

        Ok(Self { x_min, x_max, y_min, y_max, z_min, z_max })
    }

    /// Cubic box `[min, max)` along all three axes
    pub fn cubic(min: f64, max: f64) -> Result<Self> {
        Self::new(min, max, min, max, min, max)
    }

    pub fn x_length(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn y_length(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn z_length(&self) -> f64 {
        self.z_max - self.z_min
    }

    pub fn lower(&self) -> Coordinate {
        Coordinate::new(self.x_min, self.y_min, self.z_min)
    }

    pub fn upper(&self) -> Coordinate {
        Coordinate::new(self.x_max, self.y_max, self.z_max)
    }

    /// Map a position to its periodic image inside `[min, max)` on every axis
    pub fn wrap(&self, position: &Coordinate) -> Coordinate {
        Coordinate::new(
            wrap_axis(position.x, self.x_min, self.x_max),
            wrap_axis(position.y, self.y_min, self.y_max),
            wrap_axis(position.z, self.z_min, self.z_max),
        )
    }
}

fn wrap_axis(value: f64, min: f64, max: f64) -> f64 {
    let wrapped = (value - min).rem_euclid(max - min) + min;
    // rem_euclid can round up to the period for tiny negative offsets
    if wrapped >= max {
        min
    } else {
        wrapped
    }
}

/// One atom record of a trajectory frame.
///
/// Two atoms are equal when they share the same `atom_id`, whatever their
/// type or position.
#[derive(Debug, Clone, Copy)]
pub struct Atom {
    pub atom_id: i64,
    pub atom_type: i64,
    pub position: Coordinate,
}

impl Atom {
    pub fn new(atom_id: i64, atom_type: i64, position: Coordinate) -> Self {
        Self { atom_id, atom_type, position }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.atom_id == other.atom_id
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.atom_id.hash(state);
    }
}

/// Memoized distances keyed by the unordered pair of atom ids.
///
/// An entry is written the first time a pair is requested and never changes
/// afterwards, so `distance(a, b)` and `distance(b, a)` share one entry.
#[derive(Debug, Default, Clone)]
pub struct PairDistanceCache {
    distances: HashMap<(i64, i64), f64>,
}

impl PairDistanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distance(&mut self, a: &Atom, b: &Atom) -> f64 {
        let key = if a.atom_id <= b.atom_id {
            (a.atom_id, b.atom_id)
        } else {
            (b.atom_id, a.atom_id)
        };
        *self
            .distances
            .entry(key)
            .or_insert_with(|| a.position.distance_to(&b.position))
    }

    /// Number of distinct pairs stored
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// Drop every stored distance
    pub fn clear(&mut self) {
        self.distances.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_distance() {
        let c1 = Coordinate::new(0.0, 0.0, 0.0);
        let c2 = Coordinate::new(3.0, 4.0, 0.0);
        assert_eq!(c1.distance_to(&c2), 5.0);
    }

    #[test]
    fn test_box_rejects_non_positive_extent() {
        assert!(matches!(
            SimulationBox::new(0.0, 0.0, 0.0, 1.0, 0.0, 1.0),
            Err(Error::InvalidBox(_))
        ));
        assert!(matches!(
            SimulationBox::new(0.0, 1.0, 2.0, 1.0, 0.0, 1.0),
            Err(Error::InvalidBox(_))
        ));
        assert!(matches!(
            SimulationBox::new(0.0, 1.0, 0.0, 1.0, 0.0, f64::NAN),
            Err(Error::InvalidBox(_))
        ));
        assert!(SimulationBox::new(-1.0, 1.0, 0.0, 2.0, 5.0, 6.0).is_ok());
    }

    #[test]
    fn test_wrap_stays_in_box() {
        let cell = SimulationBox::new(-1.5, 3.5, 0.0, 10.0, 2.0, 2.25).unwrap();
        let inputs = [
            Coordinate::new(0.0, 0.0, 2.0),
            Coordinate::new(3.499, 9.999, 2.2),
            Coordinate::new(-1.5, 10.0, 2.25),
            Coordinate::new(1234.567, -987.65, 1e6),
            Coordinate::new(-1e-17, -1e-17, -1e-17),
            Coordinate::new(-4.0e5, 33.3, -71.01),
        ];

        for p in inputs {
            let w = cell.wrap(&p);
            assert!(w.x >= -1.5 && w.x < 3.5, "x out of box: {:?}", w);
            assert!(w.y >= 0.0 && w.y < 10.0, "y out of box: {:?}", w);
            assert!(w.z >= 2.0 && w.z < 2.25, "z out of box: {:?}", w);
        }
    }

    #[test]
    fn test_wrap_values() {
        let cell = SimulationBox::cubic(0.0, 10.0).unwrap();
        assert_eq!(cell.wrap(&Coordinate::new(0.0, 10.0, -2.0)), Coordinate::new(0.0, 0.0, 8.0));
        assert_eq!(cell.wrap(&Coordinate::new(25.0, -35.0, 4.5)), Coordinate::new(5.0, 5.0, 4.5));

        let shifted = SimulationBox::cubic(-5.0, 5.0).unwrap();
        assert_eq!(shifted.wrap(&Coordinate::new(-5.0, -5.0, -5.0)), shifted.lower());
    }

    #[test]
    fn test_wrap_is_idempotent() {
        let cell = SimulationBox::new(0.0, 7.3, 0.0, 2.0, 0.0, 11.0).unwrap();
        let shifted = SimulationBox::new(-3.1, 4.2, 1.0, 2.0, -50.0, -10.0).unwrap();
        let inputs = [
            Coordinate::new(15.2, -3.7, 100.25),
            Coordinate::new(-0.001, 1.999, 0.0),
            Coordinate::new(-73.0, 4.0e3, -12.5),
        ];

        for p in inputs {
            let once = cell.wrap(&p);
            assert_eq!(cell.wrap(&once), once);

            let once = shifted.wrap(&p);
            assert_eq!(shifted.wrap(&once), once);
        }
    }

    #[test]
    fn test_atom_identity() {
        let a = Atom::new(7, 1, Coordinate::new(0.0, 0.0, 0.0));
        let b = Atom::new(7, 2, Coordinate::new(1.0, 2.0, 3.0));
        let c = Atom::new(8, 1, Coordinate::new(0.0, 0.0, 0.0));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: std::collections::HashSet<Atom> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_pair_cache_is_symmetric() {
        let a = Atom::new(3, 1, Coordinate::new(0.0, 0.0, 0.0));
        let b = Atom::new(1, 1, Coordinate::new(0.0, 3.0, 4.0));
        let mut cache = PairDistanceCache::new();
        assert!(cache.is_empty());

        assert_eq!(cache.distance(&a, &b), 5.0);
        assert_eq!(cache.distance(&b, &a), 5.0);
        assert_eq!(cache.len(), 1);

        // Entries are written once, a moved atom with the same id keeps the cached value
        let moved = Atom::new(1, 1, Coordinate::new(10.0, 0.0, 0.0));
        assert_eq!(cache.distance(&a, &moved), 5.0);
    }
}
