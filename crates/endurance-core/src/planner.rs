//! Decides how many units a cycle writes

use crate::config::UnitCount;
use crate::error::{Error, Result};
use crate::volume::Volume;
use std::path::Path;

/// Sizes a cycle from the configured unit count or the volume's free space
#[derive(Debug, Clone, Copy)]
pub struct CapacityPlanner {
    unit_size: u64,
    safety_margin: u64,
}

impl CapacityPlanner {
    /// Create a planner for units of `unit_size` bytes, keeping
    /// `safety_margin` bytes free
    pub fn new(unit_size: u64, safety_margin: u64) -> Self {
        Self {
            unit_size,
            safety_margin,
        }
    }

    /// Number of whole units to write into `dir`
    ///
    /// `Fixed(n)` is returned as-is. `Auto` queries the volume and returns
    /// `floor((free - margin) / unit_size)`, failing with
    /// [`Error::InsufficientSpace`] when not even one unit fits.
    pub fn plan<V: Volume + ?Sized>(&self, volume: &V, dir: &Path, request: UnitCount) -> Result<u64> {
        if self.unit_size == 0 {
            return Err(Error::InvalidConfig(
                "unit size must be greater than zero".to_string(),
            ));
        }

        match request {
            UnitCount::Fixed(0) => Err(Error::InvalidConfig(
                "unit count must be greater than zero".to_string(),
            )),
            UnitCount::Fixed(n) => Ok(n),
            UnitCount::Auto => {
                let available = volume.available_space(dir)?;
                let units = available.saturating_sub(self.safety_margin) / self.unit_size;
                tracing::debug!(
                    "Planned {} units: {} bytes free, {} reserved, {} per unit",
                    units,
                    available,
                    self.safety_margin,
                    self.unit_size
                );
                if units == 0 {
                    return Err(Error::InsufficientSpace {
                        available,
                        margin: self.safety_margin,
                        unit_size: self.unit_size,
                    });
                }
                Ok(units)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::MockVolume;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn volume_with_free(bytes: u64) -> MockVolume {
        let mut volume = MockVolume::new();
        volume
            .expect_available_space()
            .returning(move |_| Ok(bytes));
        volume
    }

    #[test]
    fn test_fixed_returns_count_without_querying() {
        let mut volume = MockVolume::new();
        volume.expect_available_space().never();

        let planner = CapacityPlanner::new(GIB, 2 * GIB);
        assert_eq!(
            planner
                .plan(&volume, Path::new("/data"), UnitCount::Fixed(7))
                .unwrap(),
            7
        );
    }

    #[test]
    fn test_fixed_zero_is_invalid() {
        let volume = MockVolume::new();
        let planner = CapacityPlanner::new(GIB, 0);
        assert!(matches!(
            planner.plan(&volume, Path::new("/data"), UnitCount::Fixed(0)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_auto_floors_after_margin() {
        // 10.5 GiB free, 2 GiB margin, 1 GiB units -> 8
        let volume = volume_with_free(10 * GIB + GIB / 2);
        let planner = CapacityPlanner::new(GIB, 2 * GIB);
        assert_eq!(
            planner.plan(&volume, Path::new("/data"), UnitCount::Auto).unwrap(),
            8
        );
    }

    #[test]
    fn test_auto_bound_holds() {
        let unit = 3 * 1024 * 1024;
        let margin = 5 * 1024 * 1024;
        for free in [margin + unit, 100 * 1024 * 1024, 7 * GIB + 12345] {
            let volume = volume_with_free(free);
            let planner = CapacityPlanner::new(unit, margin);
            let n = planner.plan(&volume, Path::new("/data"), UnitCount::Auto).unwrap();
            assert!(n * unit <= free - margin);
            assert!((n + 1) * unit > free - margin);
        }
    }

    #[test]
    fn test_auto_insufficient_space() {
        // Scenario: 1.5 GiB free, 2 GiB margin, 1 GiB units
        let volume = volume_with_free(GIB + GIB / 2);
        let planner = CapacityPlanner::new(GIB, 2 * GIB);
        match planner.plan(&volume, Path::new("/data"), UnitCount::Auto) {
            Err(Error::InsufficientSpace {
                available,
                margin,
                unit_size,
            }) => {
                assert_eq!(available, GIB + GIB / 2);
                assert_eq!(margin, 2 * GIB);
                assert_eq!(unit_size, GIB);
            }
            other => panic!("expected InsufficientSpace, got {:?}", other),
        }
    }

    #[test]
    fn test_auto_less_than_one_unit_after_margin() {
        let volume = volume_with_free(2 * GIB + GIB / 2);
        let planner = CapacityPlanner::new(GIB, 2 * GIB);
        assert!(matches!(
            planner.plan(&volume, Path::new("/data"), UnitCount::Auto),
            Err(Error::InsufficientSpace { .. })
        ));
    }

    #[test]
    fn test_auto_zero_margin_exact_fit() {
        let volume = volume_with_free(4 * GIB);
        let planner = CapacityPlanner::new(GIB, 0);
        assert_eq!(
            planner.plan(&volume, Path::new("/data"), UnitCount::Auto).unwrap(),
            4
        );
    }

    #[test]
    fn test_auto_propagates_query_error() {
        let mut volume = MockVolume::new();
        volume.expect_available_space().returning(|_| {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "gone",
            )))
        });

        let planner = CapacityPlanner::new(GIB, 0);
        assert!(matches!(
            planner.plan(&volume, Path::new("/data"), UnitCount::Auto),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_zero_unit_size_is_invalid() {
        let volume = MockVolume::new();
        let planner = CapacityPlanner::new(0, 0);
        assert!(matches!(
            planner.plan(&volume, Path::new("/data"), UnitCount::Auto),
            Err(Error::InvalidConfig(_))
        ));
    }
}
