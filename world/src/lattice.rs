//! Fixed grid of target positions that deposits settle onto.

use cvd_walkthrough_core::{LatticeIndex, Vec3};
use serde::{Deserialize, Serialize};

/// Dimensions and raster parameters of a deposition lattice.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatticeSettings {
    /// Number of rows in the lattice.
    pub rows: u32,
    /// Number of columns in each row.
    pub columns: u32,
    /// Position of slot `(0, 0)` in chamber-local space.
    pub origin: Vec3,
    /// Offset applied for every row advanced.
    pub row_step: Vec3,
    /// Offset applied for every column advanced within a row.
    pub column_step: Vec3,
}

impl Default for LatticeSettings {
    fn default() -> Self {
        Self {
            rows: 30,
            columns: 30,
            origin: Vec3::new(0.015, 0.0, 0.0),
            row_step: Vec3::new(0.0, 0.02, 0.0),
            column_step: Vec3::new(0.0, 0.0, -0.02),
        }
    }
}

impl LatticeSettings {
    /// Number of slots the settings describe.
    #[must_use]
    pub fn capacity(&self) -> usize {
        let capacity = u64::from(self.rows) * u64::from(self.columns);
        usize::try_from(capacity).unwrap_or(usize::MAX)
    }
}

/// Immutable, row-major sequence of lattice target positions.
#[derive(Clone, Debug, PartialEq)]
pub struct Lattice {
    rows: u32,
    columns: u32,
    positions: Vec<Vec3>,
}

impl Lattice {
    /// Generates the lattice with a raster scan.
    ///
    /// The scan advances along the column axis by `column_step`, then resets
    /// the column and advances along the row axis by `row_step`. The result
    /// holds exactly `rows * columns` positions.
    #[must_use]
    pub fn generate(
        rows: u32,
        columns: u32,
        row_step: Vec3,
        column_step: Vec3,
        origin: Vec3,
    ) -> Self {
        let capacity = u64::from(rows) * u64::from(columns);
        let mut positions = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));
        for row in 0..rows {
            let row_origin = origin + row_step * row as f32;
            for column in 0..columns {
                positions.push(row_origin + column_step * column as f32);
            }
        }

        Self {
            rows,
            columns,
            positions,
        }
    }

    /// Generates the lattice described by the provided settings.
    #[must_use]
    pub fn from_settings(settings: &LatticeSettings) -> Self {
        Self::generate(
            settings.rows,
            settings.columns,
            settings.row_step,
            settings.column_step,
            settings.origin,
        )
    }

    /// Number of rows in the lattice.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of columns in each row.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.positions.len()
    }

    /// Target position of the provided slot, if it lies inside the lattice.
    #[must_use]
    pub fn position(&self, index: LatticeIndex) -> Option<Vec3> {
        self.flat_index(index)
            .and_then(|flat| self.positions.get(flat).copied())
    }

    /// Converts a slot index into its row-major offset.
    #[must_use]
    pub fn flat_index(&self, index: LatticeIndex) -> Option<usize> {
        if index.row() < self.rows && index.column() < self.columns {
            let row = usize::try_from(index.row()).ok()?;
            let column = usize::try_from(index.column()).ok()?;
            let width = usize::try_from(self.columns).ok()?;
            Some(row * width + column)
        } else {
            None
        }
    }

    /// Iterator over every slot and its target, in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (LatticeIndex, Vec3)> + '_ {
        let columns = self.columns.max(1);
        self.positions.iter().enumerate().map(move |(flat, position)| {
            let flat = flat as u32;
            (LatticeIndex::new(flat / columns, flat % columns), *position)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lattice_holds_nine_hundred_slots() {
        let lattice = Lattice::from_settings(&LatticeSettings::default());
        assert_eq!(lattice.capacity(), 900);
        assert_eq!(LatticeSettings::default().capacity(), 900);
    }

    #[test]
    fn raster_scan_advances_columns_before_rows() {
        let lattice = Lattice::generate(
            2,
            3,
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(5.0, 0.0, 0.0),
        );

        let order: Vec<_> = lattice.iter().collect();
        assert_eq!(
            order,
            vec![
                (LatticeIndex::new(0, 0), Vec3::new(5.0, 0.0, 0.0)),
                (LatticeIndex::new(0, 1), Vec3::new(5.0, 0.0, -1.0)),
                (LatticeIndex::new(0, 2), Vec3::new(5.0, 0.0, -2.0)),
                (LatticeIndex::new(1, 0), Vec3::new(5.0, 1.0, 0.0)),
                (LatticeIndex::new(1, 1), Vec3::new(5.0, 1.0, -1.0)),
                (LatticeIndex::new(1, 2), Vec3::new(5.0, 1.0, -2.0)),
            ]
        );
    }

    #[test]
    fn out_of_range_indices_have_no_position() {
        let lattice = Lattice::from_settings(&LatticeSettings::default());
        assert!(lattice.position(LatticeIndex::new(30, 0)).is_none());
        assert!(lattice.position(LatticeIndex::new(0, 30)).is_none());
        assert!(lattice.position(LatticeIndex::new(29, 29)).is_some());
    }

    #[test]
    fn generation_is_deterministic() {
        let settings = LatticeSettings::default();
        assert_eq!(
            Lattice::from_settings(&settings),
            Lattice::from_settings(&settings)
        );
    }
}
