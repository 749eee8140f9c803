//! Slot assignment table mapping lattice slots to occupying particles.

use cvd_walkthrough_core::{AssignmentError, LatticeIndex, ParticleId};

/// Dense table recording which particle occupies each lattice slot.
///
/// The table only holds back-references: the owning chamber controls particle
/// lifetimes and must vacate a particle's slot before dropping the particle.
#[derive(Clone, Debug)]
pub struct SlotTable {
    columns: u32,
    cells: Vec<Option<ParticleId>>,
    occupied: usize,
}

impl SlotTable {
    /// Creates an empty table with `rows * columns` slots.
    #[must_use]
    pub fn new(rows: u32, columns: u32) -> Self {
        let capacity_u64 = u64::from(rows) * u64::from(columns);
        let capacity = usize::try_from(capacity_u64).unwrap_or(0);
        Self {
            columns,
            cells: vec![None; capacity],
            occupied: 0,
        }
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Number of slots currently holding a particle.
    #[must_use]
    pub const fn occupied(&self) -> usize {
        self.occupied
    }

    /// Reports whether every slot holds a particle.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.occupied >= self.cells.len()
    }

    /// Returns the particle occupying the provided slot, if any.
    #[must_use]
    pub fn occupant(&self, index: LatticeIndex) -> Option<ParticleId> {
        self.flat_index(index)
            .and_then(|flat| self.cells.get(flat).copied().flatten())
    }

    /// Assigns the particle to the first free slot at or after `probe`.
    ///
    /// The scan wraps from the last slot back to the first. On failure the
    /// table is left untouched.
    pub fn try_assign(
        &mut self,
        particle: ParticleId,
        probe: usize,
    ) -> Result<LatticeIndex, AssignmentError> {
        let capacity = self.cells.len();
        if capacity == 0 || self.is_full() {
            return Err(AssignmentError::TableFull);
        }

        let start = probe % capacity;
        for offset in 0..capacity {
            let flat = (start + offset) % capacity;
            let cell = &mut self.cells[flat];
            if cell.is_none() {
                *cell = Some(particle);
                self.occupied += 1;
                return Ok(self.index_of(flat));
            }
        }

        Err(AssignmentError::TableFull)
    }

    /// Clears the provided slot, returning the particle that occupied it.
    pub fn vacate(&mut self, index: LatticeIndex) -> Option<ParticleId> {
        let flat = self.flat_index(index)?;
        let previous = self.cells.get_mut(flat)?.take();
        if previous.is_some() {
            self.occupied -= 1;
        }
        previous
    }

    /// Empties every slot.
    pub fn clear(&mut self) {
        self.cells.fill(None);
        self.occupied = 0;
    }

    /// Iterator over every slot and its occupant, in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (LatticeIndex, Option<ParticleId>)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(|(flat, occupant)| (self.index_of(flat), *occupant))
    }

    fn flat_index(&self, index: LatticeIndex) -> Option<usize> {
        let column = usize::try_from(index.column()).ok()?;
        let row = usize::try_from(index.row()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        if column >= width {
            return None;
        }
        let flat = row.checked_mul(width)?.checked_add(column)?;
        (flat < self.cells.len()).then_some(flat)
    }

    fn index_of(&self, flat: usize) -> LatticeIndex {
        let width = self.columns.max(1) as usize;
        LatticeIndex::new((flat / width) as u32, (flat % width) as u32)
    }
}
