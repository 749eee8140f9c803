#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Convergence detection for deposition lattices.
//!
//! The detector scans every converging lattice once per tick and signals the
//! world the first time a lattice is completely filled with settled deposits.

use cvd_walkthrough_core::{ChamberId, ChamberPhase, Command, Epoch, Event, LatticeView};
use tracing::debug;

/// Reports whether every slot is occupied by a particle resting on its target.
#[must_use]
pub fn all_settled(view: &LatticeView) -> bool {
    let tolerance = view.tolerance();
    view.iter().all(|slot| {
        slot.occupant
            .is_some_and(|(_, position)| position.distance(slot.target) <= tolerance)
    })
}

/// Pure system that emits a single convergence declaration per chamber epoch.
#[derive(Debug, Default)]
pub struct Convergence {
    signaled: Vec<(ChamberId, Epoch)>,
}

impl Convergence {
    /// Creates a detector that has not signalled any chamber yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes world events and lattice views to emit convergence commands.
    ///
    /// Lattices are only evaluated when the batch advanced time, so the
    /// signal lands in the tick the last deposit reached its slot.
    pub fn handle(&mut self, events: &[Event], lattices: &[LatticeView], out: &mut Vec<Command>) {
        let mut ticked = false;
        for event in events {
            match event {
                Event::ChamberReset { chamber, .. } => {
                    self.signaled.retain(|(signaled, _)| signaled != chamber);
                }
                Event::TimeAdvanced { .. } => ticked = true,
                _ => {}
            }
        }

        if !ticked {
            return;
        }

        for view in lattices {
            if view.phase() != ChamberPhase::Converging {
                continue;
            }

            let key = (view.chamber(), view.epoch());
            if self.signaled.contains(&key) || !all_settled(view) {
                continue;
            }

            debug!(chamber = ?view.chamber(), epoch = view.epoch().get(), "lattice filled");
            self.signaled.push(key);
            out.push(Command::DeclareConverged {
                chamber: view.chamber(),
                epoch: view.epoch(),
            });
        }
    }

    /// Reports whether the detector already signalled the chamber's epoch.
    #[must_use]
    pub fn has_signaled(&self, chamber: ChamberId, epoch: Epoch) -> bool {
        self.signaled.contains(&(chamber, epoch))
    }
}

#[cfg(test)]
mod tests {
    use cvd_walkthrough_core::{LatticeIndex, ParticleId, SlotSnapshot, Vec3};

    use super::*;

    fn view(occupant: Option<Vec3>) -> LatticeView {
        LatticeView::new(
            ChamberId::Deposition1,
            Epoch::default(),
            ChamberPhase::Converging,
            1e-5,
            vec![SlotSnapshot {
                slot: LatticeIndex::new(0, 0),
                target: Vec3::ONE,
                occupant: occupant.map(|position| (ParticleId::new(0), position)),
            }],
        )
    }

    #[test]
    fn empty_slot_is_not_settled() {
        assert!(!all_settled(&view(None)));
    }

    #[test]
    fn occupant_within_tolerance_is_settled() {
        assert!(all_settled(&view(Some(Vec3::ONE))));
        assert!(all_settled(&view(Some(Vec3::new(1.0, 1.0, 1.000_001)))));
        assert!(!all_settled(&view(Some(Vec3::new(1.0, 1.0, 1.01)))));
    }
}
