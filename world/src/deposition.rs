use std::time::Duration;

use cvd_walkthrough_core::{
    ChamberId, ChamberPhase, Epoch, Event, LatticeView, ParticleId, ParticleKind, ParticleState,
    ParticleView, SlotSnapshot, Vec3,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    lattice::{Lattice, LatticeSettings},
    motion::{move_towards, step_length},
    particle::{Particle, ParticleIds},
    slots::SlotTable,
};

/// Tunable parameters of a deposition chamber.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositionSettings {
    /// Lattice the deposits settle onto.
    pub lattice: LatticeSettings,
    /// X coordinate of the donor material surface carriers travel to.
    pub donor_plane_x: f32,
    /// Speed of carriers in units per second.
    pub carrier_speed: f32,
    /// Speed of deposits travelling to their slot, in units per second.
    pub deposit_speed: f32,
    /// Deposits released by every carrier impact.
    pub fragments_per_carrier: u32,
    /// Distance within which a deposit counts as sitting on its slot.
    pub settle_epsilon: f32,
    /// Time converged deposits stay visible before they are removed, in
    /// milliseconds.
    pub fade_ms: u64,
}

impl Default for DepositionSettings {
    fn default() -> Self {
        Self {
            lattice: LatticeSettings::default(),
            donor_plane_x: 0.085,
            carrier_speed: 0.05,
            deposit_speed: 0.05,
            fragments_per_carrier: 5,
            settle_epsilon: 1e-5,
            fade_ms: 3_000,
        }
    }
}

#[derive(Debug)]
pub(crate) struct DepositionChamber {
    id: ChamberId,
    settings: DepositionSettings,
    seed: u64,
    lattice: Lattice,
    slots: SlotTable,
    particles: Vec<Particle>,
    unassigned: usize,
    faded_for: Duration,
    phase: ChamberPhase,
    epoch: Epoch,
    rng: ChaCha8Rng,
}

impl DepositionChamber {
    pub(crate) fn new(id: ChamberId, settings: DepositionSettings, seed: u64) -> Self {
        let lattice = Lattice::from_settings(&settings.lattice);
        let slots = SlotTable::new(lattice.rows(), lattice.columns());
        Self {
            id,
            settings,
            seed,
            lattice,
            slots,
            particles: Vec::new(),
            unassigned: 0,
            faded_for: Duration::ZERO,
            phase: ChamberPhase::Idle,
            epoch: Epoch::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub(crate) fn reset(&mut self, out_events: &mut Vec<Event>) {
        self.particles.clear();
        self.slots.clear();
        self.unassigned = 0;
        self.faded_for = Duration::ZERO;
        self.phase = ChamberPhase::Idle;
        self.epoch = self.epoch.next();
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        debug!(chamber = ?self.id, epoch = self.epoch.get(), "deposition chamber reset");
        out_events.push(Event::ChamberReset {
            chamber: self.id,
            epoch: self.epoch,
        });
    }

    pub(crate) fn activate(&mut self, out_events: &mut Vec<Event>) -> bool {
        if self.phase != ChamberPhase::Idle {
            debug!(chamber = ?self.id, phase = ?self.phase, "ignoring activation of busy chamber");
            return false;
        }

        self.phase = ChamberPhase::Emitting;
        info!(chamber = ?self.id, epoch = self.epoch.get(), "deposition started");
        out_events.push(Event::ChamberActivated {
            chamber: self.id,
            epoch: self.epoch,
        });
        true
    }

    pub(crate) fn emit_carrier(
        &mut self,
        epoch: Epoch,
        position: Vec3,
        ids: &mut ParticleIds,
        out_events: &mut Vec<Event>,
    ) {
        if epoch != self.epoch || self.phase != ChamberPhase::Emitting {
            debug!(
                chamber = ?self.id,
                stale = epoch.get(),
                current = self.epoch.get(),
                "discarding stale emission"
            );
            out_events.push(Event::EmissionDiscarded {
                chamber: self.id,
                epoch,
            });
            return;
        }

        let particle = Particle::new(ids.allocate(), ParticleKind::Carrier, position);
        out_events.push(Event::CarrierEmitted {
            chamber: self.id,
            particle: particle.id,
            position,
        });
        self.particles.push(particle);
    }

    pub(crate) fn end_emission(&mut self, epoch: Epoch, out_events: &mut Vec<Event>) {
        if epoch != self.epoch || self.phase != ChamberPhase::Emitting {
            return;
        }

        self.phase = ChamberPhase::Converging;
        info!(chamber = ?self.id, "emission quota reached");
        out_events.push(Event::EmissionClosed { chamber: self.id });
    }

    /// Moves the chamber to `Settled` when every slot holds a settled deposit.
    pub(crate) fn declare_converged(&mut self, epoch: Epoch, out_events: &mut Vec<Event>) -> bool {
        if epoch != self.epoch || self.phase != ChamberPhase::Converging || !self.all_settled() {
            return false;
        }

        self.phase = ChamberPhase::Settled;
        self.faded_for = Duration::ZERO;
        for particle in &mut self.particles {
            if particle.kind == ParticleKind::Deposit {
                particle.state = ParticleState::Fading;
            }
        }
        info!(chamber = ?self.id, slots = self.slots.capacity(), "lattice converged");
        out_events.push(Event::Converged { chamber: self.id });
        true
    }

    pub(crate) fn tick(
        &mut self,
        dt: Duration,
        ids: &mut ParticleIds,
        out_events: &mut Vec<Event>,
    ) {
        if dt.is_zero() || self.phase == ChamberPhase::Idle {
            return;
        }
        if self.phase == ChamberPhase::Settled {
            self.fade(dt, out_events);
            return;
        }

        let carrier_step = step_length(self.settings.carrier_speed, dt);
        let deposit_step = step_length(self.settings.deposit_speed, dt);
        let mut impacts = Vec::new();

        for particle in &mut self.particles {
            match particle.kind {
                ParticleKind::Carrier => {
                    let donor = Vec3::new(
                        self.settings.donor_plane_x,
                        particle.position.y,
                        particle.position.z,
                    );
                    particle.position = move_towards(particle.position, donor, carrier_step);
                    if particle.position == donor {
                        impacts.push((particle.id, particle.position));
                    }
                }
                ParticleKind::Deposit => {
                    let Some(target) = particle.slot.and_then(|slot| self.lattice.position(slot))
                    else {
                        continue;
                    };
                    particle.position = move_towards(particle.position, target, deposit_step);
                    if particle.state == ParticleState::Arriving
                        && particle.position.distance(target) <= self.settings.settle_epsilon
                    {
                        particle.state = ParticleState::Settled;
                    }
                }
                ParticleKind::Gas => {}
            }
        }

        for (carrier, position) in impacts {
            self.fragment(carrier, position, ids, out_events);
        }
        self.assign_pending(out_events);
    }

    /// Removes the faded deposits once the fade duration has elapsed.
    fn fade(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        if self.particles.is_empty() {
            return;
        }

        self.faded_for = self.faded_for.saturating_add(dt);
        if self.faded_for < Duration::from_millis(self.settings.fade_ms) {
            return;
        }

        let removed = self.particles.len();
        self.particles.clear();
        self.slots.clear();
        debug!(chamber = ?self.id, removed, "converged deposits faded out");
        out_events.push(Event::DepositsFaded {
            chamber: self.id,
            removed,
        });
    }

    fn fragment(
        &mut self,
        carrier: ParticleId,
        position: Vec3,
        ids: &mut ParticleIds,
        out_events: &mut Vec<Event>,
    ) {
        self.remove_particle(carrier);
        out_events.push(Event::CarrierImpacted {
            chamber: self.id,
            carrier,
            fragments: self.settings.fragments_per_carrier,
        });

        for _ in 0..self.settings.fragments_per_carrier {
            let mut deposit = Particle::new(ids.allocate(), ParticleKind::Deposit, position);
            let _ = self.assign(&mut deposit, out_events);
            self.particles.push(deposit);
        }
    }

    fn assign(&mut self, deposit: &mut Particle, out_events: &mut Vec<Event>) -> bool {
        let capacity = self.slots.capacity();
        let probe = if capacity == 0 {
            0
        } else {
            self.rng.gen_range(0..capacity)
        };

        match self.slots.try_assign(deposit.id, probe) {
            Ok(slot) => {
                deposit.slot = Some(slot);
                out_events.push(Event::ParticleAssigned {
                    chamber: self.id,
                    particle: deposit.id,
                    slot,
                });
                true
            }
            Err(reason) => {
                warn!(
                    chamber = ?self.id,
                    particle = deposit.id.get(),
                    capacity,
                    "slot table exhausted; deposit left unassigned"
                );
                self.unassigned += 1;
                out_events.push(Event::AssignmentRejected {
                    chamber: self.id,
                    particle: deposit.id,
                    reason,
                });
                false
            }
        }
    }

    fn assign_pending(&mut self, out_events: &mut Vec<Event>) {
        if self.unassigned == 0 || self.slots.is_full() {
            return;
        }

        let mut pending: Vec<Particle> = Vec::new();
        let mut index = 0;
        while index < self.particles.len() {
            let particle = &self.particles[index];
            if particle.kind == ParticleKind::Deposit && particle.slot.is_none() {
                pending.push(self.particles.swap_remove(index));
            } else {
                index += 1;
            }
        }

        pending.sort_by_key(|particle| particle.id);
        self.unassigned = 0;
        for mut deposit in pending {
            let _ = self.assign(&mut deposit, out_events);
            self.particles.push(deposit);
        }
        self.particles.sort_by_key(|particle| particle.id);
    }

    fn remove_particle(&mut self, id: ParticleId) {
        let Some(index) = self.particles.iter().position(|particle| particle.id == id) else {
            return;
        };
        if let Some(slot) = self.particles[index].slot.take() {
            let _ = self.slots.vacate(slot);
        }
        let _ = self.particles.remove(index);
    }

    fn all_settled(&self) -> bool {
        self.slots.is_full()
            && self
                .particles
                .iter()
                .filter(|particle| particle.slot.is_some())
                .all(Particle::has_settled)
    }

    pub(crate) fn phase(&self) -> ChamberPhase {
        self.phase
    }

    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub(crate) fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub(crate) fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub(crate) fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub(crate) fn settled_count(&self) -> usize {
        self.particles
            .iter()
            .filter(|particle| particle.kind == ParticleKind::Deposit && particle.has_settled())
            .count()
    }

    pub(crate) fn particle_view(&self) -> ParticleView {
        ParticleView::from_snapshots(self.particles.iter().map(Particle::snapshot).collect())
    }

    pub(crate) fn lattice_view(&self) -> LatticeView {
        let mut slots: Vec<SlotSnapshot> = self
            .lattice
            .iter()
            .map(|(slot, target)| SlotSnapshot {
                slot,
                target,
                occupant: None,
            })
            .collect();

        for particle in &self.particles {
            let Some(flat) = particle.slot.and_then(|slot| self.lattice.flat_index(slot)) else {
                continue;
            };
            if let Some(snapshot) = slots.get_mut(flat) {
                snapshot.occupant = Some((particle.id, particle.position));
            }
        }

        LatticeView::new(
            self.id,
            self.epoch,
            self.phase,
            self.settings.settle_epsilon,
            slots,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvd_walkthrough_core::{AssignmentError, LatticeIndex};

    fn small_settings() -> DepositionSettings {
        DepositionSettings {
            lattice: LatticeSettings {
                rows: 1,
                columns: 2,
                origin: Vec3::new(0.1, 0.0, 0.0),
                row_step: Vec3::new(0.0, 0.1, 0.0),
                column_step: Vec3::new(0.0, 0.0, 0.1),
            },
            donor_plane_x: 0.1,
            carrier_speed: 1.0,
            deposit_speed: 1.0,
            fragments_per_carrier: 3,
            settle_epsilon: 1e-5,
            fade_ms: 500,
        }
    }

    #[test]
    fn overflowing_fragments_stay_unassigned() {
        let mut chamber = DepositionChamber::new(ChamberId::Deposition1, small_settings(), 5);
        let mut ids = ParticleIds::default();
        let mut events = Vec::new();
        assert!(chamber.activate(&mut events));
        chamber.emit_carrier(Epoch::default(), Vec3::ZERO, &mut ids, &mut events);

        events.clear();
        chamber.tick(Duration::from_secs(1), &mut ids, &mut events);

        let rejected: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, Event::AssignmentRejected { .. }))
            .collect();
        assert_eq!(rejected.len(), 1);
        assert!(matches!(
            rejected[0],
            Event::AssignmentRejected {
                reason: AssignmentError::TableFull,
                ..
            }
        ));
        assert_eq!(chamber.particle_count(), 3);
        assert_eq!(chamber.slots().occupied(), 2);
        assert_eq!(chamber.unassigned, 1);
    }

    #[test]
    fn removing_a_particle_vacates_its_slot_first() {
        let mut chamber = DepositionChamber::new(ChamberId::Deposition1, small_settings(), 5);
        let mut ids = ParticleIds::default();
        let mut events = Vec::new();
        let mut deposit = Particle::new(ids.allocate(), ParticleKind::Deposit, Vec3::ZERO);
        assert!(chamber.assign(&mut deposit, &mut events));
        let id = deposit.id;
        chamber.particles.push(deposit);
        assert_eq!(chamber.slots().occupied(), 1);

        chamber.remove_particle(id);

        assert_eq!(chamber.slots().occupied(), 0);
        assert!(chamber
            .slots()
            .iter()
            .all(|(_, occupant)| occupant != Some(id)));
        let last = LatticeIndex::new(0, 1);
        assert!(chamber.lattice().position(last).is_some());
    }

    #[test]
    fn faded_deposits_are_removed_after_the_fade() {
        let settings = DepositionSettings {
            fragments_per_carrier: 2,
            ..small_settings()
        };
        let mut chamber = DepositionChamber::new(ChamberId::Deposition2, settings, 9);
        let mut ids = ParticleIds::default();
        let mut events = Vec::new();
        assert!(chamber.activate(&mut events));
        chamber.emit_carrier(Epoch::default(), Vec3::ZERO, &mut ids, &mut events);
        chamber.end_emission(Epoch::default(), &mut events);
        chamber.tick(Duration::from_secs(1), &mut ids, &mut events);
        chamber.tick(Duration::from_secs(1), &mut ids, &mut events);
        assert!(chamber.declare_converged(Epoch::default(), &mut events));
        assert_eq!(chamber.settled_count(), 2);

        events.clear();
        chamber.tick(Duration::from_millis(400), &mut ids, &mut events);
        assert_eq!(chamber.particle_count(), 2);
        assert!(events.is_empty());

        chamber.tick(Duration::from_millis(100), &mut ids, &mut events);
        assert_eq!(
            events,
            vec![Event::DepositsFaded {
                chamber: ChamberId::Deposition2,
                removed: 2,
            }]
        );
        assert_eq!(chamber.particle_count(), 0);
        assert_eq!(chamber.slots().occupied(), 0);
        assert_eq!(chamber.phase(), ChamberPhase::Settled);
    }
}
