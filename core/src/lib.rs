#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the CVD walkthrough simulation.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and pure systems. Adapters submit [`Command`] values
//! describing desired mutations, the world executes those commands via its
//! `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to deterministically. Systems consume event streams, query immutable
//! views, and respond exclusively with new command batches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use glam::Vec3;

/// Chambers the substrate visits during the walkthrough, in visiting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChamberId {
    /// Load lock that is evacuated before deposition starts.
    Airlock,
    /// First deposition chamber, applies the copper coating.
    Deposition1,
    /// Second deposition chamber, applies the silver coating.
    Deposition2,
}

impl ChamberId {
    /// Deposition chambers in the order the substrate visits them.
    pub const DEPOSITION: [ChamberId; 2] = [ChamberId::Deposition1, ChamberId::Deposition2];

    /// Every chamber in visiting order.
    pub const ALL: [ChamberId; 3] = [
        ChamberId::Airlock,
        ChamberId::Deposition1,
        ChamberId::Deposition2,
    ];

    /// Reports whether the chamber fills a lattice with deposited particles.
    #[must_use]
    pub const fn is_deposition(self) -> bool {
        matches!(self, Self::Deposition1 | Self::Deposition2)
    }
}

/// Stage of the overall walkthrough, naming the chamber currently in focus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// The walkthrough has not been started yet.
    NotStarted,
    /// The substrate sits in the given chamber.
    InChamber(ChamberId),
    /// Every chamber has completed.
    Complete,
}

/// Coating currently applied to the substrate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coating {
    /// Uncoated glass.
    #[default]
    Bare,
    /// Copper film from the first deposition chamber.
    Copper,
    /// Silver film from the second deposition chamber.
    Silver,
}

/// Unique identifier assigned to a particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticleId(u32);

impl ParticleId {
    /// Creates a new particle identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Reset generation of a chamber.
///
/// Every reset advances the epoch, so work scheduled against an older epoch
/// can be recognised as stale and dropped.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Epoch(u64);

impl Epoch {
    /// Creates an epoch wrapper around the provided generation counter.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the generation counter.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the epoch that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Discrete lattice slot expressed as row and column indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LatticeIndex {
    row: u32,
    column: u32,
}

impl LatticeIndex {
    /// Creates a new lattice index.
    #[must_use]
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Zero-based row of the slot.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Zero-based column of the slot.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }
}

/// Lifecycle of a deposition chamber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChamberPhase {
    /// Waiting for activation; no particles are live.
    #[default]
    Idle,
    /// Carriers are being emitted toward the donor material.
    Emitting,
    /// Emission finished; deposits are travelling to their slots.
    Converging,
    /// The lattice filled completely; its deposits fade out and are removed.
    Settled,
}

/// Lifecycle of the airlock chamber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AirlockPhase {
    /// Waiting for activation.
    #[default]
    Idle,
    /// Chamber is charged with gas and the vacuum doors are opening.
    Opening,
    /// Doors are open and gas drifts toward the vacuum point.
    Evacuating,
    /// All gas is absorbed and the doors are closing.
    Closing,
    /// Doors are closed and the chamber is evacuated.
    Sealed,
}

/// Role a particle plays inside its chamber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticleKind {
    /// Residual gas that is pumped out of the airlock.
    Gas,
    /// Emitted sputtering particle travelling toward the donor material.
    Carrier,
    /// Fragment of donor material that settles onto a lattice slot.
    Deposit,
}

/// Visual state of a particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticleState {
    /// Particle is still travelling.
    Arriving,
    /// Deposit has reached its slot.
    Settled,
    /// Chamber converged and the deposit is fading into the coating; it is
    /// removed once the fade completes.
    Fading,
}

/// Reasons a slot assignment request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentError {
    /// Every slot in the table is occupied.
    TableFull,
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Unpauses, resets every chamber and moves the substrate to the airlock.
    StartWalkthrough,
    /// Resets every chamber and returns the walkthrough to its initial state.
    ResetWalkthrough,
    /// Sets the global pause flag.
    SetPaused {
        /// Whether the simulation should be paused.
        paused: bool,
    },
    /// Focuses the walkthrough on a chamber and starts its process.
    ActivateChamber {
        /// Chamber to activate.
        chamber: ChamberId,
    },
    /// Clears a chamber back to its idle state and advances its epoch.
    ResetChamber {
        /// Chamber to reset.
        chamber: ChamberId,
    },
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Requests that a carrier particle be created inside a deposition chamber.
    EmitCarrier {
        /// Chamber receiving the carrier.
        chamber: ChamberId,
        /// Epoch the emission was scheduled under.
        epoch: Epoch,
        /// Chamber-local spawn position.
        position: Vec3,
    },
    /// Signals that the emission quota for the chamber has been reached.
    EndEmission {
        /// Chamber whose emission finished.
        chamber: ChamberId,
        /// Epoch the emission ran under.
        epoch: Epoch,
    },
    /// Declares that every lattice slot of the chamber is filled and settled.
    DeclareConverged {
        /// Chamber that converged.
        chamber: ChamberId,
        /// Epoch the convergence was observed under.
        epoch: Epoch,
    },
    /// Marks the walkthrough as complete.
    FinishWalkthrough,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Announces a change of the global pause flag.
    PauseChanged {
        /// Value of the pause flag after the change.
        paused: bool,
    },
    /// Confirms that the walkthrough (re)started.
    WalkthroughStarted,
    /// Confirms that every chamber completed.
    WalkthroughFinished,
    /// Confirms that the walkthrough returned to its initial state.
    WalkthroughReset,
    /// Announces that the walkthrough moved to a new stage.
    StageChanged {
        /// Stage that became active.
        stage: Stage,
    },
    /// Confirms that a chamber started its process.
    ChamberActivated {
        /// Chamber that was activated.
        chamber: ChamberId,
        /// Epoch the chamber is running under.
        epoch: Epoch,
    },
    /// Confirms that a chamber was cleared back to idle.
    ChamberReset {
        /// Chamber that was reset.
        chamber: ChamberId,
        /// Epoch that became current after the reset.
        epoch: Epoch,
    },
    /// Announces a new airlock phase.
    AirlockPhaseChanged {
        /// Phase that became active.
        phase: AirlockPhase,
    },
    /// Confirms that the airlock is evacuated and closed.
    AirlockSealed,
    /// Confirms that a gas particle was absorbed by the vacuum.
    GasAbsorbed {
        /// Identifier of the absorbed particle.
        particle: ParticleId,
    },
    /// Confirms that a carrier was emitted into a deposition chamber.
    CarrierEmitted {
        /// Chamber receiving the carrier.
        chamber: ChamberId,
        /// Identifier assigned to the carrier.
        particle: ParticleId,
        /// Spawn position of the carrier.
        position: Vec3,
    },
    /// Reports that an emission scheduled under an older epoch was dropped.
    EmissionDiscarded {
        /// Chamber the emission targeted.
        chamber: ChamberId,
        /// Stale epoch carried by the emission.
        epoch: Epoch,
    },
    /// Confirms that the chamber stopped emitting and started converging.
    EmissionClosed {
        /// Chamber whose emission finished.
        chamber: ChamberId,
    },
    /// Reports that a carrier hit the donor material and fragmented.
    CarrierImpacted {
        /// Chamber containing the carrier.
        chamber: ChamberId,
        /// Identifier of the removed carrier.
        carrier: ParticleId,
        /// Number of deposit fragments released.
        fragments: u32,
    },
    /// Confirms that a deposit claimed a lattice slot.
    ParticleAssigned {
        /// Chamber containing the lattice.
        chamber: ChamberId,
        /// Identifier of the deposit.
        particle: ParticleId,
        /// Slot the deposit will settle on.
        slot: LatticeIndex,
    },
    /// Reports that a deposit could not claim a slot.
    AssignmentRejected {
        /// Chamber containing the lattice.
        chamber: ChamberId,
        /// Identifier of the unassigned deposit.
        particle: ParticleId,
        /// Specific reason the assignment failed.
        reason: AssignmentError,
    },
    /// Announces that every slot of the chamber is filled and settled.
    Converged {
        /// Chamber that converged.
        chamber: ChamberId,
    },
    /// Reports that the faded deposits of a converged chamber were removed.
    DepositsFaded {
        /// Chamber whose deposits faded out.
        chamber: ChamberId,
        /// Number of deposits removed.
        removed: usize,
    },
    /// Announces a new substrate coating.
    SubstrateCoated {
        /// Coating applied to the substrate.
        coating: Coating,
    },
}

/// Immutable representation of a single particle used for queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleSnapshot {
    /// Unique identifier assigned to the particle.
    pub id: ParticleId,
    /// Role of the particle.
    pub kind: ParticleKind,
    /// Current chamber-local position.
    pub position: Vec3,
    /// Slot owned by the particle, if assigned.
    pub slot: Option<LatticeIndex>,
    /// Visual state of the particle.
    pub state: ParticleState,
}

/// Read-only snapshot describing all particles within a chamber.
#[derive(Clone, Debug, Default)]
pub struct ParticleView {
    snapshots: Vec<ParticleSnapshot>,
}

impl ParticleView {
    /// Creates a new particle view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<ParticleSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured snapshots in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &ParticleSnapshot> {
        self.snapshots.iter()
    }

    /// Number of captured particles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether the view captured no particles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<ParticleSnapshot> {
        self.snapshots
    }
}

/// Occupancy of a single lattice slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotSnapshot {
    /// Index of the slot.
    pub slot: LatticeIndex,
    /// Chamber-local target position of the slot.
    pub target: Vec3,
    /// Occupying particle and its current position.
    pub occupant: Option<(ParticleId, Vec3)>,
}

/// Read-only view of one deposition chamber's lattice.
#[derive(Clone, Debug)]
pub struct LatticeView {
    chamber: ChamberId,
    epoch: Epoch,
    phase: ChamberPhase,
    tolerance: f32,
    slots: Vec<SlotSnapshot>,
}

impl LatticeView {
    /// Captures a lattice view from slot snapshots in row-major order.
    #[must_use]
    pub fn new(
        chamber: ChamberId,
        epoch: Epoch,
        phase: ChamberPhase,
        tolerance: f32,
        slots: Vec<SlotSnapshot>,
    ) -> Self {
        Self {
            chamber,
            epoch,
            phase,
            tolerance,
            slots,
        }
    }

    /// Chamber the view was captured from.
    #[must_use]
    pub const fn chamber(&self) -> ChamberId {
        self.chamber
    }

    /// Epoch the chamber was running under.
    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Phase of the chamber.
    #[must_use]
    pub const fn phase(&self) -> ChamberPhase {
        self.phase
    }

    /// Distance within which an occupant counts as sitting on its target.
    #[must_use]
    pub const fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Iterator over the slots in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &SlotSnapshot> {
        self.slots.iter()
    }

    /// Number of slots in the lattice.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots holding a particle.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.occupant.is_some())
            .count()
    }
}
