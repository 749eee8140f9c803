#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for the CVD walkthrough.
//!
//! The world owns the airlock, both deposition chambers and the walkthrough
//! context (pause flag, stage, substrate coating). It is mutated exclusively
//! through [`apply`] and observed through the [`query`] module.

mod airlock;
mod deposition;
pub mod lattice;
pub mod motion;
mod particle;
pub mod slots;

use cvd_walkthrough_core::{ChamberId, Coating, Command, Event, Stage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use airlock::{AirlockSettings, VacuumDoors};
pub use deposition::DepositionSettings;

use airlock::Airlock;
use deposition::DepositionChamber;
use particle::ParticleIds;

const AIRLOCK_SEED_SALT: u64 = 0x0a1e_7c0c_5eed_0001;
const DEPOSITION_1_SEED_SALT: u64 = 0xde90_0001_5eed_0002;
const DEPOSITION_2_SEED_SALT: u64 = 0xde90_0002_5eed_0003;

/// Parameters used to construct a [`World`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// Seed every chamber derives its random stream from.
    pub seed: u64,
    /// Airlock evacuation parameters.
    pub airlock: AirlockSettings,
    /// Parameters of the copper deposition chamber.
    pub deposition_1: DepositionSettings,
    /// Parameters of the silver deposition chamber.
    pub deposition_2: DepositionSettings,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            seed: 0x42f0_e1eb_d4a5_3c21,
            airlock: AirlockSettings::default(),
            deposition_1: DepositionSettings::default(),
            deposition_2: DepositionSettings::default(),
        }
    }
}

#[derive(Debug)]
struct WalkthroughContext {
    started: bool,
    paused: bool,
    stage: Stage,
    coating: Coating,
}

impl Default for WalkthroughContext {
    fn default() -> Self {
        Self {
            started: false,
            paused: false,
            stage: Stage::NotStarted,
            coating: Coating::Bare,
        }
    }
}

/// Represents the authoritative walkthrough world state.
#[derive(Debug)]
pub struct World {
    context: WalkthroughContext,
    airlock: Airlock,
    deposition_1: DepositionChamber,
    deposition_2: DepositionChamber,
    particle_ids: ParticleIds,
    tick_index: u64,
}

impl World {
    /// Creates a world with default chamber parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(WorldSettings::default())
    }

    /// Creates a world from the provided chamber parameters.
    #[must_use]
    pub fn with_settings(settings: WorldSettings) -> Self {
        Self {
            context: WalkthroughContext::default(),
            airlock: Airlock::new(
                settings.airlock,
                derive_seed(settings.seed, AIRLOCK_SEED_SALT),
            ),
            deposition_1: DepositionChamber::new(
                ChamberId::Deposition1,
                settings.deposition_1,
                derive_seed(settings.seed, DEPOSITION_1_SEED_SALT),
            ),
            deposition_2: DepositionChamber::new(
                ChamberId::Deposition2,
                settings.deposition_2,
                derive_seed(settings.seed, DEPOSITION_2_SEED_SALT),
            ),
            particle_ids: ParticleIds::default(),
            tick_index: 0,
        }
    }

    fn deposition(&self, chamber: ChamberId) -> Option<&DepositionChamber> {
        match chamber {
            ChamberId::Airlock => None,
            ChamberId::Deposition1 => Some(&self.deposition_1),
            ChamberId::Deposition2 => Some(&self.deposition_2),
        }
    }

    fn deposition_mut(&mut self, chamber: ChamberId) -> Option<&mut DepositionChamber> {
        match chamber {
            ChamberId::Airlock => None,
            ChamberId::Deposition1 => Some(&mut self.deposition_1),
            ChamberId::Deposition2 => Some(&mut self.deposition_2),
        }
    }

    fn reset_chamber(&mut self, chamber: ChamberId, out_events: &mut Vec<Event>) {
        match self.deposition_mut(chamber) {
            Some(deposition) => deposition.reset(out_events),
            None => self.airlock.reset(out_events),
        }
    }

    fn reset_all(&mut self, out_events: &mut Vec<Event>) {
        for chamber in ChamberId::ALL {
            self.reset_chamber(chamber, out_events);
        }
        self.set_coating(Coating::Bare, out_events);
    }

    fn set_stage(&mut self, stage: Stage, out_events: &mut Vec<Event>) {
        if self.context.stage == stage {
            return;
        }
        self.context.stage = stage;
        info!(?stage, "walkthrough stage changed");
        out_events.push(Event::StageChanged { stage });
    }

    fn set_coating(&mut self, coating: Coating, out_events: &mut Vec<Event>) {
        self.context.coating = coating;
        out_events.push(Event::SubstrateCoated { coating });
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::StartWalkthrough => {
            if world.context.paused {
                world.context.paused = false;
                out_events.push(Event::PauseChanged { paused: false });
            }
            world.reset_all(out_events);
            world.context.started = true;
            out_events.push(Event::WalkthroughStarted);
            world.set_stage(Stage::InChamber(ChamberId::Airlock), out_events);
        }
        Command::ResetWalkthrough => {
            world.reset_all(out_events);
            world.context.started = false;
            world.set_stage(Stage::NotStarted, out_events);
            out_events.push(Event::WalkthroughReset);
        }
        Command::SetPaused { paused } => {
            if world.context.paused != paused {
                world.context.paused = paused;
                info!(paused, "pause toggled");
                out_events.push(Event::PauseChanged { paused });
            }
        }
        Command::ActivateChamber { chamber } => {
            let activated = match chamber {
                ChamberId::Airlock => world.airlock.activate(&mut world.particle_ids, out_events),
                ChamberId::Deposition1 => world.deposition_1.activate(out_events),
                ChamberId::Deposition2 => world.deposition_2.activate(out_events),
            };
            if activated {
                world.set_stage(Stage::InChamber(chamber), out_events);
            }
        }
        Command::ResetChamber { chamber } => {
            world.reset_chamber(chamber, out_events);
        }
        Command::Tick { dt } => {
            world.tick_index = world.tick_index.saturating_add(1);
            out_events.push(Event::TimeAdvanced { dt });

            if world.context.paused {
                return;
            }

            world.airlock.tick(dt, out_events);
            world
                .deposition_1
                .tick(dt, &mut world.particle_ids, out_events);
            world
                .deposition_2
                .tick(dt, &mut world.particle_ids, out_events);
        }
        Command::EmitCarrier {
            chamber,
            epoch,
            position,
        } => {
            let World {
                deposition_1,
                deposition_2,
                particle_ids,
                ..
            } = world;
            let target = match chamber {
                ChamberId::Deposition1 => deposition_1,
                ChamberId::Deposition2 => deposition_2,
                ChamberId::Airlock => {
                    debug!("ignoring carrier emission into the airlock");
                    return;
                }
            };
            target.emit_carrier(epoch, position, particle_ids, out_events);
        }
        Command::EndEmission { chamber, epoch } => {
            if let Some(deposition) = world.deposition_mut(chamber) {
                deposition.end_emission(epoch, out_events);
            }
        }
        Command::DeclareConverged { chamber, epoch } => {
            let converged = world
                .deposition_mut(chamber)
                .is_some_and(|deposition| deposition.declare_converged(epoch, out_events));
            if converged {
                world.set_coating(coating_for(chamber), out_events);
            }
        }
        Command::FinishWalkthrough => {
            if world.context.stage != Stage::Complete {
                world.set_stage(Stage::Complete, out_events);
                out_events.push(Event::WalkthroughFinished);
            }
        }
    }
}

/// Coating a chamber applies to the substrate when its lattice converges.
#[must_use]
pub const fn coating_for(chamber: ChamberId) -> Coating {
    match chamber {
        ChamberId::Airlock => Coating::Bare,
        ChamberId::Deposition1 => Coating::Copper,
        ChamberId::Deposition2 => Coating::Silver,
    }
}

fn derive_seed(seed: u64, salt: u64) -> u64 {
    seed.wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(salt)
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use cvd_walkthrough_core::{
        AirlockPhase, ChamberId, ChamberPhase, Coating, Epoch, LatticeView, ParticleView, Stage,
    };

    use super::{lattice::Lattice, VacuumDoors, World};

    /// Reports whether the global pause flag is set.
    #[must_use]
    pub fn is_paused(world: &World) -> bool {
        world.context.paused
    }

    /// Reports whether the walkthrough has been started.
    #[must_use]
    pub fn is_started(world: &World) -> bool {
        world.context.started
    }

    /// Current walkthrough stage.
    #[must_use]
    pub fn stage(world: &World) -> Stage {
        world.context.stage
    }

    /// Coating currently applied to the substrate.
    #[must_use]
    pub fn coating(world: &World) -> Coating {
        world.context.coating
    }

    /// Number of ticks applied so far.
    #[must_use]
    pub fn tick_index(world: &World) -> u64 {
        world.tick_index
    }

    /// Current reset generation of a chamber.
    #[must_use]
    pub fn epoch(world: &World, chamber: ChamberId) -> Epoch {
        world
            .deposition(chamber)
            .map_or_else(|| world.airlock.epoch(), |deposition| deposition.epoch())
    }

    /// Phase of a deposition chamber; `None` for the airlock.
    #[must_use]
    pub fn chamber_phase(world: &World, chamber: ChamberId) -> Option<ChamberPhase> {
        world
            .deposition(chamber)
            .map(|deposition| deposition.phase())
    }

    /// Phase of the airlock.
    #[must_use]
    pub fn airlock_phase(world: &World) -> AirlockPhase {
        world.airlock.phase()
    }

    /// Positions of the airlock's vacuum doors.
    #[must_use]
    pub fn vacuum_doors(world: &World) -> VacuumDoors {
        world.airlock.doors()
    }

    /// Reports whether the chamber finished its process.
    ///
    /// Deposition chambers report `true` from the tick their lattice
    /// converged until they are reset; the airlock reports `true` once sealed.
    #[must_use]
    pub fn is_converged(world: &World, chamber: ChamberId) -> bool {
        match world.deposition(chamber) {
            Some(deposition) => deposition.phase() == ChamberPhase::Settled,
            None => world.airlock.phase() == AirlockPhase::Sealed,
        }
    }

    /// Number of live particles in a chamber.
    #[must_use]
    pub fn particle_count(world: &World, chamber: ChamberId) -> usize {
        world.deposition(chamber).map_or_else(
            || world.airlock.particle_count(),
            |deposition| deposition.particle_count(),
        )
    }

    /// Number of deposits sitting on their slot; always zero for the airlock.
    #[must_use]
    pub fn settled_count(world: &World, chamber: ChamberId) -> usize {
        world
            .deposition(chamber)
            .map_or(0, |deposition| deposition.settled_count())
    }

    /// Number of occupied lattice slots; always zero for the airlock.
    #[must_use]
    pub fn occupied_slots(world: &World, chamber: ChamberId) -> usize {
        world
            .deposition(chamber)
            .map_or(0, |deposition| deposition.slots().occupied())
    }

    /// Lattice of a deposition chamber.
    #[must_use]
    pub fn lattice(world: &World, chamber: ChamberId) -> Option<&Lattice> {
        world
            .deposition(chamber)
            .map(|deposition| deposition.lattice())
    }

    /// Captures a read-only view of the particles inside a chamber.
    #[must_use]
    pub fn particle_view(world: &World, chamber: ChamberId) -> ParticleView {
        world.deposition(chamber).map_or_else(
            || world.airlock.particle_view(),
            |deposition| deposition.particle_view(),
        )
    }

    /// Captures the lattice of a deposition chamber.
    #[must_use]
    pub fn lattice_view(world: &World, chamber: ChamberId) -> Option<LatticeView> {
        world
            .deposition(chamber)
            .map(|deposition| deposition.lattice_view())
    }

    /// Captures the lattices of every chamber currently converging.
    #[must_use]
    pub fn converging_lattices(world: &World) -> Vec<LatticeView> {
        ChamberId::DEPOSITION
            .iter()
            .filter_map(|chamber| world.deposition(*chamber))
            .filter(|deposition| deposition.phase() == ChamberPhase::Converging)
            .map(|deposition| deposition.lattice_view())
            .collect()
    }
}
