#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless driver that runs the CVD walkthrough without a presentation layer.
//!
//! [`Simulation`] owns the authoritative world together with every system and
//! pumps the command/event loop until it settles after each submitted
//! command.

mod config;

use std::time::Duration;

use cvd_walkthrough_core::{ChamberId, Coating, Command, Event, Stage};
use cvd_walkthrough_system_convergence::Convergence;
use cvd_walkthrough_system_emission::Emission;
use cvd_walkthrough_system_walkthrough::Walkthrough;
use cvd_walkthrough_world::{self as world, query, World};
use tracing::warn;

pub use config::{ConfigError, DepositionSection, EmissionSettings, SimulationConfig};

/// Upper bound on command/event rounds triggered by a single command.
const MAX_CASCADE_ROUNDS: usize = 16;

/// Complete walkthrough simulation: world, systems and the recorded event log.
#[derive(Debug)]
pub struct Simulation {
    world: World,
    emission: Emission,
    convergence: Convergence,
    walkthrough: Walkthrough,
    log: Vec<Event>,
}

impl Simulation {
    /// Builds a simulation from a validated configuration.
    pub fn new(config: &SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            world: World::with_settings(config.world_settings()),
            emission: Emission::new(config.emission_configs()),
            convergence: Convergence::new(),
            walkthrough: Walkthrough::new(),
            log: Vec::new(),
        })
    }

    /// Resets every chamber and returns the walkthrough to its initial state.
    pub fn reset(&mut self) {
        self.submit(Command::ResetWalkthrough);
    }

    /// Clears a single chamber and cancels its pending emissions.
    pub fn reset_chamber(&mut self, chamber: ChamberId) {
        self.submit(Command::ResetChamber { chamber });
    }

    /// Starts (or restarts) the walkthrough at the airlock.
    pub fn start(&mut self) {
        self.submit(Command::StartWalkthrough);
    }

    /// Sets the global pause flag.
    pub fn set_paused(&mut self, paused: bool) {
        self.submit(Command::SetPaused { paused });
    }

    /// Starts a chamber's process outside of the walkthrough sequence.
    pub fn activate(&mut self, chamber: ChamberId) {
        self.submit(Command::ActivateChamber { chamber });
    }

    /// Advances the simulation by `dt`.
    pub fn tick(&mut self, dt: Duration) {
        self.submit(Command::Tick { dt });
    }

    /// Reports whether the chamber finished its process.
    #[must_use]
    pub fn is_converged(&self, chamber: ChamberId) -> bool {
        query::is_converged(&self.world, chamber)
    }

    /// Number of live particles in the chamber.
    #[must_use]
    pub fn particle_count(&self, chamber: ChamberId) -> usize {
        query::particle_count(&self.world, chamber)
    }

    /// Number of deposits resting on their slot.
    #[must_use]
    pub fn settled_count(&self, chamber: ChamberId) -> usize {
        query::settled_count(&self.world, chamber)
    }

    /// Current walkthrough stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        query::stage(&self.world)
    }

    /// Coating currently applied to the substrate.
    #[must_use]
    pub fn coating(&self) -> Coating {
        query::coating(&self.world)
    }

    /// Reports whether the simulation is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        query::is_paused(&self.world)
    }

    /// Carriers emitted into the chamber since its last activation.
    #[must_use]
    pub fn emitted(&self, chamber: ChamberId) -> u32 {
        self.emission.emitted(chamber)
    }

    /// Read-only access to the world for presentation queries.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Drains the events recorded since the previous call.
    pub fn events(&mut self) -> std::vec::Drain<'_, Event> {
        self.log.drain(..)
    }

    fn submit(&mut self, command: Command) {
        let mut events = Vec::new();
        world::apply(&mut self.world, command, &mut events);
        self.pump(events);
    }

    fn pump(&mut self, mut events: Vec<Event>) {
        for _ in 0..MAX_CASCADE_ROUNDS {
            if events.is_empty() {
                return;
            }

            let mut commands = Vec::new();
            self.walkthrough.handle(&events, &mut commands);
            self.emission
                .handle(&events, query::is_paused(&self.world), &mut commands);
            if events
                .iter()
                .any(|event| matches!(event, Event::TimeAdvanced { .. }))
            {
                let lattices = query::converging_lattices(&self.world);
                self.convergence.handle(&events, &lattices, &mut commands);
            }
            self.log.append(&mut events);

            for command in commands {
                world::apply(&mut self.world, command, &mut events);
            }
        }

        if !events.is_empty() {
            warn!(
                pending = events.len(),
                max_rounds = MAX_CASCADE_ROUNDS,
                "command cascade did not settle; dropping reactions"
            );
            self.log.append(&mut events);
        }
    }
}
