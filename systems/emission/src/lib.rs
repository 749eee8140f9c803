#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic emission system responsible for feeding carriers into
//! deposition chambers.
//!
//! Every emission is a scheduled task with a due time on the controller's own
//! clock and the chamber epoch it was scheduled under. Resetting a chamber
//! cancels its task; the world additionally rejects anything carrying a stale
//! epoch.

use std::time::Duration;

use cvd_walkthrough_core::{ChamberId, Command, Epoch, Event, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

/// Configuration parameters required to drive emission in one chamber.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    interval: Duration,
    quota: u32,
    rng_seed: u64,
    source_origin: Vec3,
    source_extent: Vec3,
}

impl Config {
    /// Creates a configuration using the provided cadence, quota and seed.
    ///
    /// Carriers spawn at the origin until a source volume is supplied through
    /// [`Config::with_source`].
    #[must_use]
    pub const fn new(interval: Duration, quota: u32, rng_seed: u64) -> Self {
        Self {
            interval,
            quota,
            rng_seed,
            source_origin: Vec3::ZERO,
            source_extent: Vec3::ZERO,
        }
    }

    /// Sets the box carriers spawn in, spanning `origin..=origin + extent`.
    #[must_use]
    pub const fn with_source(mut self, origin: Vec3, extent: Vec3) -> Self {
        self.source_origin = origin;
        self.source_extent = extent;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ScheduledEmission {
    due: Duration,
    epoch: Epoch,
}

#[derive(Debug)]
struct Controller {
    chamber: ChamberId,
    config: Config,
    clock: Duration,
    pending: Option<ScheduledEmission>,
    emitted: u32,
    rng: ChaCha8Rng,
}

impl Controller {
    fn new(chamber: ChamberId, config: Config) -> Self {
        Self {
            chamber,
            config,
            clock: Duration::ZERO,
            pending: None,
            emitted: 0,
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
        }
    }

    fn start(&mut self, epoch: Epoch, out: &mut Vec<Command>) {
        self.cancel();
        if self.config.quota == 0 {
            out.push(Command::EndEmission {
                chamber: self.chamber,
                epoch,
            });
            return;
        }

        self.pending = Some(ScheduledEmission {
            due: self.config.interval,
            epoch,
        });
        debug!(
            chamber = ?self.chamber,
            epoch = epoch.get(),
            quota = self.config.quota,
            "emission scheduled"
        );
    }

    fn cancel(&mut self) {
        if self.pending.take().is_some() {
            debug!(chamber = ?self.chamber, emitted = self.emitted, "pending emission cancelled");
        }
        self.clock = Duration::ZERO;
        self.emitted = 0;
        self.rng = ChaCha8Rng::seed_from_u64(self.config.rng_seed);
    }

    fn advance(&mut self, dt: Duration, out: &mut Vec<Command>) {
        if self.pending.is_none() || dt.is_zero() {
            return;
        }

        self.clock = self.clock.saturating_add(dt);
        while let Some(task) = self.pending {
            if task.due > self.clock {
                break;
            }

            let position = self.sample_source();
            out.push(Command::EmitCarrier {
                chamber: self.chamber,
                epoch: task.epoch,
                position,
            });
            self.emitted += 1;
            trace!(chamber = ?self.chamber, emitted = self.emitted, "carrier due");

            if self.emitted >= self.config.quota {
                self.pending = None;
                out.push(Command::EndEmission {
                    chamber: self.chamber,
                    epoch: task.epoch,
                });
            } else {
                self.pending = Some(ScheduledEmission {
                    due: task.due.saturating_add(self.config.interval),
                    epoch: task.epoch,
                });
            }
        }
    }

    fn sample_source(&mut self) -> Vec3 {
        let offset = Vec3::new(
            self.rng.gen::<f32>(),
            self.rng.gen::<f32>(),
            self.rng.gen::<f32>(),
        );
        self.config.source_origin + self.config.source_extent * offset
    }
}

/// Pure system that deterministically emits carrier commands for active
/// deposition chambers.
#[derive(Debug)]
pub struct Emission {
    controllers: Vec<Controller>,
}

impl Emission {
    /// Creates the emission system with one controller per configured chamber.
    ///
    /// Only deposition chambers are accepted; later entries replace earlier
    /// ones for the same chamber.
    #[must_use]
    pub fn new(configs: impl IntoIterator<Item = (ChamberId, Config)>) -> Self {
        let mut controllers: Vec<Controller> = Vec::new();
        for (chamber, config) in configs {
            if !chamber.is_deposition() {
                continue;
            }
            controllers.retain(|controller| controller.chamber != chamber);
            controllers.push(Controller::new(chamber, config));
        }
        controllers.sort_by_key(|controller| controller.chamber);
        Self { controllers }
    }

    /// Consumes world events to emit carrier and end-of-emission commands.
    ///
    /// While `paused` is set the controller clocks stand still.
    pub fn handle(&mut self, events: &[Event], paused: bool, out: &mut Vec<Command>) {
        for event in events {
            match event {
                Event::ChamberActivated { chamber, epoch } => {
                    if let Some(controller) = self.controller_mut(*chamber) {
                        controller.start(*epoch, out);
                    }
                }
                Event::ChamberReset { chamber, .. } => {
                    if let Some(controller) = self.controller_mut(*chamber) {
                        controller.cancel();
                    }
                }
                Event::TimeAdvanced { dt } if !paused => {
                    for controller in &mut self.controllers {
                        controller.advance(*dt, out);
                    }
                }
                _ => {}
            }
        }
    }

    /// Number of carriers emitted in the chamber since it was last activated.
    #[must_use]
    pub fn emitted(&self, chamber: ChamberId) -> u32 {
        self.controller(chamber)
            .map_or(0, |controller| controller.emitted)
    }

    /// Time left until the chamber's next emission, if one is scheduled.
    #[must_use]
    pub fn next_due(&self, chamber: ChamberId) -> Option<Duration> {
        let controller = self.controller(chamber)?;
        controller
            .pending
            .map(|task| task.due.saturating_sub(controller.clock))
    }

    fn controller(&self, chamber: ChamberId) -> Option<&Controller> {
        self.controllers
            .iter()
            .find(|controller| controller.chamber == chamber)
    }

    fn controller_mut(&mut self, chamber: ChamberId) -> Option<&mut Controller> {
        self.controllers
            .iter_mut()
            .find(|controller| controller.chamber == chamber)
    }
}
