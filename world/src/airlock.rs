use std::time::Duration;

use cvd_walkthrough_core::{AirlockPhase, ChamberId, Epoch, Event, ParticleKind, ParticleView, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    motion::{move_towards, step_length},
    particle::{Particle, ParticleIds},
};

/// Tunable parameters of the airlock evacuation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirlockSettings {
    /// Gas particles charged into the chamber on activation.
    pub particle_count: u32,
    /// Lower corner of the box gas is charged into.
    pub spawn_min: Vec3,
    /// Upper corner of the box gas is charged into.
    pub spawn_max: Vec3,
    /// Mouth of the vacuum pump.
    pub vacuum_point: Vec3,
    /// X offset from the vacuum point to the rendezvous gas drifts toward.
    pub rendezvous_offset_x: f32,
    /// Maximum per-axis jitter applied to the rendezvous on y and z.
    pub rendezvous_jitter: f32,
    /// Y/Z distance from the vacuum point at which gas is captured.
    pub capture_tolerance: f32,
    /// Point captured gas travels to before it is absorbed.
    pub absorption_point: Vec3,
    /// Slowest drift speed in units per second.
    pub min_drift_speed: f32,
    /// Fastest drift speed in units per second.
    pub max_drift_speed: f32,
    /// Speed of the vacuum doors in units per second.
    pub door_speed: f32,
    /// Y/Z offset of each door from the chamber axis when closed.
    pub door_closed_offset: f32,
    /// Y/Z offset of each door from the chamber axis when open.
    pub door_open_offset: f32,
}

impl Default for AirlockSettings {
    fn default() -> Self {
        Self {
            particle_count: 1000,
            spawn_min: Vec3::new(-0.3, 0.9, -0.6),
            spawn_max: Vec3::new(-0.07, 1.9, 0.8),
            vacuum_point: Vec3::new(-1.4, 1.4, 0.1),
            rendezvous_offset_x: 0.3,
            rendezvous_jitter: 0.1,
            capture_tolerance: 0.1,
            absorption_point: Vec3::new(-1.1, 1.4, 0.1),
            min_drift_speed: 0.01,
            max_drift_speed: 0.4,
            door_speed: 0.3,
            door_closed_offset: 0.1,
            door_open_offset: 0.23,
        }
    }
}

/// Positions of the two vacuum doors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VacuumDoors {
    /// Door sliding toward positive y and z.
    pub upper: Vec3,
    /// Door sliding toward negative y and z.
    pub lower: Vec3,
}

impl VacuumDoors {
    fn at_offset(offset: f32) -> Self {
        Self {
            upper: Vec3::new(0.0, offset, offset),
            lower: Vec3::new(0.0, -offset, -offset),
        }
    }

    /// Slides both doors toward `goal`; reports whether both reached it.
    fn slide_towards(&mut self, goal: Self, max_delta: f32) -> bool {
        self.upper = move_towards(self.upper, goal.upper, max_delta);
        self.lower = move_towards(self.lower, goal.lower, max_delta);
        *self == goal
    }
}

#[derive(Debug)]
pub(crate) struct Airlock {
    settings: AirlockSettings,
    seed: u64,
    particles: Vec<Particle>,
    doors: VacuumDoors,
    phase: AirlockPhase,
    epoch: Epoch,
    rng: ChaCha8Rng,
}

impl Airlock {
    pub(crate) fn new(settings: AirlockSettings, seed: u64) -> Self {
        Self {
            doors: VacuumDoors::at_offset(settings.door_closed_offset),
            settings,
            seed,
            particles: Vec::new(),
            phase: AirlockPhase::Idle,
            epoch: Epoch::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub(crate) fn reset(&mut self, out_events: &mut Vec<Event>) {
        self.particles.clear();
        self.doors = VacuumDoors::at_offset(self.settings.door_closed_offset);
        self.phase = AirlockPhase::Idle;
        self.epoch = self.epoch.next();
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        debug!(epoch = self.epoch.get(), "airlock reset");
        out_events.push(Event::ChamberReset {
            chamber: ChamberId::Airlock,
            epoch: self.epoch,
        });
    }

    pub(crate) fn activate(&mut self, ids: &mut ParticleIds, out_events: &mut Vec<Event>) -> bool {
        if self.phase != AirlockPhase::Idle {
            debug!(phase = ?self.phase, "ignoring activation of busy airlock");
            return false;
        }

        let span = self.settings.spawn_max - self.settings.spawn_min;
        for _ in 0..self.settings.particle_count {
            let offset = Vec3::new(
                self.rng.gen::<f32>(),
                self.rng.gen::<f32>(),
                self.rng.gen::<f32>(),
            );
            let position = self.settings.spawn_min + span * offset;
            self.particles
                .push(Particle::new(ids.allocate(), ParticleKind::Gas, position));
        }

        info!(particles = self.particles.len(), "airlock charged");
        out_events.push(Event::ChamberActivated {
            chamber: ChamberId::Airlock,
            epoch: self.epoch,
        });
        self.enter(AirlockPhase::Opening, out_events);
        true
    }

    pub(crate) fn tick(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        if dt.is_zero() {
            return;
        }

        let door_step = step_length(self.settings.door_speed, dt);
        match self.phase {
            AirlockPhase::Idle | AirlockPhase::Sealed => {}
            AirlockPhase::Opening => {
                let open = VacuumDoors::at_offset(self.settings.door_open_offset);
                if self.doors.slide_towards(open, door_step) {
                    self.enter(AirlockPhase::Evacuating, out_events);
                }
            }
            AirlockPhase::Evacuating => {
                self.drift(dt, out_events);
                if self.particles.is_empty() {
                    self.enter(AirlockPhase::Closing, out_events);
                }
            }
            AirlockPhase::Closing => {
                let closed = VacuumDoors::at_offset(self.settings.door_closed_offset);
                if self.doors.slide_towards(closed, door_step) {
                    self.enter(AirlockPhase::Sealed, out_events);
                    info!("airlock sealed");
                    out_events.push(Event::AirlockSealed);
                }
            }
        }
    }

    /// Pulls every gas particle toward the vacuum and absorbs captured ones.
    ///
    /// Free gas heads for a rendezvous next to the vacuum point that is
    /// re-jittered every tick, with a speed re-sampled every tick. Gas within
    /// `capture_tolerance` of the vacuum point on both y and z locks onto the
    /// absorption point and disappears once it reaches it exactly.
    fn drift(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        let settings = &self.settings;
        let rng = &mut self.rng;
        let vacuum = settings.vacuum_point;
        let seconds = dt.as_secs_f32();

        self.particles.retain_mut(|particle| {
            let jitter_y = (rng.gen::<f32>() * 2.0 - 1.0) * settings.rendezvous_jitter;
            let jitter_z = (rng.gen::<f32>() * 2.0 - 1.0) * settings.rendezvous_jitter;
            let speed = settings.min_drift_speed
                + rng.gen::<f32>() * (settings.max_drift_speed - settings.min_drift_speed);

            let dy = (particle.position.y - vacuum.y).abs();
            let dz = (particle.position.z - vacuum.z).abs();
            let captured = dy < settings.capture_tolerance && dz < settings.capture_tolerance;

            let target = if captured {
                settings.absorption_point
            } else {
                Vec3::new(
                    vacuum.x + settings.rendezvous_offset_x,
                    vacuum.y + jitter_y,
                    vacuum.z + jitter_z,
                )
            };

            particle.position = move_towards(particle.position, target, speed * seconds);
            if captured && particle.position == settings.absorption_point {
                out_events.push(Event::GasAbsorbed {
                    particle: particle.id,
                });
                return false;
            }
            true
        });
    }

    fn enter(&mut self, phase: AirlockPhase, out_events: &mut Vec<Event>) {
        self.phase = phase;
        debug!(?phase, "airlock phase changed");
        out_events.push(Event::AirlockPhaseChanged { phase });
    }

    pub(crate) fn phase(&self) -> AirlockPhase {
        self.phase
    }

    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub(crate) fn doors(&self) -> VacuumDoors {
        self.doors
    }

    pub(crate) fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub(crate) fn particle_view(&self) -> ParticleView {
        ParticleView::from_snapshots(self.particles.iter().map(Particle::snapshot).collect())
    }
}
