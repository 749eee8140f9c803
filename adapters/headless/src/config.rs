//! TOML configuration for the headless walkthrough driver.

use std::{fs, path::Path, time::Duration};

use cvd_walkthrough_core::{ChamberId, Vec3};
use cvd_walkthrough_system_emission::Config as EmissionConfig;
use cvd_walkthrough_world::{AirlockSettings, DepositionSettings, WorldSettings};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const EMISSION_SEED_SALT: u64 = 0x0e31_5510_0000_0001;

/// Errors raised while loading or validating a [`SimulationConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration from {path}")]
    Io {
        /// Path that was being read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid TOML or does not match the schema.
    #[error("failed to parse configuration")]
    Parse(#[from] toml::de::Error),
    /// A deposition lattice has no slots.
    #[error("{chamber:?} lattice must have at least one row and one column")]
    EmptyLattice {
        /// Chamber owning the lattice.
        chamber: ChamberId,
    },
    /// A chamber would release more deposits than its lattice can hold.
    #[error("{chamber:?} releases {deposits} deposits but its lattice holds only {capacity}")]
    QuotaExceedsCapacity {
        /// Chamber owning the lattice.
        chamber: ChamberId,
        /// Deposits released by a full emission run.
        deposits: u64,
        /// Number of lattice slots.
        capacity: usize,
    },
    /// A speed parameter is zero or negative.
    #[error("{field} must be positive, got {value}")]
    NonPositiveSpeed {
        /// Name of the offending parameter.
        field: &'static str,
        /// Configured value.
        value: f32,
    },
    /// A scalar parameter is infinite or not a number.
    #[error("{field} must be finite, got {value}")]
    NonFiniteValue {
        /// Name of the offending parameter.
        field: &'static str,
        /// Configured value.
        value: f32,
    },
    /// A position or offset has an infinite or NaN component.
    #[error("{field} must have finite components, got {value}")]
    NonFiniteVector {
        /// Name of the offending parameter.
        field: &'static str,
        /// Configured value.
        value: Vec3,
    },
    /// A distance threshold can never be met, so particles would never settle
    /// or be captured.
    #[error("{field} cannot be met, got {value}")]
    InvalidTolerance {
        /// Name of the offending parameter.
        field: &'static str,
        /// Configured value.
        value: f32,
    },
    /// The slowest gas drift is faster than the fastest.
    #[error("airlock drift range is inverted: {min} > {max}")]
    InvertedDriftRange {
        /// Configured minimum drift speed.
        min: f32,
        /// Configured maximum drift speed.
        max: f32,
    },
    /// A chamber would emit all of its carriers at once.
    #[error("{chamber:?} emission interval must be non-zero")]
    ZeroInterval {
        /// Chamber owning the emission settings.
        chamber: ChamberId,
    },
    /// The airlock spawn box has a minimum corner above its maximum corner.
    #[error("airlock spawn box is inverted: {min} is not below {max}")]
    InvertedSpawnBox {
        /// Configured lower corner.
        min: Vec3,
        /// Configured upper corner.
        max: Vec3,
    },
}

/// Emission cadence and source volume of one deposition chamber.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionSettings {
    /// Delay between two carriers, in milliseconds.
    pub interval_ms: u64,
    /// Carriers emitted per activation.
    pub quota: u32,
    /// Lower corner of the box carriers spawn in.
    pub source_origin: Vec3,
    /// Size of the box carriers spawn in.
    pub source_extent: Vec3,
}

impl Default for EmissionSettings {
    fn default() -> Self {
        Self {
            interval_ms: 15_000,
            quota: 180,
            source_origin: Vec3::new(0.0, -0.8, 0.0),
            source_extent: Vec3::new(0.0, 0.8, 0.0),
        }
    }
}

impl EmissionSettings {
    /// Delay between two carriers.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Configuration of one deposition chamber and its emitter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositionSection {
    /// Lattice, motion and fragmentation parameters.
    pub chamber: DepositionSettings,
    /// Carrier emission parameters.
    pub emission: EmissionSettings,
}

/// Top-level configuration of a walkthrough run.
///
/// Every field has a default, so an empty document yields the stock
/// walkthrough: a 1000-particle airlock and two 30x30 lattices filled by 180
/// carriers each.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed every random stream is derived from.
    pub seed: u64,
    /// Airlock evacuation parameters.
    pub airlock: AirlockSettings,
    /// Copper deposition chamber.
    pub deposition_1: DepositionSection,
    /// Silver deposition chamber.
    pub deposition_2: DepositionSection,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: WorldSettings::default().seed,
            airlock: AirlockSettings::default(),
            deposition_1: DepositionSection::default(),
            deposition_2: DepositionSection::default(),
        }
    }
}

impl SimulationConfig {
    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Checks the invariants the simulation relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let airlock = &self.airlock;
        ensure_finite_vector("airlock.spawn_min", airlock.spawn_min)?;
        ensure_finite_vector("airlock.spawn_max", airlock.spawn_max)?;
        ensure_finite_vector("airlock.vacuum_point", airlock.vacuum_point)?;
        ensure_finite_vector("airlock.absorption_point", airlock.absorption_point)?;
        ensure_finite("airlock.rendezvous_offset_x", airlock.rendezvous_offset_x)?;
        ensure_finite("airlock.rendezvous_jitter", airlock.rendezvous_jitter)?;
        ensure_finite("airlock.door_closed_offset", airlock.door_closed_offset)?;
        ensure_finite("airlock.door_open_offset", airlock.door_open_offset)?;
        if !airlock.spawn_min.cmple(airlock.spawn_max).all() {
            return Err(ConfigError::InvertedSpawnBox {
                min: airlock.spawn_min,
                max: airlock.spawn_max,
            });
        }
        if !(airlock.capture_tolerance.is_finite() && airlock.capture_tolerance > 0.0) {
            return Err(ConfigError::InvalidTolerance {
                field: "airlock.capture_tolerance",
                value: airlock.capture_tolerance,
            });
        }
        ensure_positive("airlock.door_speed", airlock.door_speed)?;
        ensure_positive("airlock.min_drift_speed", airlock.min_drift_speed)?;
        ensure_positive("airlock.max_drift_speed", airlock.max_drift_speed)?;
        if airlock.min_drift_speed > airlock.max_drift_speed {
            return Err(ConfigError::InvertedDriftRange {
                min: airlock.min_drift_speed,
                max: airlock.max_drift_speed,
            });
        }

        for (chamber, section) in self.depositions() {
            validate_deposition(chamber, section)?;
        }
        Ok(())
    }

    /// World parameters described by this configuration.
    #[must_use]
    pub fn world_settings(&self) -> WorldSettings {
        WorldSettings {
            seed: self.seed,
            airlock: self.airlock,
            deposition_1: self.deposition_1.chamber,
            deposition_2: self.deposition_2.chamber,
        }
    }

    /// Emission controller configuration for every deposition chamber.
    #[must_use]
    pub fn emission_configs(&self) -> Vec<(ChamberId, EmissionConfig)> {
        self.depositions()
            .into_iter()
            .enumerate()
            .map(|(index, (chamber, section))| {
                let seed = self
                    .seed
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(EMISSION_SEED_SALT.wrapping_add(index as u64));
                let emission = &section.emission;
                let config = EmissionConfig::new(emission.interval(), emission.quota, seed)
                    .with_source(emission.source_origin, emission.source_extent);
                (chamber, config)
            })
            .collect()
    }

    fn depositions(&self) -> [(ChamberId, &DepositionSection); 2] {
        [
            (ChamberId::Deposition1, &self.deposition_1),
            (ChamberId::Deposition2, &self.deposition_2),
        ]
    }
}

fn validate_deposition(chamber: ChamberId, section: &DepositionSection) -> Result<(), ConfigError> {
    let settings = &section.chamber;
    let capacity = settings.lattice.capacity();
    if capacity == 0 {
        return Err(ConfigError::EmptyLattice { chamber });
    }
    let lattice = &settings.lattice;
    ensure_finite_vector("lattice.origin", lattice.origin)?;
    ensure_finite_vector("lattice.row_step", lattice.row_step)?;
    ensure_finite_vector("lattice.column_step", lattice.column_step)?;
    ensure_finite("donor_plane_x", settings.donor_plane_x)?;
    ensure_positive("carrier_speed", settings.carrier_speed)?;
    ensure_positive("deposit_speed", settings.deposit_speed)?;
    if settings.settle_epsilon.is_nan() || settings.settle_epsilon < 0.0 {
        return Err(ConfigError::InvalidTolerance {
            field: "settle_epsilon",
            value: settings.settle_epsilon,
        });
    }
    ensure_finite_vector("emission.source_origin", section.emission.source_origin)?;
    ensure_finite_vector("emission.source_extent", section.emission.source_extent)?;
    if section.emission.interval_ms == 0 {
        return Err(ConfigError::ZeroInterval { chamber });
    }

    let deposits = u64::from(section.emission.quota) * u64::from(settings.fragments_per_carrier);
    if deposits > capacity as u64 {
        return Err(ConfigError::QuotaExceedsCapacity {
            chamber,
            deposits,
            capacity,
        });
    }
    if deposits < capacity as u64 {
        warn!(
            ?chamber,
            deposits,
            capacity,
            "lattice can never fill; chamber will not converge"
        );
    }
    Ok(())
}

fn ensure_finite(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFiniteValue { field, value })
    }
}

fn ensure_finite_vector(field: &'static str, value: Vec3) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFiniteVector { field, value })
    }
}

fn ensure_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    ensure_finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveSpeed { field, value })
    }
}
