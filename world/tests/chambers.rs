use std::time::Duration;

use cvd_walkthrough_core::{
    AirlockPhase, ChamberId, ChamberPhase, Coating, Command, Event, ParticleKind, ParticleState,
    Vec3,
};
use cvd_walkthrough_world::{
    self as world, lattice::LatticeSettings, query, AirlockSettings, DepositionSettings, World,
    WorldSettings,
};

fn small_deposition() -> DepositionSettings {
    DepositionSettings {
        lattice: LatticeSettings {
            rows: 2,
            columns: 2,
            ..LatticeSettings::default()
        },
        carrier_speed: 1.0,
        deposit_speed: 1.0,
        fragments_per_carrier: 1,
        ..DepositionSettings::default()
    }
}

fn small_world() -> World {
    World::with_settings(WorldSettings {
        seed: 0x5eed,
        airlock: AirlockSettings {
            particle_count: 5,
            ..AirlockSettings::default()
        },
        deposition_1: small_deposition(),
        deposition_2: small_deposition(),
    })
}

fn run(world: &mut World, command: Command) -> Vec<Event> {
    let mut events = Vec::new();
    world::apply(world, command, &mut events);
    events
}

fn tick(world: &mut World, dt: Duration) -> Vec<Event> {
    run(world, Command::Tick { dt })
}

fn fill_small_lattice(world: &mut World, chamber: ChamberId) {
    let _ = run(world, Command::ActivateChamber { chamber });
    let epoch = query::epoch(world, chamber);
    for index in 0..4 {
        let _ = run(
            world,
            Command::EmitCarrier {
                chamber,
                epoch,
                position: Vec3::new(0.0, -0.2 * index as f32, 0.0),
            },
        );
    }
    let _ = run(world, Command::EndEmission { chamber, epoch });
}

#[test]
fn small_lattice_converges_after_carriers_fragment() {
    let mut world = small_world();
    let chamber = ChamberId::Deposition1;
    fill_small_lattice(&mut world, chamber);
    assert_eq!(
        query::chamber_phase(&world, chamber),
        Some(ChamberPhase::Converging)
    );
    assert_eq!(query::particle_count(&world, chamber), 4);

    let impacts = tick(&mut world, Duration::from_secs(1));
    let fragmented = impacts
        .iter()
        .filter(|event| matches!(event, Event::CarrierImpacted { .. }))
        .count();
    assert_eq!(fragmented, 4);
    assert_eq!(query::occupied_slots(&world, chamber), 4);
    assert_eq!(query::settled_count(&world, chamber), 0);

    let _ = tick(&mut world, Duration::from_secs(1));
    assert_eq!(query::settled_count(&world, chamber), 4);
    assert!(!query::is_converged(&world, chamber));

    let epoch = query::epoch(&world, chamber);
    let events = run(&mut world, Command::DeclareConverged { chamber, epoch });

    assert!(events.contains(&Event::Converged { chamber }));
    let coated = Event::SubstrateCoated {
        coating: Coating::Copper,
    };
    assert!(events.contains(&coated));
    assert!(query::is_converged(&world, chamber));
    assert_eq!(query::particle_count(&world, chamber), 4);
    assert_eq!(query::settled_count(&world, chamber), 4);
    for particle in query::particle_view(&world, chamber).iter() {
        assert_eq!(particle.kind, ParticleKind::Deposit);
        assert_eq!(particle.state, ParticleState::Fading);
    }
}

#[test]
fn deposits_rest_exactly_on_their_slot_targets() {
    let mut world = small_world();
    let chamber = ChamberId::Deposition2;
    fill_small_lattice(&mut world, chamber);
    let _ = tick(&mut world, Duration::from_secs(1));
    let _ = tick(&mut world, Duration::from_secs(1));

    let view = query::lattice_view(&world, chamber).expect("deposition lattice");
    assert_eq!(view.capacity(), 4);
    for slot in view.iter() {
        let (_, position) = slot.occupant.expect("every slot occupied");
        assert_eq!(position, slot.target);
    }
    let lattice = query::lattice(&world, chamber).expect("deposition lattice");
    assert_eq!(lattice.capacity(), 4);
}

#[test]
fn convergence_is_refused_while_slots_are_empty() {
    let mut world = small_world();
    let chamber = ChamberId::Deposition1;
    let _ = run(&mut world, Command::ActivateChamber { chamber });
    let epoch = query::epoch(&world, chamber);
    let _ = run(&mut world, Command::EndEmission { chamber, epoch });

    let events = run(&mut world, Command::DeclareConverged { chamber, epoch });

    assert!(events.is_empty());
    assert!(!query::is_converged(&world, chamber));
    assert_eq!(query::coating(&world), Coating::Bare);
}

#[test]
fn reset_returns_chamber_to_empty_state() {
    let mut world = small_world();
    let chamber = ChamberId::Deposition1;
    fill_small_lattice(&mut world, chamber);
    let _ = tick(&mut world, Duration::from_secs(1));
    let before = query::epoch(&world, chamber);

    let events = run(&mut world, Command::ResetChamber { chamber });

    assert_eq!(
        events,
        vec![Event::ChamberReset {
            chamber,
            epoch: before.next(),
        }]
    );
    assert_eq!(query::particle_count(&world, chamber), 0);
    assert_eq!(query::settled_count(&world, chamber), 0);
    assert_eq!(query::occupied_slots(&world, chamber), 0);
    assert!(!query::is_converged(&world, chamber));
    assert_eq!(
        query::chamber_phase(&world, chamber),
        Some(ChamberPhase::Idle)
    );
}

#[test]
fn emissions_from_a_previous_epoch_are_discarded() {
    let mut world = small_world();
    let chamber = ChamberId::Deposition1;
    let stale = query::epoch(&world, chamber);
    let _ = run(&mut world, Command::ResetChamber { chamber });
    let _ = run(&mut world, Command::ActivateChamber { chamber });

    let events = run(
        &mut world,
        Command::EmitCarrier {
            chamber,
            epoch: stale,
            position: Vec3::ZERO,
        },
    );

    assert_eq!(
        events,
        vec![Event::EmissionDiscarded {
            chamber,
            epoch: stale,
        }]
    );
    assert_eq!(query::particle_count(&world, chamber), 0);
}

#[test]
fn zero_length_tick_changes_nothing() {
    let mut world = small_world();
    let chamber = ChamberId::Deposition1;
    fill_small_lattice(&mut world, chamber);
    let _ = tick(&mut world, Duration::from_millis(100));
    let occupants = |world: &World| -> Vec<_> {
        query::lattice_view(world, chamber)
            .expect("deposition chamber")
            .iter()
            .map(|slot| slot.occupant)
            .collect()
    };
    let before = query::particle_view(&world, chamber).into_vec();
    let slots_before = occupants(&world);
    assert_eq!(query::occupied_slots(&world, chamber), 4);
    assert!(before
        .iter()
        .any(|particle| particle.kind == ParticleKind::Deposit));

    let events = tick(&mut world, Duration::ZERO);

    assert_eq!(events, vec![Event::TimeAdvanced { dt: Duration::ZERO }]);
    assert_eq!(query::particle_view(&world, chamber).into_vec(), before);
    assert_eq!(query::occupied_slots(&world, chamber), 4);
    assert_eq!(occupants(&world), slots_before);
}

#[test]
fn paused_world_freezes_particles() {
    let mut world = small_world();
    let chamber = ChamberId::Deposition1;
    fill_small_lattice(&mut world, chamber);
    let _ = run(&mut world, Command::SetPaused { paused: true });
    let before = query::particle_view(&world, chamber).into_vec();

    let _ = tick(&mut world, Duration::from_secs(5));

    assert_eq!(query::particle_view(&world, chamber).into_vec(), before);
    assert_eq!(query::occupied_slots(&world, chamber), 0);
}

#[test]
fn airlock_evacuates_and_seals() {
    let mut world = small_world();
    let _ = run(
        &mut world,
        Command::ActivateChamber {
            chamber: ChamberId::Airlock,
        },
    );
    assert_eq!(query::particle_count(&world, ChamberId::Airlock), 5);
    assert_eq!(query::airlock_phase(&world), AirlockPhase::Opening);

    let mut absorbed = 0;
    let mut sealed = false;
    for _ in 0..100 {
        for event in tick(&mut world, Duration::from_secs(10)) {
            match event {
                Event::GasAbsorbed { .. } => absorbed += 1,
                Event::AirlockSealed => sealed = true,
                _ => {}
            }
        }
        if sealed {
            break;
        }
    }

    assert!(sealed, "airlock never sealed");
    assert_eq!(absorbed, 5);
    assert_eq!(query::particle_count(&world, ChamberId::Airlock), 0);
    assert!(query::is_converged(&world, ChamberId::Airlock));
    let doors = query::vacuum_doors(&world);
    assert_eq!(doors.upper, Vec3::new(0.0, 0.1, 0.1));
    assert_eq!(doors.lower, Vec3::new(0.0, -0.1, -0.1));
}
