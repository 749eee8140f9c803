use std::time::Duration;

use cvd_walkthrough_core::{ChamberId, Command, Epoch, Event, Vec3};
use cvd_walkthrough_system_emission::{Config, Emission};
use cvd_walkthrough_world::{self as world, query, World};

const CHAMBER: ChamberId = ChamberId::Deposition1;

fn activated(epoch: Epoch) -> Event {
    Event::ChamberActivated {
        chamber: CHAMBER,
        epoch,
    }
}

fn advanced(dt: Duration) -> Event {
    Event::TimeAdvanced { dt }
}

fn emissions(commands: &[Command]) -> usize {
    commands
        .iter()
        .filter(|command| matches!(command, Command::EmitCarrier { .. }))
        .count()
}

#[test]
fn emits_once_per_interval() {
    let mut emission = Emission::new([(CHAMBER, Config::new(Duration::from_secs(15), 180, 9))]);
    let mut commands = Vec::new();

    emission.handle(&[activated(Epoch::default())], false, &mut commands);
    assert!(commands.is_empty(), "first carrier waits a full interval");
    assert_eq!(emission.next_due(CHAMBER), Some(Duration::from_secs(15)));

    emission.handle(&[advanced(Duration::from_secs(14))], false, &mut commands);
    assert!(commands.is_empty());

    emission.handle(&[advanced(Duration::from_secs(1))], false, &mut commands);
    assert_eq!(emissions(&commands), 1);
    assert_eq!(emission.emitted(CHAMBER), 1);
    assert_eq!(emission.next_due(CHAMBER), Some(Duration::from_secs(15)));
}

#[test]
fn emits_multiple_carriers_for_large_dt() {
    let mut emission = Emission::new([(CHAMBER, Config::new(Duration::from_secs(1), 10, 9))]);
    let mut commands = Vec::new();

    emission.handle(
        &[
            activated(Epoch::default()),
            advanced(Duration::from_millis(3_500)),
        ],
        false,
        &mut commands,
    );

    assert_eq!(emissions(&commands), 3);
    assert_eq!(emission.next_due(CHAMBER), Some(Duration::from_millis(500)));
}

#[test]
fn quota_closes_emission() {
    let mut emission = Emission::new([(CHAMBER, Config::new(Duration::from_secs(1), 2, 9))]);
    let epoch = Epoch::new(4);
    let mut commands = Vec::new();

    emission.handle(
        &[activated(epoch), advanced(Duration::from_secs(10))],
        false,
        &mut commands,
    );

    assert_eq!(emissions(&commands), 2);
    assert_eq!(
        commands.last(),
        Some(&Command::EndEmission {
            chamber: CHAMBER,
            epoch,
        })
    );
    for command in &commands {
        let tagged = match command {
            Command::EmitCarrier { epoch: tagged, .. }
            | Command::EndEmission { epoch: tagged, .. } => *tagged,
            other => panic!("unexpected command {other:?}"),
        };
        assert_eq!(tagged, epoch);
    }

    commands.clear();
    emission.handle(&[advanced(Duration::from_secs(10))], false, &mut commands);
    assert!(commands.is_empty());
    assert_eq!(emission.next_due(CHAMBER), None);
}

#[test]
fn zero_quota_closes_immediately() {
    let mut emission = Emission::new([(CHAMBER, Config::new(Duration::from_secs(1), 0, 9))]);
    let mut commands = Vec::new();

    emission.handle(&[activated(Epoch::default())], false, &mut commands);

    assert_eq!(
        commands,
        vec![Command::EndEmission {
            chamber: CHAMBER,
            epoch: Epoch::default(),
        }]
    );
}

#[test]
fn paused_clock_stands_still() {
    let mut emission = Emission::new([(CHAMBER, Config::new(Duration::from_secs(1), 5, 9))]);
    let mut commands = Vec::new();
    emission.handle(&[activated(Epoch::default())], false, &mut commands);
    emission.handle(
        &[advanced(Duration::from_millis(1_500))],
        false,
        &mut commands,
    );
    assert_eq!(emission.emitted(CHAMBER), 1);

    emission.handle(&[advanced(Duration::from_secs(30))], true, &mut commands);

    assert_eq!(emissions(&commands), 1);
    assert_eq!(emission.emitted(CHAMBER), 1);
    assert_eq!(emission.next_due(CHAMBER), Some(Duration::from_millis(500)));
}

#[test]
fn reset_cancels_pending_emission() {
    let mut emission = Emission::new([(CHAMBER, Config::new(Duration::from_secs(15), 180, 9))]);
    let mut commands = Vec::new();
    emission.handle(
        &[
            activated(Epoch::default()),
            advanced(Duration::from_secs(30)),
        ],
        false,
        &mut commands,
    );
    assert_eq!(emission.emitted(CHAMBER), 2);

    commands.clear();
    emission.handle(
        &[Event::ChamberReset {
            chamber: CHAMBER,
            epoch: Epoch::new(1),
        }],
        false,
        &mut commands,
    );
    emission.handle(&[advanced(Duration::from_secs(60))], false, &mut commands);

    assert!(commands.is_empty());
    assert_eq!(emission.emitted(CHAMBER), 0);
    assert_eq!(emission.next_due(CHAMBER), None);
}

#[test]
fn carriers_spawn_inside_source_volume() {
    let origin = Vec3::new(0.0, -0.8, 0.0);
    let extent = Vec3::new(0.0, 0.8, 0.0);
    let config = Config::new(Duration::from_millis(100), 50, 0x0dd5).with_source(origin, extent);
    let mut emission = Emission::new([(CHAMBER, config)]);
    let mut commands = Vec::new();

    emission.handle(
        &[
            activated(Epoch::default()),
            advanced(Duration::from_secs(10)),
        ],
        false,
        &mut commands,
    );

    assert_eq!(emissions(&commands), 50);
    for command in &commands {
        if let Command::EmitCarrier { position, .. } = command {
            assert_eq!(position.x, 0.0);
            assert_eq!(position.z, 0.0);
            assert!((-0.8..=0.0).contains(&position.y), "{position:?}");
        }
    }
}

#[test]
fn reset_between_runs_repeats_positions() {
    let config = Config::new(Duration::from_secs(1), 3, 0xfeed).with_source(Vec3::ZERO, Vec3::ONE);
    let mut emission = Emission::new([(CHAMBER, config)]);
    let mut first = Vec::new();
    emission.handle(
        &[
            activated(Epoch::default()),
            advanced(Duration::from_secs(3)),
        ],
        false,
        &mut first,
    );

    let mut second = Vec::new();
    emission.handle(
        &[
            Event::ChamberReset {
                chamber: CHAMBER,
                epoch: Epoch::default(),
            },
            activated(Epoch::default()),
            advanced(Duration::from_secs(3)),
        ],
        false,
        &mut second,
    );

    assert_eq!(first, second);
}

#[test]
fn world_accepts_emitted_carriers() {
    let mut world = World::new();
    let mut events = Vec::new();
    world::apply(
        &mut world,
        Command::ActivateChamber { chamber: CHAMBER },
        &mut events,
    );

    let mut emission = Emission::new([(CHAMBER, Config::new(Duration::from_secs(1), 3, 9))]);
    let mut commands = Vec::new();
    events.push(advanced(Duration::from_secs(2)));
    emission.handle(&events, false, &mut commands);

    events.clear();
    for command in commands {
        world::apply(&mut world, command, &mut events);
    }

    assert_eq!(query::particle_count(&world, CHAMBER), 2);
    assert!(events
        .iter()
        .all(|event| matches!(event, Event::CarrierEmitted { .. })));
}
