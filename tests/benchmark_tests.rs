//! Performance benchmarks for critical game systems

use server::collisions::find_shot_hits;
use server::game::LocalGame;
use shared::codec::{encode_frame, FrameBuffer};
use shared::messages::{AddPlayerMsg, JoinRequestMsg, Message, ShotFiredMsg};
use shared::world::layout::MapLayout;
use shared::world::physics::Vector2;
use shared::world::snapshot::WorldSnapshot;
use shared::world::team::TeamId;
use shared::world::units::ShotKind;
use shared::{GameConfig, World, WorldRole, SHOT_BUCKET_RESOLUTION};
use std::time::Instant;

fn crowded_world(players: u8, shots: u16) -> World {
    let mut world = World::new(WorldRole::Server, MapLayout::standard(6, 4), Default::default());
    let size = world.map_size();
    for id in 1..=players {
        let team = if id % 2 == 0 { TeamId::A } else { TeamId::B };
        world
            .apply(
                &AddPlayerMsg {
                    player_id: id,
                    nick: format!("p{}", id),
                    team: Some(team),
                    zone_id: 1,
                    dead: false,
                    bot: true,
                }
                .into(),
            )
            .unwrap();
        let player = world.players.get_mut(&id).unwrap();
        player.motion.pos = Vector2::new(
            (id as f32 * 137.0) % size.x,
            (id as f32 * 71.0) % size.y,
        );
    }
    for shot_id in 0..shots {
        let shooter = (shot_id % players as u16) as u8 + 1;
        world
            .apply(
                &ShotFiredMsg {
                    player_id: shooter,
                    shot_id,
                    local_id: 0,
                    pos: Vector2::new((shot_id as f32 * 53.0) % size.x, (shot_id as f32 * 29.0) % size.y),
                    vel: Vector2::new(1.0, 0.0),
                    kind: ShotKind::Normal,
                }
                .into(),
            )
            .unwrap();
    }
    world
}

/// Benchmarks shot hit detection through the player grid
#[test]
fn benchmark_shot_hit_detection() {
    let world = crowded_world(100, 500);

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = find_shot_hits(&world, SHOT_BUCKET_RESOLUTION);
    }

    let duration = start.elapsed();
    println!(
        "Shot hit detection: {} players, {} shots, {} iterations in {:?} ({:.2} μs/iter)",
        world.players.len(),
        world.shots.len(),
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks full server ticks with a crowd of bots
#[test]
fn benchmark_server_ticks() {
    let mut game = LocalGame::with_seed(GameConfig::default(), MapLayout::standard(5, 3), 11);
    for n in 0..12 {
        game.add_bot(&format!("Bot{}", n), None);
    }
    assert_eq!(game.world.players.len(), 12);

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        game.tick();
        game.drain_outbox();
    }

    let duration = start.elapsed();
    println!(
        "Server ticks: {} bots × {} ticks in {:?} ({:.2} μs/tick)",
        game.world.players.len(),
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 10 seconds
    assert!(duration.as_millis() < 10_000);
}

/// Benchmarks the snapshot a joining client receives
#[test]
fn benchmark_snapshot_roundtrip() {
    let world = crowded_world(64, 200);

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let blob = world.dump_everything().to_blob().unwrap();
        let _snapshot = WorldSnapshot::from_blob(&blob).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Snapshot roundtrip: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks message framing on the wire
#[test]
fn benchmark_frame_codec() {
    let msg: Message = JoinRequestMsg {
        nick: "benchmark".into(),
        team: Some(TeamId::A),
        bot: false,
    }
    .into();

    let iterations = 100_000;
    let start = Instant::now();

    let mut frames = FrameBuffer::new();
    for _ in 0..iterations {
        let frame = encode_frame(&msg).unwrap();
        frames.push(&frame);
        assert!(frames.next_message().unwrap().is_some());
    }

    let duration = start.elapsed();
    println!(
        "Frame codec: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}
