//! Full-engine scenario tests: join, launch, countdown, rounds, deaths and
//! endings, driven tick by tick exactly like the hosting server would.

use game_engine::movement::MovementConfig;
use game_engine::outbound::Outbound;
use game_engine::roles::RoleKind;
use game_engine::{AccelSample, Engine, GameSettings};
use protocol::{GamePhase, ServerMessage};
use rand::SeedableRng;
use rand::rngs::StdRng;

const TICK: u64 = 100;

fn settings() -> GameSettings {
    GameSettings {
        movement: MovementConfig {
            danger_threshold: 0.1,
            damage_multiplier: 50.0,
            death_threshold: 100.0,
            history_size: 5,
            smoothing_enabled: true,
            oneshot_mode: false,
        },
        round_count: 1,
        ..GameSettings::default()
    }
}

fn engine_with_players(settings: GameSettings, names: &[&str]) -> Engine {
    let mut engine = Engine::with_rng(settings, StdRng::seed_from_u64(42));
    for (i, name) in names.iter().enumerate() {
        engine
            .handle_join(&format!("p{i}"), name, 0)
            .expect("join should succeed in waiting");
    }
    engine.drain_outbound();
    engine
}

/// Steps through countdown and go delay until the round is live.
fn run_until_active(engine: &mut Engine) {
    for _ in 0..200 {
        if engine.phase() == GamePhase::Active {
            return;
        }
        engine.advance(TICK, 0);
    }
    panic!("never reached the active phase, stuck in {:?}", engine.phase());
}

fn full_swing(t: u64) -> AccelSample {
    AccelSample { x: 10.0, y: 10.0, z: 10.0, timestamp: t }
}

fn broadcasts(outbound: &[Outbound]) -> Vec<&ServerMessage> {
    outbound
        .iter()
        .filter_map(|o| match o {
            Outbound::Broadcast(m) => Some(m),
            _ => None,
        })
        .collect()
}

#[test]
fn classic_single_round_end_to_end() {
    let mut engine = engine_with_players(settings(), &["Ada", "Brim"]);
    engine.launch("classic", None).unwrap();
    assert_eq!(engine.phase(), GamePhase::PreGame);
    engine.proceed().unwrap();
    assert_eq!(engine.phase(), GamePhase::Countdown);
    run_until_active(&mut engine);
    engine.drain_outbound();

    // Ada swings at full force every tick; the third hit is lethal
    // ((1 - 0.1) * 50 = 45 damage per sample).
    let mut sent = 0;
    while engine.phase() == GamePhase::Active && sent < 10 {
        engine.handle_move("p0", full_swing(sent * TICK));
        engine.advance(TICK, 0);
        sent += 1;
    }
    assert_eq!(sent, 3);
    assert_eq!(engine.phase(), GamePhase::Finished);

    let outbound = engine.drain_outbound();
    let messages = broadcasts(&outbound);
    let death = messages.iter().find_map(|m| match m {
        ServerMessage::PlayerDeath { victim_id, .. } => Some(victim_id.clone()),
        _ => None,
    });
    assert_eq!(death, Some("p0".to_string()));

    let round_end = messages.iter().find_map(|m| match m {
        ServerMessage::RoundEnd { winner_id, scores, .. } => Some((winner_id.clone(), scores.clone())),
        _ => None,
    });
    let (winner_id, scores) = round_end.expect("round:end must fire");
    assert_eq!(winner_id, Some("p1".to_string()));
    assert_eq!(scores[0].player_id, "p1");
    assert_eq!(scores[0].total_points, 5);
    assert_eq!(scores[1].total_points, 3);

    let game_end = messages.iter().find_map(|m| match m {
        ServerMessage::GameEnd { winner, scores, .. } => Some((winner.clone(), scores.clone())),
        _ => None,
    });
    let (winner, final_scores) = game_end.expect("game:end must fire");
    assert_eq!(winner, Some("p1".to_string()));
    assert_eq!(final_scores[0].player_id, "p1");
    assert_eq!(final_scores[0].rank, 1);
}

#[test]
fn countdown_announces_every_second_and_go() {
    let mut engine = engine_with_players(settings(), &["Ada", "Brim"]);
    engine.launch("classic", None).unwrap();
    engine.drain_outbound();
    engine.proceed().unwrap();
    run_until_active(&mut engine);

    let outbound = engine.drain_outbound();
    let announcements: Vec<(String, u32)> = broadcasts(&outbound)
        .iter()
        .filter_map(|m| match m {
            ServerMessage::GameCountdown { phase, seconds_remaining } => {
                Some((phase.clone(), *seconds_remaining))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        announcements,
        vec![
            ("countdown".to_string(), 3),
            ("countdown".to_string(), 2),
            ("countdown".to_string(), 1),
            ("go".to_string(), 0),
        ]
    );
    let round_start = broadcasts(&outbound)
        .iter()
        .any(|m| matches!(m, ServerMessage::RoundStart { round_number: 1, .. }));
    assert!(round_start);
}

#[test]
fn launch_needs_two_players() {
    let mut engine = engine_with_players(settings(), &["Ada"]);
    let err = engine.launch("classic", None).unwrap_err();
    assert!(err.to_string().contains("2 players"));
    assert_eq!(engine.phase(), GamePhase::Waiting);

    let err = engine.launch("floor-is-lava", None).unwrap_err();
    assert_eq!(err.code(), "unknown_mode");
}

#[test]
fn ready_up_auto_proceeds_from_pre_game() {
    let mut engine = engine_with_players(settings(), &["Ada", "Brim"]);
    engine.launch("classic", None).unwrap();
    engine.handle_ready("p0", 0).unwrap();
    assert_eq!(engine.phase(), GamePhase::PreGame);
    engine.handle_ready("p1", 0).unwrap();
    assert_eq!(engine.phase(), GamePhase::Countdown);
}

#[test]
fn ready_delay_blocks_round_end_ready_until_housekeeping() {
    let mut settings = settings();
    settings.round_count = 2;
    let mut engine = engine_with_players(settings, &["Ada", "Brim", "Cleo"]);
    engine.launch("classic", None).unwrap();
    engine.proceed().unwrap();
    run_until_active(&mut engine);

    // One death ends nothing; the second leaves a single survivor.
    for _ in 0..3 {
        engine.handle_move("p0", full_swing(0));
    }
    for _ in 0..3 {
        engine.handle_move("p1", full_swing(0));
    }
    engine.advance(TICK, 50_000);
    assert_eq!(engine.phase(), GamePhase::RoundEnded);

    let err = engine.handle_ready("p0", 50_100).unwrap_err();
    assert_eq!(err.code(), "ready_delay");

    // The delay runs out on the wall clock via housekeeping.
    engine.housekeeping(50_000 + 1500);
    engine.handle_ready("p0", 52_000).unwrap();
    engine.handle_ready("p1", 52_000).unwrap();
    assert_eq!(engine.phase(), GamePhase::RoundEnded);
    engine.handle_ready("p2", 52_000).unwrap();
    assert_eq!(engine.phase(), GamePhase::Countdown);
}

#[test]
fn death_count_round_scores_by_deaths_ascending() {
    let mut cfg = settings();
    cfg.round_count = 1;
    cfg.round_duration = 90;
    let mut engine = engine_with_players(cfg, &["Ada", "Brim", "Cleo"]);
    engine.launch("death-count", None).unwrap();
    engine.proceed().unwrap();
    run_until_active(&mut engine);
    engine.drain_outbound();

    engine.players_mut()[0].death_count = 2;
    engine.players_mut()[1].death_count = 4;
    engine.players_mut()[2].death_count = 4;

    while engine.phase() == GamePhase::Active {
        engine.advance(TICK, 0);
    }
    assert_eq!(engine.phase(), GamePhase::Finished);

    let outbound = engine.drain_outbound();
    let scores = broadcasts(&outbound)
        .iter()
        .find_map(|m| match m {
            ServerMessage::RoundEnd { scores, winner_id, .. } => {
                Some((scores.clone(), winner_id.clone()))
            }
            _ => None,
        })
        .expect("round:end must fire");
    let (scores, winner_id) = scores;
    assert_eq!(winner_id, Some("p0".to_string()));
    // Ranks 1,2,2 pay 5,3,3.
    assert_eq!(scores[0].total_points, 5);
    assert_eq!(scores[1].total_points, 3);
    assert_eq!(scores[2].total_points, 3);
    assert_eq!(scores[1].rank, 2);
    assert_eq!(scores[2].rank, 2);
}

#[test]
fn death_count_respawns_keep_the_round_going() {
    let mut cfg = settings();
    cfg.round_count = 1;
    cfg.round_duration = 90;
    let mut engine = engine_with_players(cfg, &["Ada", "Brim"]);
    engine.launch("death-count", None).unwrap();
    engine.proceed().unwrap();
    run_until_active(&mut engine);
    engine.drain_outbound();

    for _ in 0..3 {
        engine.handle_move("p0", full_swing(0));
    }
    assert!(!engine.players()[0].is_alive);
    engine.advance(TICK, 0);
    // Still active: death count mode rounds only end on the clock.
    assert_eq!(engine.phase(), GamePhase::Active);

    // The respawn lands 5 s after the death.
    for _ in 0..50 {
        engine.advance(TICK, 0);
    }
    assert!(engine.players()[0].is_alive);
    assert_eq!(engine.players()[0].death_count, 1);
    assert_eq!(engine.players()[0].accumulated_damage, 0.0);
}

#[test]
fn domination_capture_race_and_win() {
    let mut cfg = settings();
    cfg.domination_point_target = 3;
    cfg.domination_control_interval = 5;
    let mut engine = engine_with_players(cfg, &["Ada", "Brim"]);
    engine.handle_base_register(Some("door".into())).unwrap();
    engine.launch("domination", None).unwrap();
    engine.proceed().unwrap();
    run_until_active(&mut engine);
    engine.drain_outbound();

    // Red grabs the base right at the whistle.
    engine.handle_base_tap("door").unwrap();
    for _ in 0..49 {
        engine.advance(TICK, 0);
    }
    // Stolen at 4.9 s, just before the first interval pays.
    engine.handle_base_tap("door").unwrap();

    while engine.phase() == GamePhase::Active && engine.game_time() < 60_000 {
        engine.advance(TICK, 0);
    }
    assert_eq!(engine.phase(), GamePhase::Finished);
    // The steal happened at 4900; three intervals later is 19900.
    assert_eq!(engine.game_time(), 19_900);

    let outbound = engine.drain_outbound();
    let win = broadcasts(&outbound).iter().find_map(|m| match m {
        ServerMessage::DominationWin { winning_team_id, team_scores, .. } => {
            Some((*winning_team_id, team_scores.clone()))
        }
        _ => None,
    });
    let (team, scores) = win.expect("domination:win must fire");
    assert_eq!(team, 1);
    assert_eq!(scores.iter().find(|t| t.team_id == 1).unwrap().score, 3);
    assert_eq!(scores.iter().find(|t| t.team_id == 0).unwrap().score, 0);
}

#[test]
fn sole_survivor_in_grace_holds_the_round_then_draws() {
    let mut engine = engine_with_players(settings(), &["Ada", "Brim", "Cleo"]);
    engine.launch("classic", None).unwrap();
    engine.proceed().unwrap();
    run_until_active(&mut engine);
    engine.drain_outbound();

    for _ in 0..3 {
        engine.handle_move("p0", full_swing(0));
    }
    for _ in 0..3 {
        engine.handle_move("p1", full_swing(0));
    }
    // The last player standing drops off the network before the next tick.
    engine.handle_disconnect("p2", 1000);
    let disconnect_time = engine.game_time();

    engine.advance(TICK, 0);
    assert_eq!(engine.phase(), GamePhase::Active);

    // The round holds for the whole grace window...
    while engine.game_time() < disconnect_time + 10_000 - TICK {
        engine.advance(TICK, 0);
        assert_eq!(engine.phase(), GamePhase::Active);
    }
    // ...and ends in a draw when it expires.
    engine.advance(TICK, 0);
    assert_eq!(engine.phase(), GamePhase::Finished);

    let outbound = engine.drain_outbound();
    let winner = broadcasts(&outbound)
        .iter()
        .find_map(|m| match m {
            ServerMessage::GameEnd { winner, .. } => Some(winner.clone()),
            _ => None,
        })
        .expect("game:end must fire");
    assert_eq!(winner, None);
}

#[test]
fn vampire_bloodlust_times_out_and_kills() {
    let mut cfg = settings();
    cfg.theme = "gothic".into();
    let mut engine = engine_with_players(cfg, &["Ada", "Brim", "Cleo"]);
    engine.launch("role-based", None).unwrap();
    engine.proceed().unwrap();
    run_until_active(&mut engine);

    // Pin the cast for determinism.
    engine.players_mut()[0].assign_role(RoleKind::Vampire);
    engine.players_mut()[1].assign_role(RoleKind::Survivor);
    engine.players_mut()[2].assign_role(RoleKind::Survivor);
    engine.drain_outbound();

    // Nothing happens until the bloodlust cooldown elapses.
    while engine.game_time() < 30_000 {
        engine.advance(TICK, 0);
    }
    let outbound = engine.drain_outbound();
    let started = broadcasts(&outbound).iter().any(|m| {
        matches!(m, ServerMessage::VampireBloodlust { vampire_id, active: true, .. } if vampire_id == "p0")
    });
    assert!(started);
    assert!(engine.players()[0].is_alive);

    // Nobody dies within the window: the vampire pays with its life.
    while engine.game_time() < 35_000 {
        engine.advance(TICK, 0);
    }
    let outbound = engine.drain_outbound();
    let messages = broadcasts(&outbound);
    let ended = messages.iter().any(|m| {
        matches!(m, ServerMessage::VampireBloodlust { vampire_id, active: false, .. } if vampire_id == "p0")
    });
    let death = messages.iter().any(|m| {
        matches!(m, ServerMessage::PlayerDeath { victim_id, .. } if victim_id == "p0")
    });
    assert!(ended);
    assert!(death);
    assert_eq!(engine.players()[0].points, 0);
    assert!(!engine.players()[0].is_alive);
}

#[test]
fn reconnect_with_token_restores_the_session() {
    let mut engine = engine_with_players(settings(), &["Ada", "Brim"]);
    let token = engine.registry().get("p0").unwrap().session_token.clone();

    engine.handle_disconnect("p0", 1000);
    let ack = engine.handle_reconnect(&token, 2000).unwrap();
    assert_eq!(ack.player_id, "p0");
    assert_eq!(ack.player_number, 1);
    assert_eq!(ack.game_state, GamePhase::Waiting);

    // A second reconnect with the same token also succeeds.
    let ack = engine.handle_reconnect(&token, 3000).unwrap();
    assert_eq!(ack.player_id, "p0");

    let err = engine.handle_reconnect("bogus", 4000).unwrap_err();
    assert_eq!(err.code(), "unknown_token");
}

#[test]
fn lobby_grace_expiry_frees_the_number() {
    let mut engine = engine_with_players(settings(), &["Ada", "Brim"]);
    engine.handle_disconnect("p0", 1000);
    engine.housekeeping(10_999);
    assert!(engine.registry().get("p0").is_some());
    engine.housekeeping(11_000);
    assert!(engine.registry().get("p0").is_none());
    assert_eq!(engine.players().len(), 1);

    // The freed number goes to the next join.
    let ack = engine.handle_join("p9", "Dara", 12_000).unwrap();
    assert_eq!(ack.player_number, 1);
}

#[test]
fn stop_resets_the_game_but_keeps_the_lobby() {
    let mut engine = engine_with_players(settings(), &["Ada", "Brim"]);
    engine.launch("classic", None).unwrap();
    engine.proceed().unwrap();
    run_until_active(&mut engine);
    engine.drain_outbound();

    engine.stop();
    assert_eq!(engine.phase(), GamePhase::Waiting);
    assert_eq!(engine.players().len(), 2);
    assert!(engine.players().iter().all(|p| p.is_alive));

    let outbound = engine.drain_outbound();
    assert!(broadcasts(&outbound)
        .iter()
        .any(|m| matches!(m, ServerMessage::GameStopped {})));
}

#[test]
fn tap_outside_a_round_is_rejected_with_a_code() {
    let mut engine = engine_with_players(settings(), &["Ada", "Brim"]);
    engine.drain_outbound();
    engine.handle_tap("p0");
    let outbound = engine.drain_outbound();
    let result = outbound.iter().find_map(|o| match o {
        Outbound::ToPlayer { player_id, message: ServerMessage::PlayerTapResult { success, reason, .. } }
            if player_id == "p0" =>
        {
            Some((*success, reason.clone()))
        }
        _ => None,
    });
    let (success, reason) = result.expect("tap result must be targeted at the sender");
    assert!(!success);
    assert_eq!(reason.as_deref(), Some("not_active"));
}

#[test]
fn every_active_tick_snapshots_every_player_once() {
    let mut engine = engine_with_players(settings(), &["Ada", "Brim", "Cleo"]);
    engine.launch("classic", None).unwrap();
    engine.proceed().unwrap();
    run_until_active(&mut engine);
    engine.drain_outbound();

    for _ in 0..5 {
        engine.advance(TICK, 0);
        let outbound = engine.drain_outbound();
        let ticks: Vec<_> = broadcasts(&outbound)
            .iter()
            .filter_map(|m| match m {
                ServerMessage::GameTick(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].players.len(), 3);
        let mut ids: Vec<_> = ticks[0].players.iter().map(|p| p.id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
