use chrono::{Duration, TimeZone, Utc};

use liquiscope::{
    Bar, EngineConfig, EngineEvent, LevelRegistry, LiquiditySide, StructureEngine, SwingKind,
    SwingPoint, Timeframe,
};

fn bar(index: u64, open: f64, high: f64, low: f64, close: f64) -> Bar {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    Bar {
        index,
        datetime: base + Duration::minutes(index as i64),
        open_price: open,
        high_price: high,
        low_price: low,
        close_price: close,
        tick_size: 0.25,
    }
}

fn point(kind: SwingKind, price: f64, bar_index: u64) -> SwingPoint {
    SwingPoint {
        kind,
        price,
        bar_index,
        confirmed_at_bar_index: bar_index + 2,
    }
}

fn registry(equal_tolerance_ticks: u32) -> LevelRegistry {
    LevelRegistry::new(&EngineConfig {
        equal_tolerance_ticks,
        ..EngineConfig::default()
    })
    .expect("valid config")
}

#[test]
fn nearby_highs_cluster_symmetrically() {
    let mut levels = registry(1);
    let first = levels.on_swing_point(&point(SwingKind::High, 100.00, 0), 0.25);
    assert!(first.matches.is_empty());
    assert_eq!(first.level.side, LiquiditySide::Bsl);

    let second = levels.on_swing_point(&point(SwingKind::High, 100.20, 3), 0.25);
    assert_eq!(second.matches.len(), 1);
    assert_eq!(second.matches[0].matched_level_id, first.level.id);

    for id in [first.level.id, second.level.id] {
        let level = levels.get(id).expect("resident");
        assert!(level.is_equal);
        assert_eq!(level.equal_count, 2);
    }
}

#[test]
fn equal_count_tracks_cluster_size() {
    let mut levels = registry(1);
    let a = levels.on_swing_point(&point(SwingKind::High, 100.00, 0), 0.25);
    let b = levels.on_swing_point(&point(SwingKind::High, 100.20, 3), 0.25);
    let c = levels.on_swing_point(&point(SwingKind::High, 100.10, 6), 0.25);
    assert_eq!(c.matches.len(), 2);
    assert_eq!(c.level.equal_count, 3);

    for id in [a.level.id, b.level.id, c.level.id] {
        assert_eq!(levels.get(id).expect("resident").equal_count, 3);
    }

    let far = levels.on_swing_point(&point(SwingKind::High, 100.60, 9), 0.25);
    assert!(far.matches.is_empty());
    assert!(!far.level.is_equal);
    assert_eq!(far.level.equal_count, 1);
}

#[test]
fn clustering_ignores_other_side_and_swept_levels() {
    let mut levels = registry(2);
    let high = levels.on_swing_point(&point(SwingKind::High, 100.0, 0), 0.25);
    let low = levels.on_swing_point(&point(SwingKind::Low, 100.25, 1), 0.25);
    assert!(low.matches.is_empty());

    let sweeps = levels.on_bar(&bar(5, 100.5, 100.75, 100.5, 100.5));
    assert_eq!(sweeps.len(), 1);
    assert_eq!(sweeps[0].level_id, high.level.id);

    let later = levels.on_swing_point(&point(SwingKind::High, 100.1, 4), 0.25);
    assert!(later.matches.is_empty());
}

#[test]
fn sweep_requires_strict_excursion() {
    let mut levels = registry(0);
    let _ = levels.on_swing_point(&point(SwingKind::High, 100.0, 0), 0.25);
    assert!(levels.on_bar(&bar(3, 99.5, 100.0, 99.0, 99.75)).is_empty());

    let sweeps = levels.on_bar(&bar(4, 99.75, 100.5, 99.5, 100.25));
    assert_eq!(sweeps.len(), 1);
    assert!(!sweeps[0].wick_sweep, "closed above the level");
    assert_eq!(sweeps[0].swept_price, 100.5);

    assert!(levels.on_bar(&bar(5, 100.25, 101.0, 100.0, 100.5)).is_empty());
    let level = levels.get(sweeps[0].level_id).expect("resident");
    assert!(level.is_swept);
    assert_eq!(level.swept_at_bar_index, Some(4));
}

#[test]
fn ssl_wick_sweep_closes_back_above() {
    let mut levels = registry(0);
    let _ = levels.on_swing_point(&point(SwingKind::Low, 90.0, 0), 0.25);
    let sweeps = levels.on_bar(&bar(3, 90.5, 91.0, 89.5, 90.5));
    assert_eq!(sweeps.len(), 1);
    assert_eq!(sweeps[0].side, LiquiditySide::Ssl);
    assert!(sweeps[0].wick_sweep);
}

#[test]
fn sweep_buffer_widens_the_trigger() {
    let mut levels = LevelRegistry::new(&EngineConfig {
        sweep_buffer_ticks: 1,
        ..EngineConfig::default()
    })
    .expect("valid config");
    let _ = levels.on_swing_point(&point(SwingKind::High, 100.0, 0), 0.25);
    assert!(levels.on_bar(&bar(3, 99.5, 100.25, 99.0, 99.75)).is_empty());
    assert_eq!(levels.on_bar(&bar(4, 99.5, 100.5, 99.0, 99.75)).len(), 1);
}

#[test]
fn engine_reports_wick_sweep_of_confirmed_high() {
    let mut engine = StructureEngine::new(
        "MES",
        Timeframe::M15,
        EngineConfig {
            strength: 2,
            ..EngineConfig::default()
        },
    )
    .expect("valid config");

    for (i, high) in [10.0, 11.0, 12.0, 11.0].iter().enumerate() {
        let _ = engine
            .process_bar(&bar(i as u64, high - 0.5, *high, high - 1.0, high - 0.25))
            .expect("ordered");
    }
    let events = engine.process_bar(&bar(4, 9.5, 10.0, 9.0, 9.75)).expect("ordered");
    assert!(matches!(
        &events[..2],
        [
            EngineEvent::SwingConfirmed { kind: SwingKind::High, pivot_bar_index: 2, bar_index: 4, .. },
            EngineEvent::LevelRegistered { bar_index: 4, .. },
        ]
    ));

    let events = engine.process_bar(&bar(5, 11.5, 12.1, 11.5, 11.8)).expect("ordered");
    let sweep = events
        .iter()
        .find_map(|x| match x {
            EngineEvent::LevelSwept { sweep, .. } => Some(sweep.clone()),
            _ => None,
        })
        .expect("level swept");
    assert_eq!(sweep.level_price, 12.0);
    assert_eq!(sweep.origin_bar_index, 2);
    assert_eq!(sweep.bar_index, 5);
    assert!(sweep.wick_sweep);
}
