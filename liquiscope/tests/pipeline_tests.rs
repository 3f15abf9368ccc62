use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use liquiscope::{
    Bar, DataReceiver, EngineConfig, EngineError, EngineEvent, EngineProfileConfig, EventType,
    MarketContext, Polarity, SeriesKey, StructureEngine, Timeframe, load_bars,
};

const SESSION: [(f64, f64, f64, f64); 8] = [
    (101.5, 102.0, 101.0, 101.75),
    (102.0, 105.0, 102.0, 104.5),
    (104.0, 104.0, 101.0, 101.5),
    (101.5, 102.0, 100.0, 100.5),
    (101.5, 103.0, 101.0, 102.5),
    (101.75, 102.0, 100.5, 101.0),
    (100.5, 101.0, 99.0, 99.25),
    (99.5, 100.25, 99.25, 100.25),
];

fn session_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn session_bar(index: usize) -> Bar {
    let (open, high, low, close) = SESSION[index];
    Bar {
        index: index as u64,
        datetime: session_start() + Duration::minutes(15 * index as i64),
        open_price: open,
        high_price: high,
        low_price: low,
        close_price: close,
        tick_size: 0.25,
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        strength: 1,
        ..EngineConfig::default()
    }
}

fn dataset() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("dataset")
        .join("MES_15m.csv")
}

#[test]
fn session_produces_msb_then_trap() {
    let mut engine = StructureEngine::new("MES", Timeframe::M15, fast_config()).expect("valid config");
    let mut all = Vec::new();
    for i in 0..6 {
        all.extend(engine.process_bar(&session_bar(i)).expect("ordered"));
    }
    assert!(all.iter().any(|x| matches!(
        x,
        EngineEvent::ChangeOfCharacter { polarity: Polarity::Bearish, bar_index: 5, .. }
    )));

    let events = engine.process_bar(&session_bar(6)).expect("ordered");
    let kinds: Vec<EventType> = events.iter().map(EngineEvent::event_type).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::LevelSwept,
            EventType::StructureBreak,
            EventType::MarketStructureBreak,
            EventType::OrderBlockDetected,
        ]
    );
    assert!(events.iter().all(|x| x.polarity() != Some(Polarity::Bullish)));
    assert!(engine.snapshot().has_msb(Polarity::Bearish));

    let events = engine.process_bar(&session_bar(7)).expect("ordered");
    let kinds: Vec<EventType> = events.iter().map(EngineEvent::event_type).collect();
    assert_eq!(
        kinds,
        vec![
            EventType::SwingConfirmed,
            EventType::LevelRegistered,
            EventType::BreakoutTrap,
            EventType::RejectionWick,
            EventType::FairValueGap,
            EventType::PremiumDiscountZone,
            EventType::TrendlineLiquidity,
        ]
    );
    assert!(events[2..4].iter().all(|x| x.polarity() == Some(Polarity::Bullish)));
    assert!(events[4..6].iter().all(|x| x.polarity() == Some(Polarity::Bearish)));
    assert_eq!(engine.structure_state().bias(), Some(Polarity::Bearish));
    assert_eq!(engine.levels().len(), 4);
    assert_eq!(engine.levels().active().count(), 3);
}

#[test]
fn rejected_bar_does_not_change_snapshot() {
    let mut engine = StructureEngine::new("MES", Timeframe::M15, fast_config()).expect("valid config");
    for i in 0..5 {
        let _ = engine.process_bar(&session_bar(i)).expect("ordered");
    }
    let before = engine.snapshot();

    let mut bad = session_bar(5);
    bad.tick_size = 0.0;
    assert!(matches!(engine.process_bar(&bad), Err(EngineError::InvalidBar { .. })));
    assert!(matches!(
        engine.process_bar(&session_bar(4)),
        Err(EngineError::OutOfOrderBar { .. })
    ));
    assert!(matches!(
        engine.process_bar(&session_bar(6)),
        Err(EngineError::NonContiguousBar { .. })
    ));
    assert_eq!(engine.snapshot(), before);
    assert_eq!(engine.bar_count(), 5);

    assert!(engine.process_bar(&session_bar(5)).is_ok());
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    for strength in [0, 21, usize::MAX / 2] {
        let config = EngineConfig {
            strength,
            ..EngineConfig::default()
        };
        assert!(matches!(
            StructureEngine::new("MES", Timeframe::M15, config),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}

#[test]
fn session_zones_follow_structure() {
    let mut engine = StructureEngine::new("MES", Timeframe::M15, fast_config()).expect("valid config");
    let mut all = Vec::new();
    for i in 0..SESSION.len() {
        all.extend(engine.process_bar(&session_bar(i)).expect("ordered"));
    }

    let order_block = all
        .iter()
        .find_map(|x| match x {
            EngineEvent::OrderBlockDetected { bar_index, zone } => Some((*bar_index, zone.clone())),
            _ => None,
        })
        .expect("order block after the bearish break");
    assert_eq!(order_block.0, 6);
    assert_eq!(order_block.1.polarity, Polarity::Bearish);
    assert_eq!(order_block.1.source_bar_index, 4);
    assert_eq!((order_block.1.lower, order_block.1.upper), (101.0, 103.0));

    let gap = all
        .iter()
        .find_map(|x| match x {
            EngineEvent::FairValueGap { zone, .. } => Some(zone.clone()),
            _ => None,
        })
        .expect("gap between bars 5 and 7");
    assert_eq!(gap.polarity, Polarity::Bearish);
    assert_eq!((gap.lower, gap.upper, gap.source_bar_index), (100.25, 100.5, 6));

    let premium = engine.zones().premium_discount_zone().expect("premium zone");
    assert_eq!(premium.polarity, Polarity::Bearish);
    assert!((premium.lower - 101.0).abs() < 1e-9);
    assert!((premium.upper - 102.144).abs() < 1e-9);

    let lines: Vec<(u64, u64, u64)> = all
        .iter()
        .filter_map(|x| match x {
            EngineEvent::TrendlineLiquidity { bar_index, trendline } => Some((
                *bar_index,
                trendline.anchor_bar_index,
                trendline.last_bar_index,
            )),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec![(5, 1, 4), (7, 3, 6)]);
}

#[test]
fn context_fans_out_events_and_scores_confluence() {
    let mut context = MarketContext::new();
    for symbol in ["MES", "MNQ", "M2K"] {
        context
            .register(symbol, Timeframe::M15, fast_config())
            .expect("valid config");
    }

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    context.subscribe(
        Some(EventType::MarketStructureBreak),
        Arc::new(move |symbol: &str, _: Timeframe, _: &EngineEvent| {
            sink.lock().expect("lock").push(symbol.to_string());
        }),
    );

    for i in 0..7 {
        let bar = session_bar(i);
        context.append("MES", Timeframe::M15, &bar).expect("ordered");
        context.append("MNQ", Timeframe::M15, &bar).expect("ordered");
        if i < 6 {
            context.append("M2K", Timeframe::M15, &bar).expect("ordered");
        }
    }

    assert_eq!(*seen.lock().expect("lock"), vec!["MES".to_string(), "MNQ".to_string()]);

    let at = session_bar(6).datetime;
    let bearish = context.confluence(at, Polarity::Bearish);
    assert_eq!(bearish.count, 2);
    assert!(bearish.series.iter().all(|(symbol, _)| symbol != "M2K"));
    assert_eq!(context.confluence(at, Polarity::Bullish).count, 0);

    assert!(matches!(
        context.append("ES", Timeframe::M15, &session_bar(0)),
        Err(EngineError::UnknownSeries(_))
    ));
}

#[test]
fn receiver_ingests_csv_with_contiguous_indices() {
    let mut context = MarketContext::new();
    context
        .register("MES", Timeframe::M15, fast_config())
        .expect("valid config");
    let mut receiver = DataReceiver::new(context);

    let events = receiver
        .ingest_csv(dataset(), "MES", Timeframe::M15, 0.25)
        .expect("dataset should load");
    assert!(events.iter().any(|x| matches!(
        x,
        EngineEvent::MarketStructureBreak { polarity: Polarity::Bearish, bar_index: 6, .. }
    )));
    assert!(events.iter().any(|x| matches!(
        x,
        EngineEvent::BreakoutTrap { polarity: Polarity::Bullish, bar_index: 7, .. }
    )));

    let engine = receiver.context().engine("MES", Timeframe::M15).expect("registered");
    assert_eq!(engine.last_index(), Some(7));

    let _ = receiver
        .ingest_csv(dataset(), "MES", Timeframe::M15, 0.25)
        .expect("dataset should load");
    let engine = receiver.context().engine("MES", Timeframe::M15).expect("registered");
    assert_eq!(engine.last_index(), Some(15));

    let context = receiver.into_context();
    let snapshot = context.snapshot("MES", Timeframe::M15).expect("registered");
    assert_eq!(snapshot.bar_index, Some(15));
}

#[test]
fn profile_registration_resolves_per_series() {
    let profile = EngineProfileConfig::from_yaml_str(
        "default:\n  strength: 1\nsymbol:\n  MNQ:\n    strength: 3\n",
    )
    .expect("valid profile");

    let mut context = MarketContext::new();
    context
        .register_with_profile("MNQ", Timeframe::M15, &profile)
        .expect("valid config");
    context
        .register_with_profile("MES", Timeframe::M15, &profile)
        .expect("valid config");

    let keys: Vec<&SeriesKey> = context.series().collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].symbol, "MES");

    let mes = context.engine("MES", Timeframe::M15).expect("registered");
    assert_eq!(mes.config().strength, 1);
    let mnq = context.engine("MNQ", Timeframe::M15).expect("registered");
    assert_eq!(mnq.config().strength, 3);
}

#[test]
fn load_bars_matches_in_memory_session() {
    let bars = load_bars(dataset(), 0.25).expect("dataset should load");
    assert_eq!(bars.len(), SESSION.len());
    for (i, bar) in bars.iter().enumerate() {
        assert_eq!(*bar, session_bar(i));
    }
}

#[test]
fn parquet_snapshot_writes_levels_and_swings() {
    let mut context = MarketContext::new();
    context
        .register("MES", Timeframe::M15, fast_config())
        .expect("valid config");
    for i in 0..SESSION.len() {
        context.append("MES", Timeframe::M15, &session_bar(i)).expect("ordered");
    }

    let engine = context.engine("MES", Timeframe::M15).expect("registered");
    let levels = engine.levels_dataframe().expect("levels frame");
    assert_eq!(levels.height(), 4);
    let swings = engine.swings_dataframe().expect("swings frame");
    assert_eq!(swings.height(), 4);

    let dir = std::env::temp_dir().join("liquiscope_parquet_snapshot_test");
    context
        .write_parquet_snapshot("MES", Timeframe::M15, &dir)
        .expect("snapshot written");
    assert!(dir.join("levels_mes_15m.parquet").exists());
    assert!(dir.join("swings_mes_15m.parquet").exists());
    assert!(dir.join("zones_mes_15m.parquet").exists());
}
