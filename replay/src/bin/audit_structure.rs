use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use liquiscope::{
    EngineConfig, EngineEvent, EngineProfileConfig, Polarity, StructureEngine, SwingKind, Timeframe,
    init_logging, load_bars,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 5 {
        eprintln!(
            "usage: cargo run -q -p replay --bin audit_structure -- <csv_path> <symbol> <timeframe:1m|5m|15m|1h|4h|1d> <tick_size> [profile.yaml]"
        );
        std::process::exit(2);
    }

    init_logging();

    let csv_path = PathBuf::from(&args[1]);
    let symbol = args[2].clone();
    let timeframe = Timeframe::parse(&args[3])?;
    let tick_size = args[4].parse::<f64>()?;
    let config = match args.get(5) {
        Some(path) => EngineProfileConfig::from_yaml_file(path)?.resolve_for(&symbol, timeframe)?,
        None => EngineConfig::default(),
    };

    let strength = config.strength as u64;
    let trap_window = config.trap_retest_bars;
    let mut engine = StructureEngine::new(symbol.as_str(), timeframe, config)?;

    let mut violations = Vec::<String>::new();
    let mut pivots: HashSet<(SwingKind, u64)> = HashSet::new();
    let mut swept: HashSet<u64> = HashSet::new();
    let mut trapped: HashSet<u64> = HashSet::new();
    let mut clustered: Vec<(u64, u64)> = Vec::new();
    let mut retested: HashSet<u64> = HashSet::new();
    let mut zones = 0usize;
    let mut breaks: HashMap<Polarity, u32> = HashMap::new();
    let mut total_events = 0usize;

    let bars = load_bars(&csv_path, tick_size)?;
    for bar in &bars {
        let events = engine.process_bar(bar)?;
        total_events += events.len();

        for event in &events {
            if event.bar_index() != bar.index {
                violations.push(format!(
                    "EVENT index mismatch at bar {}: {:?}",
                    bar.index,
                    event.event_type()
                ));
            }

            match event {
                EngineEvent::SwingConfirmed {
                    kind,
                    pivot_bar_index,
                    bar_index,
                    ..
                } => {
                    if bar_index - pivot_bar_index != strength {
                        violations.push(format!(
                            "SWING lag mismatch pivot={pivot_bar_index} confirmed={bar_index} strength={strength}"
                        ));
                    }
                    if !pivots.insert((*kind, *pivot_bar_index)) {
                        violations.push(format!("SWING duplicate {kind:?} at bar {pivot_bar_index}"));
                    }
                    breaks.insert(kind.break_polarity(), 0);
                }
                EngineEvent::LevelEqualCluster { cluster, .. } => {
                    clustered.push((cluster.level_id, cluster.matched_level_id));
                }
                EngineEvent::LevelSwept { sweep, .. } => {
                    if !swept.insert(sweep.level_id) {
                        violations.push(format!("LEVEL swept twice id={}", sweep.level_id));
                    }
                    if sweep.bar_index <= sweep.level.registered_at_bar_index {
                        violations.push(format!(
                            "LEVEL swept before registration id={} bar={}",
                            sweep.level_id, sweep.bar_index
                        ));
                    }
                }
                EngineEvent::StructureBreak { polarity, bar_index, .. } => {
                    let count = breaks.entry(*polarity).or_insert(0);
                    *count += 1;
                    if *count > 1 {
                        violations.push(format!(
                            "STRUCTURE repeated {} break at bar {bar_index}",
                            polarity.as_str()
                        ));
                    }
                }
                EngineEvent::BreakoutTrap {
                    level_id,
                    sweep_bar_index,
                    bar_index,
                    ..
                } => {
                    let age = bar_index.saturating_sub(*sweep_bar_index);
                    if age == 0 || age > trap_window {
                        violations.push(format!(
                            "TRAP outside window id={level_id} sweep={sweep_bar_index} bar={bar_index}"
                        ));
                    }
                    if !trapped.insert(*level_id) {
                        violations.push(format!("TRAP fired twice id={level_id}"));
                    }
                }
                EngineEvent::OrderBlockDetected { zone, bar_index } => {
                    zones += 1;
                    let broke = events.iter().any(|x| {
                        matches!(x, EngineEvent::StructureBreak { polarity, .. } if *polarity == zone.polarity)
                    });
                    if !broke || zone.source_bar_index >= *bar_index {
                        violations.push(format!(
                            "ZONE order block without break id={} bar={bar_index}",
                            zone.id
                        ));
                    }
                }
                EngineEvent::OrderBlockRetest { zone_id, .. } => {
                    if !retested.insert(*zone_id) {
                        violations.push(format!("ZONE order block retested twice id={zone_id}"));
                    }
                }
                EngineEvent::FairValueGap { .. } | EngineEvent::PremiumDiscountZone { .. } => {
                    zones += 1;
                }
                _ => {}
            }
        }
    }

    for (left, right) in &clustered {
        for id in [left, right] {
            if let Some(level) = engine.levels().get(*id) {
                if !level.is_equal || level.equal_count < 2 {
                    violations.push(format!("LEVEL cluster asymmetry id={id}"));
                }
            }
        }
    }

    println!(
        "AUDIT summary: bars={} events={} swings={} sweeps={} clusters={} traps={} zones={} resident_levels={}",
        bars.len(),
        total_events,
        pivots.len(),
        swept.len(),
        clustered.len(),
        trapped.len(),
        zones,
        engine.levels().len(),
    );

    if violations.is_empty() {
        println!("AUDIT result: PASS (no structural violations found)");
        return Ok(());
    }

    println!("AUDIT result: FAIL violations={}", violations.len());
    for item in violations.iter().take(30) {
        println!("- {item}");
    }
    if violations.len() > 30 {
        println!("- ... {} more", violations.len() - 30);
    }
    std::process::exit(1);
}
