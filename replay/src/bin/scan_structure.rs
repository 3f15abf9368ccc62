use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use liquiscope::{
    DataReceiver, EngineConfig, EngineEvent, EngineProfileConfig, MarketContext, Timeframe,
    init_logging, load_market_bar_inputs,
};

#[derive(Debug, Serialize)]
struct EventLine<'a> {
    symbol: &'a str,
    timeframe: &'a str,
    datetime: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a EngineEvent,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 5 {
        eprintln!(
            "usage: cargo run -q -p replay --bin scan_structure -- <csv_path> <symbol> <timeframe:1m|5m|15m|1h|4h|1d> <tick_size> [profile.yaml]"
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

    let mut context = MarketContext::new();
    context.register(symbol.as_str(), timeframe, config)?;
    let mut receiver = DataReceiver::new(context);

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let inputs = load_market_bar_inputs(&csv_path, symbol.as_str(), timeframe, tick_size)?;
    let bars = inputs.len();
    for input in inputs {
        let datetime = input.datetime;
        for event in receiver.ingest_bar(input)? {
            *counts.entry(format!("{:?}", event.event_type())).or_default() += 1;
            let line = EventLine {
                symbol: &symbol,
                timeframe: timeframe.as_str(),
                datetime,
                event: &event,
            };
            println!("{}", serde_json::to_string(&line)?);
        }
    }

    eprintln!("SCAN summary: bars={bars}");
    for (event_type, count) in &counts {
        eprintln!("- {event_type}: {count}");
    }

    Ok(())
}
