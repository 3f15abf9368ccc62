pub mod bar;
pub mod config;
pub mod confluence;
pub mod constant;
pub mod context;
pub mod engine;
pub mod events;
pub mod level;
pub mod logging;
pub mod receiver;
pub mod structure;
pub mod swing;
pub mod trap;
pub mod trendline;
mod utils;
pub mod zone;

pub use bar::Bar;
pub use config::{EngineConfig, EngineConfigPatch, EngineProfileConfig};
pub use confluence::ConfluenceScore;
pub use constant::{
    Const, EngineError, EventType, LiquiditySide, PivotBoundary, Polarity, SwingKind, Timeframe,
};
pub use context::{MarketContext, SeriesKey};
pub use engine::{EngineSnapshot, StructureEngine};
pub use events::{EngineEvent, Observable, Subscriber};
pub use level::{EqualMatch, LevelRegistry, LiquidityLevel, Registration, SweepEvent};
pub use logging::init_logging;
pub use receiver::{DataReceiver, MarketBarInput, load_bars, load_market_bar_inputs, parse_datetime};
pub use structure::{StructureSignal, StructureState, StructureStateMachine};
pub use swing::{SwingDetector, SwingPoint};
pub use trap::{TrapCandidate, TrapDetector, TrapSignal};
pub use trendline::{Trendline, TrendlineTracker};
pub use zone::{PriceZone, ZoneDetector, ZoneOrigin, ZoneSignal};
