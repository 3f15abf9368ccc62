use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::constant::{EventType, Polarity, SwingKind, Timeframe};
use crate::level::{EqualMatch, LiquidityLevel, SweepEvent};
use crate::structure::StructureSignal;
use crate::swing::SwingPoint;
use crate::trap::TrapSignal;
use crate::trendline::Trendline;
use crate::zone::{PriceZone, ZoneSignal};

/// 引擎输出的全部事件，按发出顺序排列。`bar_index` 始终是产生该事件的 bar。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// `pivot_bar_index` 是 pivot 所在 bar，`bar_index` 是确认它的 bar。
    SwingConfirmed {
        kind: SwingKind,
        price: f64,
        pivot_bar_index: u64,
        bar_index: u64,
    },
    LevelRegistered {
        bar_index: u64,
        level: LiquidityLevel,
    },
    /// 新 level 与已有同侧 level 落在容差内。
    LevelEqualCluster {
        bar_index: u64,
        cluster: EqualMatch,
    },
    LevelSwept {
        bar_index: u64,
        sweep: SweepEvent,
    },
    StructureBreak {
        polarity: Polarity,
        bar_index: u64,
        level: f64,
        close_price: f64,
    },
    ChangeOfCharacter {
        polarity: Polarity,
        bar_index: u64,
        swing_price: f64,
        previous_price: f64,
    },
    MarketStructureBreak {
        polarity: Polarity,
        bar_index: u64,
        level: f64,
        close_price: f64,
    },
    BreakoutTrap {
        polarity: Polarity,
        level_id: u64,
        level_price: f64,
        sweep_bar_index: u64,
        bar_index: u64,
        close_price: f64,
    },
    RejectionWick {
        polarity: Polarity,
        level_id: u64,
        level_price: f64,
        sweep_bar_index: u64,
        bar_index: u64,
        wick_price: f64,
    },
    OrderBlockDetected {
        bar_index: u64,
        zone: PriceZone,
    },
    /// `entry_price` 为回踩 bar 的高低点中值。
    OrderBlockRetest {
        polarity: Polarity,
        zone_id: u64,
        bar_index: u64,
        entry_price: f64,
    },
    FairValueGap {
        bar_index: u64,
        zone: PriceZone,
    },
    PremiumDiscountZone {
        bar_index: u64,
        zone: PriceZone,
        swing_high: f64,
        swing_low: f64,
    },
    TrendlineLiquidity {
        bar_index: u64,
        trendline: Trendline,
    },
}

impl EngineEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::SwingConfirmed { .. } => EventType::SwingConfirmed,
            Self::LevelRegistered { .. } => EventType::LevelRegistered,
            Self::LevelEqualCluster { .. } => EventType::LevelEqualCluster,
            Self::LevelSwept { .. } => EventType::LevelSwept,
            Self::StructureBreak { .. } => EventType::StructureBreak,
            Self::ChangeOfCharacter { .. } => EventType::ChangeOfCharacter,
            Self::MarketStructureBreak { .. } => EventType::MarketStructureBreak,
            Self::BreakoutTrap { .. } => EventType::BreakoutTrap,
            Self::RejectionWick { .. } => EventType::RejectionWick,
            Self::OrderBlockDetected { .. } => EventType::OrderBlockDetected,
            Self::OrderBlockRetest { .. } => EventType::OrderBlockRetest,
            Self::FairValueGap { .. } => EventType::FairValueGap,
            Self::PremiumDiscountZone { .. } => EventType::PremiumDiscountZone,
            Self::TrendlineLiquidity { .. } => EventType::TrendlineLiquidity,
        }
    }

    pub fn bar_index(&self) -> u64 {
        match self {
            Self::SwingConfirmed { bar_index, .. }
            | Self::LevelRegistered { bar_index, .. }
            | Self::LevelEqualCluster { bar_index, .. }
            | Self::LevelSwept { bar_index, .. }
            | Self::StructureBreak { bar_index, .. }
            | Self::ChangeOfCharacter { bar_index, .. }
            | Self::MarketStructureBreak { bar_index, .. }
            | Self::BreakoutTrap { bar_index, .. }
            | Self::RejectionWick { bar_index, .. }
            | Self::OrderBlockDetected { bar_index, .. }
            | Self::OrderBlockRetest { bar_index, .. }
            | Self::FairValueGap { bar_index, .. }
            | Self::PremiumDiscountZone { bar_index, .. }
            | Self::TrendlineLiquidity { bar_index, .. } => *bar_index,
        }
    }

    pub fn polarity(&self) -> Option<Polarity> {
        match self {
            Self::StructureBreak { polarity, .. }
            | Self::ChangeOfCharacter { polarity, .. }
            | Self::MarketStructureBreak { polarity, .. }
            | Self::BreakoutTrap { polarity, .. }
            | Self::RejectionWick { polarity, .. }
            | Self::OrderBlockRetest { polarity, .. } => Some(*polarity),
            Self::OrderBlockDetected { zone, .. }
            | Self::FairValueGap { zone, .. }
            | Self::PremiumDiscountZone { zone, .. } => Some(zone.polarity),
            _ => None,
        }
    }
}

impl From<SwingPoint> for EngineEvent {
    fn from(point: SwingPoint) -> Self {
        Self::SwingConfirmed {
            kind: point.kind,
            price: point.price,
            pivot_bar_index: point.bar_index,
            bar_index: point.confirmed_at_bar_index,
        }
    }
}

impl From<SweepEvent> for EngineEvent {
    fn from(sweep: SweepEvent) -> Self {
        Self::LevelSwept {
            bar_index: sweep.bar_index,
            sweep,
        }
    }
}

impl From<StructureSignal> for EngineEvent {
    fn from(signal: StructureSignal) -> Self {
        match signal {
            StructureSignal::Break {
                polarity,
                bar_index,
                level,
                close_price,
            } => Self::StructureBreak {
                polarity,
                bar_index,
                level,
                close_price,
            },
            StructureSignal::ChangeOfCharacter {
                polarity,
                bar_index,
                swing_price,
                previous_price,
            } => Self::ChangeOfCharacter {
                polarity,
                bar_index,
                swing_price,
                previous_price,
            },
            StructureSignal::MarketStructureBreak {
                polarity,
                bar_index,
                level,
                close_price,
            } => Self::MarketStructureBreak {
                polarity,
                bar_index,
                level,
                close_price,
            },
        }
    }
}

impl From<TrapSignal> for EngineEvent {
    fn from(signal: TrapSignal) -> Self {
        match signal {
            TrapSignal::BreakoutTrap {
                polarity,
                level_id,
                level_price,
                sweep_bar_index,
                bar_index,
                close_price,
            } => Self::BreakoutTrap {
                polarity,
                level_id,
                level_price,
                sweep_bar_index,
                bar_index,
                close_price,
            },
            TrapSignal::RejectionWick {
                polarity,
                level_id,
                level_price,
                sweep_bar_index,
                bar_index,
                wick_price,
            } => Self::RejectionWick {
                polarity,
                level_id,
                level_price,
                sweep_bar_index,
                bar_index,
                wick_price,
            },
        }
    }
}

impl From<ZoneSignal> for EngineEvent {
    fn from(signal: ZoneSignal) -> Self {
        match signal {
            ZoneSignal::OrderBlock(zone) => Self::OrderBlockDetected {
                bar_index: zone.created_at_bar_index,
                zone,
            },
            ZoneSignal::OrderBlockRetest {
                polarity,
                zone_id,
                bar_index,
                entry_price,
            } => Self::OrderBlockRetest {
                polarity,
                zone_id,
                bar_index,
                entry_price,
            },
            ZoneSignal::FairValueGap(zone) => Self::FairValueGap {
                bar_index: zone.created_at_bar_index,
                zone,
            },
            ZoneSignal::PremiumDiscount {
                zone,
                swing_high,
                swing_low,
            } => Self::PremiumDiscountZone {
                bar_index: zone.created_at_bar_index,
                zone,
                swing_high,
                swing_low,
            },
        }
    }
}

pub type Subscriber = Arc<dyn Fn(&str, Timeframe, &EngineEvent) + Send + Sync>;

#[derive(Default)]
pub struct Observable {
    subscribers: HashMap<EventType, Vec<Subscriber>>,
    all_subscribers: Vec<Subscriber>,
}

impl Observable {
    /// `None` 订阅全部事件类型。
    pub fn subscribe(&mut self, event_type: Option<EventType>, subscriber: Subscriber) {
        if let Some(event_type) = event_type {
            self.subscribers
                .entry(event_type)
                .or_default()
                .push(subscriber);
        } else {
            self.all_subscribers.push(subscriber);
        }
    }

    pub fn notify(&self, symbol: &str, timeframe: Timeframe, event: &EngineEvent) {
        if let Some(subscribers) = self.subscribers.get(&event.event_type()) {
            for subscriber in subscribers {
                subscriber(symbol, timeframe, event);
            }
        }

        for subscriber in &self.all_subscribers {
            subscriber(symbol, timeframe, event);
        }
    }
}
