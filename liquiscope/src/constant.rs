use serde::{Deserialize, Serialize};
use thiserror::Error;

/// pivot 取自 bar 的哪一端。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

impl SwingKind {
    pub fn opposite(self) -> Self {
        match self {
            Self::High => Self::Low,
            Self::Low => Self::High,
        }
    }

    /// 「越过」指更高价格时为 +1，指更低价格时为 -1。
    pub fn sign(self) -> f64 {
        match self {
            Self::High => 1.0,
            Self::Low => -1.0,
        }
    }

    /// 收盘突破该类 pivot 时的方向。
    pub fn break_polarity(self) -> Polarity {
        match self {
            Self::High => Polarity::Bullish,
            Self::Low => Polarity::Bearish,
        }
    }

    pub fn liquidity_side(self) -> LiquiditySide {
        match self {
            Self::High => LiquiditySide::Bsl,
            Self::Low => LiquiditySide::Ssl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Bullish,
    Bearish,
}

impl Polarity {
    pub fn opposite(self) -> Self {
        match self {
            Self::Bullish => Self::Bearish,
            Self::Bearish => Self::Bullish,
        }
    }

    pub fn break_kind(self) -> SwingKind {
        match self {
            Self::Bullish => SwingKind::High,
            Self::Bearish => SwingKind::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
        }
    }
}

/// BSL 位于 swing high 之上，SSL 位于 swing low 之下。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquiditySide {
    Bsl,
    Ssl,
}

impl LiquiditySide {
    pub fn swing_kind(self) -> SwingKind {
        match self {
            Self::Bsl => SwingKind::High,
            Self::Ssl => SwingKind::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bsl => "BSL",
            Self::Ssl => "SSL",
        }
    }
}

/// swing 窗口内等高/等低的处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotBoundary {
    /// 中心 bar 必须严格优于窗口内其他所有 bar。
    #[default]
    Strict,
    /// 与中心在 epsilon 内相等的邻居不影响判定。
    Inclusive,
    /// 左侧必须严格优于，右侧允许相等。
    LeftStrict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    SwingConfirmed,
    LevelRegistered,
    LevelEqualCluster,
    LevelSwept,
    StructureBreak,
    ChangeOfCharacter,
    MarketStructureBreak,
    BreakoutTrap,
    RejectionWick,
    OrderBlockDetected,
    OrderBlockRetest,
    FairValueGap,
    PremiumDiscountZone,
    TrendlineLiquidity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    pub fn parse(value: &str) -> Result<Self, EngineError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1m" => Ok(Self::M1),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "1h" => Ok(Self::H1),
            "4h" => Ok(Self::H4),
            "1d" => Ok(Self::D1),
            _ => Err(EngineError::InvalidTimeframe(value.to_string())),
        }
    }
}

pub struct Const;

impl Const {
    /// 所有价格比较使用的浮点容差。
    pub const PRICE_EPSILON: f64 = 1e-9;
    pub const LOOKBACK_LIMIT: usize = 300;
    pub const MAX_RESIDENT_LEVELS: usize = 500;
    pub const MAX_STRENGTH: usize = 20;
    pub const ORDER_BLOCK_LOOKBACK: usize = 20;
    pub const MAX_ORDER_BLOCK_LOOKBACK: usize = 200;
    pub const MIN_TRENDLINE_POINTS: usize = 2;
    pub const MAX_TRENDLINE_POINTS: usize = 10;
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid bar #{index}: {reason}")]
    InvalidBar { index: u64, reason: String },

    #[error("out of order bar: last index {last}, got {got}")]
    OutOfOrderBar { last: u64, got: u64 },

    #[error("non contiguous bar: expected index {expected}, got {got}")]
    NonContiguousBar { expected: u64, got: u64 },

    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("unknown series: {0}")]
    UnknownSeries(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}
