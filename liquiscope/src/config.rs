//! 引擎参数与分层 YAML profile。
//!
//! profile 按以下顺序叠加：`default` → `timeframe` → `symbol` →
//! `symbol_timeframe["*.tf"]` → `symbol_timeframe["symbol.*"]` →
//! `symbol_timeframe["symbol.tf"]`，后者覆盖前者。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::constant::{Const, EngineError, PivotBoundary, Timeframe};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// swing 窗口的半宽，取值 `1..=Const::MAX_STRENGTH`。
    pub strength: usize,
    pub equal_tolerance_ticks: u32,
    pub break_threshold_ticks: u32,
    pub trap_retest_bars: u64,
    /// 0 表示永久保留已扫过的 level。
    pub lookback_horizon_bars: u64,
    pub max_resident_levels: usize,
    pub sweep_buffer_ticks: u32,
    pub pivot_boundary: PivotBoundary,
    /// BOS 之后向前回溯寻找 order block 的最大 bar 数。
    pub order_block_lookback_bars: usize,
    pub fvg_min_gap_ticks: u32,
    /// premium/discount 区间靠近均衡价的一侧（Fibonacci 比例）。
    pub fib_equilibrium: f64,
    /// premium/discount 区间远离均衡价的一侧。
    pub fib_extreme: f64,
    pub min_trendline_points: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strength: 5,
            equal_tolerance_ticks: 2,
            break_threshold_ticks: 2,
            trap_retest_bars: 3,
            lookback_horizon_bars: Const::LOOKBACK_LIMIT as u64,
            max_resident_levels: Const::MAX_RESIDENT_LEVELS,
            sweep_buffer_ticks: 0,
            pivot_boundary: PivotBoundary::Strict,
            order_block_lookback_bars: Const::ORDER_BLOCK_LOOKBACK,
            fvg_min_gap_ticks: 1,
            fib_equilibrium: 0.5,
            fib_extreme: 0.786,
            min_trendline_points: Const::MIN_TRENDLINE_POINTS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfigPatch {
    pub strength: Option<usize>,
    pub equal_tolerance_ticks: Option<u32>,
    pub break_threshold_ticks: Option<u32>,
    pub trap_retest_bars: Option<u64>,
    pub lookback_horizon_bars: Option<u64>,
    pub max_resident_levels: Option<usize>,
    pub sweep_buffer_ticks: Option<u32>,
    pub pivot_boundary: Option<PivotBoundary>,
    pub order_block_lookback_bars: Option<usize>,
    pub fvg_min_gap_ticks: Option<u32>,
    pub fib_equilibrium: Option<f64>,
    pub fib_extreme: Option<f64>,
    pub min_trendline_points: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineProfileConfig {
    #[serde(default)]
    pub default: EngineConfigPatch,
    #[serde(default)]
    pub timeframe: HashMap<String, EngineConfigPatch>,
    #[serde(default)]
    pub symbol: HashMap<String, EngineConfigPatch>,
    #[serde(default)]
    pub symbol_timeframe: HashMap<String, EngineConfigPatch>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid =
            |reason: String| -> Result<(), EngineError> { Err(EngineError::InvalidConfig(reason)) };

        if !(1..=Const::MAX_STRENGTH).contains(&self.strength) {
            return invalid(format!(
                "strength must be within 1..={}, got {}",
                Const::MAX_STRENGTH,
                self.strength
            ));
        }
        if self.trap_retest_bars < 1 {
            return invalid("trap_retest_bars must be at least 1".to_string());
        }
        if self.max_resident_levels < 1 {
            return invalid("max_resident_levels must be at least 1".to_string());
        }
        if !(1..=Const::MAX_ORDER_BLOCK_LOOKBACK).contains(&self.order_block_lookback_bars) {
            return invalid(format!(
                "order_block_lookback_bars must be within 1..={}, got {}",
                Const::MAX_ORDER_BLOCK_LOOKBACK,
                self.order_block_lookback_bars
            ));
        }
        if self.fvg_min_gap_ticks < 1 {
            return invalid("fvg_min_gap_ticks must be at least 1".to_string());
        }
        let fib_ok = |x: f64| x.is_finite() && 0.0 < x && x < 1.0;
        if !(fib_ok(self.fib_equilibrium)
            && fib_ok(self.fib_extreme)
            && self.fib_equilibrium < self.fib_extreme)
        {
            return invalid(format!(
                "fib levels must satisfy 0 < equilibrium < extreme < 1, got {} / {}",
                self.fib_equilibrium, self.fib_extreme
            ));
        }
        if !(Const::MIN_TRENDLINE_POINTS..=Const::MAX_TRENDLINE_POINTS)
            .contains(&self.min_trendline_points)
        {
            return invalid(format!(
                "min_trendline_points must be within {}..={}, got {}",
                Const::MIN_TRENDLINE_POINTS,
                Const::MAX_TRENDLINE_POINTS,
                self.min_trendline_points
            ));
        }
        Ok(())
    }

    /// swing 窗口包含的 bar 数。
    pub fn window_len(&self) -> usize {
        self.strength.saturating_mul(2).saturating_add(1)
    }

    pub fn apply_patch(mut self, patch: EngineConfigPatch) -> Self {
        if let Some(v) = patch.strength {
            self.strength = v;
        }
        if let Some(v) = patch.equal_tolerance_ticks {
            self.equal_tolerance_ticks = v;
        }
        if let Some(v) = patch.break_threshold_ticks {
            self.break_threshold_ticks = v;
        }
        if let Some(v) = patch.trap_retest_bars {
            self.trap_retest_bars = v;
        }
        if let Some(v) = patch.lookback_horizon_bars {
            self.lookback_horizon_bars = v;
        }
        if let Some(v) = patch.max_resident_levels {
            self.max_resident_levels = v;
        }
        if let Some(v) = patch.sweep_buffer_ticks {
            self.sweep_buffer_ticks = v;
        }
        if let Some(v) = patch.pivot_boundary {
            self.pivot_boundary = v;
        }
        if let Some(v) = patch.order_block_lookback_bars {
            self.order_block_lookback_bars = v;
        }
        if let Some(v) = patch.fvg_min_gap_ticks {
            self.fvg_min_gap_ticks = v;
        }
        if let Some(v) = patch.fib_equilibrium {
            self.fib_equilibrium = v;
        }
        if let Some(v) = patch.fib_extreme {
            self.fib_extreme = v;
        }
        if let Some(v) = patch.min_trendline_points {
            self.min_trendline_points = v;
        }
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, EngineError> {
        let patch: EngineConfigPatch = serde_yaml::from_str(yaml)?;
        let config = Self::default().apply_patch(patch);
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }
}

impl EngineProfileConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, EngineError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn resolve_for(&self, symbol: &str, timeframe: Timeframe) -> Result<EngineConfig, EngineError> {
        let symbol_norm = normalize_key(symbol);
        let tf_norm = timeframe.as_str().to_string();
        let symbol_tf = format!("{symbol_norm}.{tf_norm}");
        let symbol_wild = format!("{symbol_norm}.*");
        let tf_wild = format!("*.{tf_norm}");

        let mut config = EngineConfig::default().apply_patch(self.default.clone());

        if let Some(patch) = find_patch(&self.timeframe, &tf_norm) {
            config = config.apply_patch(patch.clone());
        }
        if let Some(patch) = find_patch(&self.symbol, &symbol_norm) {
            config = config.apply_patch(patch.clone());
        }
        if let Some(patch) = find_patch(&self.symbol_timeframe, &tf_wild) {
            config = config.apply_patch(patch.clone());
        }
        if let Some(patch) = find_patch(&self.symbol_timeframe, &symbol_wild) {
            config = config.apply_patch(patch.clone());
        }
        if let Some(patch) = find_patch(&self.symbol_timeframe, &symbol_tf) {
            config = config.apply_patch(patch.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

fn normalize_key(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn find_patch<'a>(
    map: &'a HashMap<String, EngineConfigPatch>,
    key: &str,
) -> Option<&'a EngineConfigPatch> {
    let key_norm = normalize_key(key);
    map.iter()
        .find(|(k, _)| normalize_key(k) == key_norm)
        .map(|(_, v)| v)
}
