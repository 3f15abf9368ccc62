use chrono::{Duration, TimeZone, Utc};

use liquiscope::{
    Bar, EngineConfig, Polarity, StructureSignal, StructureState, ZoneDetector, ZoneOrigin,
    ZoneSignal,
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

fn detector() -> ZoneDetector {
    ZoneDetector::new(&EngineConfig::default()).expect("valid config")
}

fn bullish_break(bar_index: u64) -> StructureSignal {
    StructureSignal::Break {
        polarity: Polarity::Bullish,
        bar_index,
        level: 101.0,
        close_price: 102.0,
    }
}

#[test]
fn bullish_break_marks_last_down_candle_and_retest_fires_once() {
    let mut zones = detector();
    let state = StructureState::default();
    let _ = zones.on_bar(&bar(0, 100.0, 100.5, 99.5, 100.25), &[], &state);
    let _ = zones.on_bar(&bar(1, 100.25, 100.5, 99.25, 99.5), &[], &state);
    let _ = zones.on_bar(&bar(2, 99.5, 100.75, 99.5, 100.5), &[], &state);

    let signals = zones.on_bar(&bar(3, 100.5, 102.25, 100.5, 102.0), &[bullish_break(3)], &state);
    let zone = signals
        .iter()
        .find_map(|x| match x {
            ZoneSignal::OrderBlock(zone) => Some(zone.clone()),
            _ => None,
        })
        .expect("order block");
    assert_eq!(zone.polarity, Polarity::Bullish);
    assert_eq!(zone.source_bar_index, 1);
    assert_eq!((zone.lower, zone.upper), (99.25, 100.5));
    assert!(zone.contains(zone.mid()));

    // 离开区间的 bar 不算回踩
    assert!(zones.on_bar(&bar(4, 102.0, 103.0, 100.75, 102.5), &[], &state).is_empty());

    let signals = zones.on_bar(&bar(5, 102.5, 102.5, 100.25, 100.75), &[], &state);
    assert!(matches!(
        signals.as_slice(),
        [ZoneSignal::OrderBlockRetest { polarity: Polarity::Bullish, zone_id, bar_index: 5, entry_price }]
            if *zone_id == zone.id && (*entry_price - 101.375).abs() < 1e-9
    ));
    let stored = zones
        .latest(ZoneOrigin::OrderBlock, Polarity::Bullish)
        .expect("stored");
    assert_eq!(stored.retested_at_bar_index, Some(5));

    assert!(zones.on_bar(&bar(6, 100.75, 101.0, 100.0, 100.5), &[], &state).is_empty());
}

#[test]
fn higher_highs_and_lows_give_discount_zone_once() {
    let mut zones = detector();
    let state = StructureState {
        last_swing_high: Some(110.0),
        previous_swing_high: Some(108.0),
        last_swing_low: Some(100.0),
        previous_swing_low: Some(98.0),
        ..StructureState::default()
    };

    let signals = zones.on_bar(&bar(0, 104.0, 104.5, 103.5, 104.25), &[], &state);
    assert!(matches!(
        signals.as_slice(),
        [ZoneSignal::PremiumDiscount { zone, swing_high, swing_low }]
            if zone.polarity == Polarity::Bullish
                && *swing_high == 110.0
                && *swing_low == 100.0
                && (zone.upper - 105.0).abs() < 1e-9
                && (zone.lower - 102.14).abs() < 1e-9
    ));

    assert!(zones.on_bar(&bar(1, 104.25, 104.5, 104.0, 104.25), &[], &state).is_empty());

    let mixed = StructureState {
        last_swing_low: Some(97.0),
        ..state.clone()
    };
    assert!(zones.on_bar(&bar(2, 104.25, 104.5, 104.0, 104.25), &[], &mixed).is_empty());
    let kept = zones.premium_discount_zone().expect("zone kept");
    assert_eq!(kept.polarity, Polarity::Bullish);
}

#[test]
fn bearish_gap_spans_first_low_to_third_high() {
    let mut zones = detector();
    let state = StructureState::default();
    let _ = zones.on_bar(&bar(0, 105.0, 105.5, 104.0, 104.25), &[], &state);
    let _ = zones.on_bar(&bar(1, 104.25, 104.25, 102.0, 102.25), &[], &state);
    let signals = zones.on_bar(&bar(2, 102.25, 103.0, 101.5, 101.75), &[], &state);

    assert!(matches!(
        signals.as_slice(),
        [ZoneSignal::FairValueGap(zone)]
            if zone.polarity == Polarity::Bearish
                && zone.upper == 104.0
                && zone.lower == 103.0
                && zone.source_bar_index == 1
    ));
    assert_eq!(zones.len(), 1);
    assert_eq!(zones.dataframe().expect("zones frame").height(), 1);
}
