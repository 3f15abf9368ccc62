use crate::constant::{Const, SwingKind};

pub(crate) fn approx_eq_f64(a: f64, b: f64) -> bool {
    (a - b).abs() <= Const::PRICE_EPSILON
}

pub(crate) fn gt_eps(a: f64, b: f64) -> bool {
    a - b > Const::PRICE_EPSILON
}

pub(crate) fn lt_eps(a: f64, b: f64) -> bool {
    b - a > Const::PRICE_EPSILON
}

pub(crate) fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance + Const::PRICE_EPSILON
}

/// `price` 沿 `kind` 方向越过 `reference` 超过 `buffer`（高点向上，低点向下）。
pub(crate) fn beyond(kind: SwingKind, price: f64, reference: f64, buffer: f64) -> bool {
    gt_eps(kind.sign() * (price - reference), buffer)
}
