//! Depth and arbitrage calculators
//!
//! All price arithmetic rounds through 4-decimal fixed point and compares
//! against `EPSILON`. Maker-side cost of exactly 1 is feasible (the rebate
//! covers it); taker cost must be strictly below 1.

use crate::domain::Outcome;
use books::{round4, NormalizedOrderBook, EPSILON};

/// Taker fee rebate on Predict: 10% of the fee is returned
const FEE_REBATE: f64 = 0.10;

/// Taker fee per share on Predict:
/// `(bps / 10000) x min(price, 1 - price) x (1 - rebate)`.
/// The maker side pays no fee.
pub fn predict_taker_fee(price: f64, fee_rate_bps: u64) -> f64 {
    round4((fee_rate_bps as f64 / 10_000.0) * price.min(1.0 - price) * (1.0 - FEE_REBATE))
}

/// Two-leg BUY quote: one leg on Predict, the hedge on the Polymarket ask
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyQuote {
    /// Combined per-share cost of both legs (fees included for taker)
    pub cost: f64,
    /// Profit per share locked at settlement, `1 - cost`
    pub profit_per_share: f64,
    /// Executable quantity across both books
    pub max_qty: f64,
    pub valid: bool,
}

/// BUY with a resting maker order on Predict at the bid.
///
/// Feasible up to cost = 1 + epsilon: the maker leg pays no fee and earns
/// the rebate, so a flat two-leg cost still clears.
pub fn maker_buy(
    predict_bid: f64,
    poly_ask: f64,
    poly_ask_depth: f64,
    max_position: f64,
) -> BuyQuote {
    let cost = round4(predict_bid + poly_ask);
    let valid = cost <= 1.0 + EPSILON;
    let max_qty = if valid {
        poly_ask_depth.min(max_position)
    } else {
        0.0
    };

    BuyQuote {
        cost,
        profit_per_share: round4(1.0 - cost),
        max_qty,
        valid,
    }
}

/// BUY taking the Predict ask and the Polymarket ask simultaneously.
///
/// Requires cost strictly below 1 - epsilon after the taker fee.
pub fn taker_buy(
    predict_ask: f64,
    predict_ask_depth: f64,
    poly_ask: f64,
    poly_ask_depth: f64,
    fee_rate_bps: u64,
    max_position: f64,
) -> BuyQuote {
    let fee = predict_taker_fee(predict_ask, fee_rate_bps);
    let cost = round4(predict_ask + poly_ask + fee);
    let valid = cost < 1.0 - EPSILON;
    let max_qty = if valid {
        predict_ask_depth.min(poly_ask_depth).min(max_position)
    } else {
        0.0
    };

    BuyQuote {
        cost,
        profit_per_share: round4(1.0 - cost),
        max_qty,
        valid,
    }
}

/// Both BUY quotes for one arbitrage side, read off the cached books.
///
/// `arb_side` selects the Predict outcome; the Predict book is the YES
/// book, so the NO side reads the inverted view. The hedge leg always
/// consumes the Polymarket ask of the hedge token's book.
pub fn buy_opportunity(
    predict_yes_book: &NormalizedOrderBook,
    poly_hedge_book: &NormalizedOrderBook,
    arb_side: Outcome,
    fee_rate_bps: u64,
    max_position: f64,
) -> (BuyQuote, BuyQuote) {
    let predict_view = match arb_side {
        Outcome::Yes => predict_yes_book.clone(),
        Outcome::No => predict_yes_book.inverted(),
    };

    let poly_ask = poly_hedge_book.best_ask();
    let predict_bid = predict_view.best_bid();
    let predict_ask = predict_view.best_ask();

    let (Some(poly_ask), Some(predict_bid)) = (poly_ask, predict_bid) else {
        return (BuyQuote::default(), BuyQuote::default());
    };

    let maker = maker_buy(predict_bid.price, poly_ask.price, poly_ask.size, max_position);

    let taker = match predict_ask {
        Some(predict_ask) => taker_buy(
            predict_ask.price,
            predict_ask.size,
            poly_ask.price,
            poly_ask.size,
            fee_rate_bps,
            max_position,
        ),
        None => BuyQuote::default(),
    };

    (maker, taker)
}

/// Close quote for a matched pair
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseQuote {
    pub est_profit_per_share: f64,
    /// Lowest Polymarket bid at which the close still breaks even
    pub min_poly_bid: f64,
    pub valid: bool,
}

/// Taker-Taker close: hit the Predict bid (paying the taker fee) and the
/// Polymarket bid at once. Valid when profitable and the Polymarket bid
/// depth covers the quantity.
pub fn tt_close(
    predict_bid: f64,
    fee_rate_bps: u64,
    poly_bid: f64,
    poly_bid_depth: f64,
    entry_cost_per_share: f64,
    quantity: f64,
) -> CloseQuote {
    let fee = predict_taker_fee(predict_bid, fee_rate_bps);
    let est_profit_per_share = round4((predict_bid - fee) + poly_bid - entry_cost_per_share);
    let min_poly_bid = round4(entry_cost_per_share - (predict_bid - fee));
    let valid = est_profit_per_share > EPSILON && poly_bid_depth + EPSILON >= quantity;

    CloseQuote {
        est_profit_per_share,
        min_poly_bid,
        valid,
    }
}

/// Maker-Taker close: rest an ask on Predict at `predict_ask` (fee-free)
/// and hit the Polymarket bid once it fills.
pub fn mt_close(
    predict_ask: f64,
    poly_bid: f64,
    poly_bid_depth: f64,
    entry_cost_per_share: f64,
    quantity: f64,
) -> CloseQuote {
    let est_profit_per_share = round4(predict_ask + poly_bid - entry_cost_per_share);
    let min_poly_bid = round4(entry_cost_per_share - predict_ask);
    let valid = est_profit_per_share > EPSILON && poly_bid_depth + EPSILON >= quantity;

    CloseQuote {
        est_profit_per_share,
        min_poly_bid,
        valid,
    }
}
