//! Cross-crate scenario tests: the calculators, the HMAC reference
//! vector, the NO-side view and the durable-log invariants exercised
//! through the public APIs.

use arb_engine::arb::{maker_buy, predict_taker_fee, taker_buy, tt_close};
use arb_engine::domain::{Outcome, Task, TaskEventKind, TaskKind, TaskParams, TaskStrategy};
use arb_engine::sched::TaskLog;
use books::{round4, NormalizedOrderBook, PriceLevel, Venue};
use ethers::types::Address;
use polymarket::{ApiCredentials, PolymarketAuth};

#[test]
fn fee_scenario() {
    // fee(0.6, 200) = 0.02 x 0.4 x 0.9 = 0.0072
    assert_eq!(predict_taker_fee(0.6, 200), 0.0072);
}

#[test]
fn maker_buy_scenario() {
    // predict_yes_bid=0.45, poly_no_ask=0.52, depths 100 and 80
    let quote = maker_buy(0.45, 0.52, 80.0, f64::INFINITY);
    assert!(quote.valid);
    assert_eq!(quote.cost, 0.97);
    assert_eq!(quote.max_qty, 80.0);
    assert_eq!(quote.profit_per_share, 0.03);
}

#[test]
fn taker_buy_unprofitable_scenario() {
    // predict_yes_ask=0.46, poly_no_ask=0.55, bps=200 -> cost ~1.0183
    let quote = taker_buy(0.46, 100.0, 0.55, 100.0, 200, f64::INFINITY);
    assert!(!quote.valid);
    assert_eq!(quote.max_qty, 0.0);
}

#[test]
fn no_side_view_scenario() {
    // YES bids=[(0.6,10)], asks=[(0.65,5)]
    // NO view: asks=[(0.4,10)], bids=[(0.35,5)]
    let yes = NormalizedOrderBook::from_levels(
        Venue::Polymarket,
        "cond",
        "token",
        0,
        vec![PriceLevel::new(0.6, 10.0)],
        vec![PriceLevel::new(0.65, 5.0)],
    );
    let no = yes.inverted();
    assert_eq!(no.asks, vec![PriceLevel::new(0.4, 10.0)]);
    assert_eq!(no.bids, vec![PriceLevel::new(0.35, 5.0)]);
}

#[test]
fn tt_close_scenario() {
    // predict_bid=0.55 with fee 0.005, poly_bid=0.50, entry 0.97 -> 0.075
    let quote = tt_close(0.55, 123, 0.50, 100.0, 0.97, 50.0);
    assert_eq!(quote.est_profit_per_share, 0.075);
    assert!(quote.valid);

    // Insufficient Polymarket depth invalidates the close
    let thin = tt_close(0.55, 123, 0.50, 10.0, 0.97, 50.0);
    assert!(!thin.valid);
}

#[test]
fn hmac_reference_vector() {
    // secret = URL-safe base64 of bytes 0x00..0x1f
    let auth = PolymarketAuth::new(
        "0x1234567890123456789012345678901234567890123456789012345678901234",
        Address::zero(),
        ApiCredentials {
            key: "k".to_string(),
            secret: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
            passphrase: "p".to_string(),
        },
    )
    .unwrap();

    let signature = auth
        .sign_request(1_700_000_000, "GET", "/data/orders", "")
        .unwrap();
    assert_eq!(signature, "NTt0e8XQzUuVTici5whIU-0NfgRXijqf0FarNw-ik2Q=");

    // Deterministic
    let again = auth
        .sign_request(1_700_000_000, "GET", "/data/orders", "")
        .unwrap();
    assert_eq!(signature, again);
}

#[test]
fn tick_divides_prices_in_normalized_books() {
    let book = NormalizedOrderBook::from_levels(
        Venue::Predict,
        "m",
        "m",
        0,
        vec![PriceLevel::new(0.45, 10.0), PriceLevel::new(0.44, 5.0)],
        vec![PriceLevel::new(0.47, 10.0)],
    );

    let tick = 0.01;
    for level in book.bids.iter().chain(book.asks.iter()) {
        let steps = level.price / tick;
        assert!(
            (steps - steps.round()).abs() < 1e-9,
            "price {} not aligned to tick {}",
            level.price,
            tick
        );
    }
    assert!(book.bids.windows(2).all(|w| w[0].price >= w[1].price));
    assert!(book.asks.windows(2).all(|w| w[0].price <= w[1].price));
}

#[test]
fn durable_log_sequences_are_gap_free() {
    let dir = tempfile::TempDir::new().unwrap();
    let log = TaskLog::new(dir.path());

    let task = Task::new(
        TaskKind::Buy,
        TaskStrategy::Maker,
        "pm-1",
        "0xcond",
        Outcome::Yes,
        100.0,
        TaskParams {
            predict_price: Some(0.45),
            polymarket_max_ask: Some(0.55),
            min_profit_buffer: Some(0.01),
            ..Default::default()
        },
    );

    for kind in [
        TaskEventKind::TaskQueued,
        TaskEventKind::TaskStarted,
        TaskEventKind::OrderSubmitted,
        TaskEventKind::OrderFilled,
        TaskEventKind::HedgeAttempt,
        TaskEventKind::HedgeComplete,
        TaskEventKind::TaskComplete,
    ] {
        log.emit(&task.id, kind, "exec-t", 1, None, None, serde_json::json!({}))
            .unwrap();
    }

    let events = log.read_events(&task.id).unwrap();
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=7).collect::<Vec<_>>());

    // Replaying a persisted event is a no-op
    let replay = events[2].clone();
    assert!(!log.append_event(&replay).unwrap());
    assert_eq!(log.read_events(&task.id).unwrap().len(), 7);
}

#[test]
fn round4_boundary_behavior() {
    assert_eq!(round4(0.46 + 0.55 + 0.00828), 1.0183);
    assert_eq!(round4(1.0 - 0.97), 0.03);
}
