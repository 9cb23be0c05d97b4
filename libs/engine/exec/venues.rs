//! Venue adapters for the execution seams
//!
//! Thin glue between the two-leg engine and the venue clients. Status
//! readouts always come from REST; the WebSocket/on-chain channels only
//! shorten the time to the confirming read.

use super::{classify_venue_error, ExecError, HedgeVenue, MakerVenue, OrderReadout, PlacedOrder};
use crate::domain::{MarketMapping, OrderStatus, Outcome, Side};
use async_trait::async_trait;
use books::{BookCache, NormalizedOrderBook, Venue};
use ethers::types::H256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

fn map_predict_err(err: predict::RestError) -> ExecError {
    match err {
        predict::RestError::ApiError(msg) => classify_venue_error(&msg),
        predict::RestError::AuthFailed(e) => ExecError::Fatal(format!("auth: {}", e)),
        predict::RestError::Http { status, body } if status < 500 && status != 429 => {
            classify_venue_error(&format!("HTTP {}: {}", status, body))
        }
        other => ExecError::Transient(other.to_string()),
    }
}

fn map_poly_err(err: polymarket::RestError) -> ExecError {
    match err {
        polymarket::RestError::ApiError(msg) => classify_venue_error(&msg),
        polymarket::RestError::AuthFailed(e) => ExecError::Fatal(format!("auth: {}", e)),
        polymarket::RestError::Http { status, body } if status < 500 && status != 429 => {
            classify_venue_error(&format!("HTTP {}: {}", status, body))
        }
        other => ExecError::Transient(other.to_string()),
    }
}

fn to_predict_side(side: Side) -> predict::Side {
    match side {
        Side::Buy => predict::Side::Buy,
        Side::Sell => predict::Side::Sell,
    }
}

fn to_poly_side(side: Side) -> polymarket::Side {
    match side {
        Side::Buy => polymarket::Side::Buy,
        Side::Sell => polymarket::Side::Sell,
    }
}

/// Predict maker leg backed by the REST client and the on-chain watcher
pub struct PredictMakerVenue {
    rest: Arc<predict::PredictRestClient>,
    watcher: Arc<predict::OrderFilledWatcher>,
    cache: Arc<BookCache>,
}

impl PredictMakerVenue {
    pub fn new(
        rest: Arc<predict::PredictRestClient>,
        watcher: Arc<predict::OrderFilledWatcher>,
        cache: Arc<BookCache>,
    ) -> Self {
        Self {
            rest,
            watcher,
            cache,
        }
    }
}

#[async_trait]
impl MakerVenue for PredictMakerVenue {
    async fn place_limit(
        &self,
        mapping: &MarketMapping,
        outcome: Outcome,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> super::Result<PlacedOrder> {
        let builder = predict::OrderBuilder::new(mapping.neg_risk, mapping.yield_bearing);
        let signed = builder
            .build_signed_order(
                self.rest.auth(),
                mapping.predict_token_for(outcome),
                price,
                quantity,
                to_predict_side(side),
                mapping.fee_rate_bps,
                0,
                0,
            )
            .map_err(|e| classify_venue_error(&e.to_string()))?;

        let order_hash = signed.order_hash.clone();
        let response = self
            .rest
            .submit_order(&signed)
            .await
            .map_err(map_predict_err)?;

        Ok(PlacedOrder {
            order_id: response.order_id.unwrap_or_else(|| order_hash.clone()),
            order_hash: Some(response.order_hash.unwrap_or(order_hash)),
        })
    }

    async fn cancel(&self, order: &PlacedOrder) -> super::Result<()> {
        self.rest
            .cancel_order(&order.order_id)
            .await
            .map_err(map_predict_err)
    }

    async fn status(&self, order: &PlacedOrder) -> super::Result<OrderReadout> {
        let status = self
            .rest
            .get_order(&order.order_id)
            .await
            .map_err(map_predict_err)?;

        Ok(OrderReadout {
            status: OrderStatus::parse(&status.status).unwrap_or(OrderStatus::Live),
            filled: status.filled_quantity,
        })
    }

    async fn wait_fill_hint(&self, order: &PlacedOrder, timeout: Duration) -> bool {
        let Some(hash) = order.order_hash.as_deref() else {
            tokio::time::sleep(timeout).await;
            return false;
        };
        let Ok(hash) = hash.parse::<H256>() else {
            warn!("[PredictVenue] Unparseable order hash {}", hash);
            tokio::time::sleep(timeout).await;
            return false;
        };

        let hinted = self.watcher.watch_order(hash, timeout).await.is_some();
        if hinted {
            debug!("[PredictVenue] OrderFilled hint for {}", order.order_id);
        }
        hinted
    }

    fn book(&self, mapping: &MarketMapping) -> Option<NormalizedOrderBook> {
        self.cache.get(Venue::Predict, &mapping.predict_market_id)
    }
}

/// Polymarket hedge leg backed by the CLOB REST client and the user channel
pub struct PolymarketHedgeVenue {
    rest: Arc<polymarket::ClobClient>,
    user_ws: Arc<polymarket::UserWs>,
    cache: Arc<BookCache>,
}

impl PolymarketHedgeVenue {
    pub fn new(
        rest: Arc<polymarket::ClobClient>,
        user_ws: Arc<polymarket::UserWs>,
        cache: Arc<BookCache>,
    ) -> Self {
        Self {
            rest,
            user_ws,
            cache,
        }
    }
}

#[async_trait]
impl HedgeVenue for PolymarketHedgeVenue {
    fn book(&self, token_id: &str) -> Option<NormalizedOrderBook> {
        self.cache.get(Venue::Polymarket, token_id)
    }

    async fn place_ioc(
        &self,
        mapping: &MarketMapping,
        token_id: &str,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> super::Result<PlacedOrder> {
        let builder = polymarket::OrderBuilder::new(mapping.neg_risk);
        let signed = builder
            .build_signed_order(
                self.rest.auth(),
                token_id,
                price,
                quantity,
                to_poly_side(side),
                polymarket::OrderType::FAK,
                0,
                0,
            )
            .map_err(|e| classify_venue_error(&e.to_string()))?;

        let order_hash = signed.order_hash.clone();
        let response = self
            .rest
            .place_order(&signed, polymarket::OrderType::FAK)
            .await
            .map_err(map_poly_err)?;

        Ok(PlacedOrder {
            order_id: response.order_id.unwrap_or_else(|| order_hash.clone()),
            order_hash: Some(order_hash),
        })
    }

    async fn settle(&self, order: &PlacedOrder, timeout: Duration) -> super::Result<OrderReadout> {
        // The user channel usually reports first; either way the REST
        // readout below decides {status, filled}.
        if let Some(final_state) = self
            .user_ws
            .wait_for_order_final(&order.order_id, timeout)
            .await
        {
            debug!(
                "[PolyVenue] User channel reported {} for {}",
                final_state.status, order.order_id
            );
        }

        match self.rest.get_order(&order.order_id).await {
            Ok(dto) => {
                let status = dto
                    .status
                    .as_deref()
                    .and_then(OrderStatus::parse)
                    .unwrap_or_else(|| {
                        if dto.size_matched_f64() + books::EPSILON >= dto.original_size_f64() {
                            OrderStatus::Filled
                        } else {
                            OrderStatus::Cancelled
                        }
                    });
                Ok(OrderReadout {
                    status,
                    filled: dto.size_matched_f64(),
                })
            }
            Err(polymarket::RestError::Http { status: 404, .. }) => {
                // An IOC that matched nothing may never become queryable
                Ok(OrderReadout {
                    status: OrderStatus::Cancelled,
                    filled: 0.0,
                })
            }
            Err(e) => Err(map_poly_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_error_mapping() {
        let err = map_predict_err(predict::RestError::ApiError(
            "insufficient balance".to_string(),
        ));
        assert!(matches!(err, ExecError::Fatal(_)));

        let err = map_predict_err(predict::RestError::KeyPoolExhausted);
        assert!(matches!(err, ExecError::Transient(_)));

        let err = map_predict_err(predict::RestError::Http {
            status: 503,
            body: "upstream".to_string(),
        });
        assert!(matches!(err, ExecError::Transient(_)));
    }

    #[test]
    fn test_poly_error_mapping() {
        let err = map_poly_err(polymarket::RestError::ApiError(
            "not enough allowance".to_string(),
        ));
        assert!(matches!(err, ExecError::Fatal(_)));

        let err = map_poly_err(polymarket::RestError::RateLimited("slow down".to_string()));
        assert!(matches!(err, ExecError::Transient(_)));
    }
}
