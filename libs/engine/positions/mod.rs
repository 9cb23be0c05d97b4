//! Position reconciliation and close-opportunity engine

pub mod matcher;
pub mod reconciler;

pub use matcher::{close_opportunities, match_positions, CloseOpportunity, MatchReport};
pub use reconciler::{
    spawn_reconciliation_task, LivePositionSource, PositionReconciler, PositionSource,
    PositionsSnapshot, RECONCILE_INTERVAL,
};
