//! 积分 Hook
//!
//! 订单完成时按实付金额赠送积分，退款成功时按退款金额扣回

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgConnection;

use super::handler::OrderEventHandler;
use super::loyalty::LoyaltyLedger;
use crate::error::Result;
use crate::models::{OrderEvent, OrderEventKind};

/// 积分处理器
pub struct PointsHook {
    ledger: Arc<dyn LoyaltyLedger>,
}

impl PointsHook {
    pub fn new(ledger: Arc<dyn LoyaltyLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl OrderEventHandler for PointsHook {
    fn name(&self) -> &'static str {
        "loyalty_points"
    }

    fn handles(&self, kind: OrderEventKind) -> bool {
        matches!(
            kind,
            OrderEventKind::OrderCompleted | OrderEventKind::OrderRefunded
        )
    }

    async fn handle(&self, conn: &mut PgConnection, event: &OrderEvent) -> Result<()> {
        match event.kind {
            OrderEventKind::OrderCompleted => {
                self.ledger
                    .credit_for_purchase(conn, &event.user_id, event.amount, &event.order_no)
                    .await?;
            }
            OrderEventKind::OrderRefunded => {
                self.ledger
                    .debit_for_refund(conn, &event.user_id, event.amount, &event.order_no)
                    .await?;
            }
        }
        Ok(())
    }
}
