//! 订单生命周期服务
//!
//! 负责商城订单的创建、取消、发货与确认收货。
//!
//! ## 创建流程
//!
//! 1. 请求校验 -> 2. 逐行校验商品并预占库存 -> 3. 汇总原价
//!    -> 4. 组合优惠 -> 5. 写入订单与明细 -> 6. 核销优惠券 -> 7. 提交事务
//!
//! 全部步骤在同一事务、同一连接上执行，任一行失败时回滚，已预占的库存随之恢复。
//!
//! ## 终态事件
//!
//! 确认收货与订单状态变更同事务写入 ORDER_COMPLETED 事件，
//! 提交后立即尝试投递；投递失败由 Outbox Worker 重试，不影响本次操作结果。

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};

use commerce_shared::observability::metrics;

use super::discount_composer::DiscountComposer;
use super::dto::{
    CreateOrderFromCartRequest, CreateOrderRequest, DiscountPreviewDto, OrderDto, OrderItemRequest,
};
use super::inventory_ledger::InventoryLedger;
use super::serial::generate_order_no;
use crate::error::{CommerceError, Result};
use crate::hooks::HookDispatcher;
use crate::models::{
    AddressSnapshot, Money, NewOrder, NewOrderEvent, NewOrderItem, Order, OrderEventKind,
    OrderItem, OrderStatus, ResolvedLine, TransactionType,
};
use crate::repository::{CartRepository, EventRepository, OrderRepository};

/// 订单服务
pub struct OrderService {
    pool: PgPool,
    order_repo: OrderRepository,
    composer: Arc<DiscountComposer>,
    dispatcher: Arc<HookDispatcher>,
}

impl OrderService {
    pub fn new(pool: PgPool, composer: Arc<DiscountComposer>, dispatcher: Arc<HookDispatcher>) -> Self {
        Self {
            order_repo: OrderRepository::new(pool.clone()),
            pool,
            composer,
            dispatcher,
        }
    }

    /// 按商品列表直接下单
    #[instrument(skip(self, request), fields(user_id = %request.user_id, items = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderDto> {
        request.validate()?;

        let mut tx = self.pool.begin().await?;
        let (order, items) = self.create_order_in_tx(&mut tx, &request).await?;
        tx.commit().await?;

        metrics::record_order_created("direct", request.transaction_type.as_str());
        info!(
            order_no = %order.order_no,
            original = %order.original_amount,
            actual = %order.actual_amount,
            "订单创建成功"
        );

        Ok(OrderDto::from_order(&order, &items))
    }

    /// 购物车结算
    ///
    /// 只结算已选中的条目，成功后只删除这些条目
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_order_from_cart(
        &self,
        request: CreateOrderFromCartRequest,
    ) -> Result<OrderDto> {
        let mut tx = self.pool.begin().await?;

        let cart_items = CartRepository::list_selected_for_update(&mut tx, &request.user_id).await?;
        if cart_items.is_empty() {
            return Err(CommerceError::CartEmpty);
        }

        let order_request = CreateOrderRequest {
            user_id: request.user_id.clone(),
            items: cart_items
                .iter()
                .map(|c| OrderItemRequest {
                    product_id: c.product_id,
                    sku_id: c.sku_id,
                    quantity: c.quantity,
                })
                .collect(),
            address_id: request.address_id,
            user_coupon_id: request.user_coupon_id,
            transaction_type: TransactionType::Retail,
            remark: request.remark.clone(),
        };
        order_request.validate()?;

        let (order, items) = self.create_order_in_tx(&mut tx, &order_request).await?;

        let cart_ids: Vec<i64> = cart_items.iter().map(|c| c.id).collect();
        CartRepository::delete_items_in_tx(&mut tx, &request.user_id, &cart_ids).await?;

        tx.commit().await?;

        metrics::record_order_created("cart", TransactionType::Retail.as_str());
        info!(
            order_no = %order.order_no,
            cart_items = cart_ids.len(),
            actual = %order.actual_amount,
            "购物车结算成功"
        );

        Ok(OrderDto::from_order(&order, &items))
    }

    /// 取消订单
    ///
    /// 仅待支付订单可取消，归还全部库存并退回优惠券
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        user_id: &str,
        order_no: &str,
        reason: Option<&str>,
    ) -> Result<OrderDto> {
        let mut tx = self.pool.begin().await?;

        let order = lock_owned_order(&mut tx, user_id, order_no).await?;
        ensure_transition(&order, OrderStatus::Cancelled)?;

        let items = OrderRepository::list_items_in_tx(&mut tx, order.id).await?;
        for item in &items {
            InventoryLedger::release_in_tx(&mut tx, item.product_id, item.sku_id, item.quantity)
                .await?;
        }

        if let Some(user_coupon_id) = order.user_coupon_id {
            DiscountComposer::restore_coupon_in_tx(&mut tx, user_coupon_id, order.id).await?;
        }

        if !OrderRepository::mark_cancelled_in_tx(&mut tx, order.id, reason).await? {
            return Err(invalid_status(&order));
        }

        let order = reload(&mut tx, order.id).await?;
        tx.commit().await?;

        metrics::record_order_transition(OrderStatus::Cancelled.as_str());
        info!(order_no = %order_no, items = items.len(), "订单已取消，库存已归还");

        Ok(OrderDto::from_order(&order, &items))
    }

    /// 确认收货
    #[instrument(skip(self))]
    pub async fn confirm_receive(&self, user_id: &str, order_no: &str) -> Result<OrderDto> {
        let mut tx = self.pool.begin().await?;

        let order = lock_owned_order(&mut tx, user_id, order_no).await?;
        ensure_transition(&order, OrderStatus::Completed)?;

        if !OrderRepository::mark_completed_in_tx(&mut tx, order.id).await? {
            return Err(invalid_status(&order));
        }

        let order = reload(&mut tx, order.id).await?;
        let event = NewOrderEvent::for_order(&order, OrderEventKind::OrderCompleted, order.actual_amount);
        let event_id = EventRepository::create_in_tx(&mut tx, &event).await?;
        let items = OrderRepository::list_items_in_tx(&mut tx, order.id).await?;

        tx.commit().await?;

        metrics::record_order_transition(OrderStatus::Completed.as_str());
        info!(order_no = %order_no, "订单已确认收货");

        self.dispatch(event_id).await;

        Ok(OrderDto::from_order(&order, &items))
    }

    /// 发货（运营操作）
    #[instrument(skip(self))]
    pub async fn ship_order(&self, order_no: &str) -> Result<OrderDto> {
        let mut tx = self.pool.begin().await?;

        let order = lock_order(&mut tx, order_no).await?;
        ensure_transition(&order, OrderStatus::Shipped)?;

        if !OrderRepository::mark_shipped_in_tx(&mut tx, order.id).await? {
            return Err(invalid_status(&order));
        }

        let order = reload(&mut tx, order.id).await?;
        let items = OrderRepository::list_items_in_tx(&mut tx, order.id).await?;
        tx.commit().await?;

        metrics::record_order_transition(OrderStatus::Shipped.as_str());
        info!(order_no = %order_no, "订单已发货");

        Ok(OrderDto::from_order(&order, &items))
    }

    /// 开始备货：已支付 → 待发货
    #[instrument(skip(self))]
    pub async fn start_fulfillment(&self, order_no: &str) -> Result<OrderDto> {
        let mut tx = self.pool.begin().await?;

        let order = lock_order(&mut tx, order_no).await?;
        ensure_transition(&order, OrderStatus::PendingShip)?;

        if !OrderRepository::transition_in_tx(
            &mut tx,
            order.id,
            OrderStatus::Paid,
            OrderStatus::PendingShip,
        )
        .await?
        {
            return Err(invalid_status(&order));
        }

        let order = reload(&mut tx, order.id).await?;
        let items = OrderRepository::list_items_in_tx(&mut tx, order.id).await?;
        tx.commit().await?;

        metrics::record_order_transition(OrderStatus::PendingShip.as_str());

        Ok(OrderDto::from_order(&order, &items))
    }

    /// 下单前的价格预览（仅满减活动，不涉及优惠券）
    pub async fn preview_discount(
        &self,
        transaction_type: TransactionType,
        original_amount: Money,
    ) -> Result<DiscountPreviewDto> {
        let result = self.composer.preview(transaction_type, original_amount).await?;
        Ok(DiscountPreviewDto::from(&result))
    }

    /// 结算页报价：活动 + 用户选择的优惠券，不核销
    pub async fn quote_discount(
        &self,
        user_id: &str,
        transaction_type: TransactionType,
        original_amount: Money,
        user_coupon_id: Option<i64>,
    ) -> Result<DiscountPreviewDto> {
        let result = self
            .composer
            .compose(user_id, transaction_type, original_amount, user_coupon_id)
            .await?;
        Ok(DiscountPreviewDto::from(&result))
    }

    /// 查询订单详情
    pub async fn get_order(&self, user_id: &str, order_no: &str) -> Result<OrderDto> {
        let order = self
            .order_repo
            .get_by_no(order_no)
            .await?
            .filter(|o| o.is_owned_by(user_id))
            .ok_or_else(|| CommerceError::OrderNotFound(order_no.to_string()))?;

        let items = self.order_repo.list_items(order.id).await?;
        Ok(OrderDto::from_order(&order, &items))
    }

    /// 查询用户订单列表
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: &str,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<OrderDto>> {
        let orders = self.order_repo.list_by_user(user_id, status, limit).await?;
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for item in self.order_repo.list_items_by_orders(&order_ids).await? {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .iter()
            .map(|o| {
                let items = items_by_order.get(&o.id).map(Vec::as_slice).unwrap_or(&[]);
                OrderDto::from_order(o, items)
            })
            .collect())
    }

    // ==================== 私有方法 ====================

    /// 在调用方事务中创建订单
    async fn create_order_in_tx(
        &self,
        tx: &mut PgConnection,
        request: &CreateOrderRequest,
    ) -> Result<(Order, Vec<OrderItem>)> {
        // 按商品 id 顺序加锁扣减，避免并发下单互相等待
        let mut reserve_order: Vec<usize> = (0..request.items.len()).collect();
        reserve_order.sort_by_key(|&i| (request.items[i].product_id, request.items[i].sku_id));

        let mut lines: Vec<Option<ResolvedLine>> = vec![None; request.items.len()];
        for i in reserve_order {
            let item = &request.items[i];
            let line =
                InventoryLedger::reserve_in_tx(&mut *tx, item.product_id, item.sku_id, item.quantity)
                    .await?;
            lines[i] = Some(line);
        }

        let new_items: Vec<NewOrderItem> = request
            .items
            .iter()
            .zip(lines)
            .filter_map(|(item, line)| line.map(|line| build_item(line, item.quantity)))
            .collect();
        let original_amount: Money = new_items.iter().map(|i| i.subtotal).sum();

        let address_snapshot = match request.address_id {
            Some(address_id) => {
                let address = CartRepository::get_address_in_tx(&mut *tx, &request.user_id, address_id)
                    .await?
                    .ok_or_else(|| {
                        CommerceError::Validation(format!("收货地址不存在: {address_id}"))
                    })?;
                Some(serde_json::to_value(AddressSnapshot::from(&address))?)
            }
            None => None,
        };

        let discount = DiscountComposer::compose_in_tx(
            &mut *tx,
            &request.user_id,
            request.transaction_type,
            original_amount,
            request.user_coupon_id,
        )
        .await?;

        let new_order = NewOrder {
            order_no: generate_order_no(),
            user_id: request.user_id.clone(),
            transaction_type: request.transaction_type,
            original_amount,
            discount_amount: discount.total_discount,
            actual_amount: discount.final_amount,
            user_coupon_id: discount.user_coupon_id(),
            campaign_id: discount.campaign_id(),
            address_snapshot,
            remark: request.remark.clone(),
        };
        let order = OrderRepository::create_order_in_tx(&mut *tx, &new_order).await?;

        for item in &new_items {
            OrderRepository::create_item_in_tx(&mut *tx, order.id, item).await?;
        }

        if let Some(user_coupon_id) = discount.user_coupon_id() {
            DiscountComposer::redeem_coupon_in_tx(&mut *tx, user_coupon_id, &request.user_id, order.id)
                .await?;
        }

        let items = OrderRepository::list_items_in_tx(&mut *tx, order.id).await?;

        Ok((order, items))
    }

    /// 提交后投递事件，失败留给 Outbox Worker
    async fn dispatch(&self, event_id: i64) {
        if let Err(e) = self.dispatcher.deliver(event_id).await {
            warn!(event_id, error = %e, "订单事件即时投递失败，等待后台重试");
        }
    }
}

fn build_item(line: ResolvedLine, quantity: i32) -> NewOrderItem {
    NewOrderItem {
        product_id: line.product_id,
        sku_id: line.sku_id,
        product_name: line.product_name,
        product_image: line.product_image,
        sku_desc: line.sku_desc,
        price: line.unit_price,
        quantity,
        subtotal: line.unit_price.times(quantity),
    }
}

/// 锁定订单并校验归属（不属于该用户时按不存在处理）
async fn lock_owned_order(tx: &mut PgConnection, user_id: &str, order_no: &str) -> Result<Order> {
    lock_order(tx, order_no)
        .await
        .and_then(|o| {
            if o.is_owned_by(user_id) {
                Ok(o)
            } else {
                Err(CommerceError::OrderNotFound(order_no.to_string()))
            }
        })
}

async fn lock_order(tx: &mut PgConnection, order_no: &str) -> Result<Order> {
    OrderRepository::get_by_no_for_update(tx, order_no)
        .await?
        .ok_or_else(|| CommerceError::OrderNotFound(order_no.to_string()))
}

async fn reload(tx: &mut PgConnection, order_id: i64) -> Result<Order> {
    OrderRepository::get_by_id_for_update(tx, order_id)
        .await?
        .ok_or_else(|| CommerceError::Internal(format!("订单在事务中丢失: {order_id}")))
}

/// 用户与运营操作的状态检查；退款中的订单只能由退款流程迁出
fn ensure_transition(order: &Order, to: OrderStatus) -> Result<()> {
    if order.status != OrderStatus::Refunding && order.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(invalid_status(order))
    }
}

fn invalid_status(order: &Order) -> CommerceError {
    CommerceError::InvalidOrderStatus {
        order_no: order.order_no.clone(),
        current_status: order.status.as_str().to_string(),
    }
}
