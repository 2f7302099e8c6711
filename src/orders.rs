use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::Order;
use crate::session::SessionContext;
use crate::store::{CartStore, OrderStore};

/// Turns a member's cart into an order.
#[derive(Clone)]
pub struct OrderService {
    cart: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
}

impl OrderService {
    pub fn new(cart: Arc<dyn CartStore>, orders: Arc<dyn OrderStore>) -> Self {
        OrderService { cart, orders }
    }

    /// Guests must log in first; their session cart is never checked out.
    pub async fn place_order(&self, context: &SessionContext) -> AppResult<Order> {
        let user = context.require_identity()?;

        let items = self.cart.list(&user.email).await?;
        if items.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let order = Order::from_items(&user.email, items);
        self.orders.commit(&order).await?;
        log::info!(
            "order {} placed by {}: {} items, total {}",
            order.id,
            order.owner,
            order.items.len(),
            order.total_amount
        );
        Ok(order)
    }

    pub async fn orders(&self, context: &SessionContext) -> AppResult<Vec<Order>> {
        let user = context.require_identity()?;
        Ok(self.orders.list(&user.email).await?)
    }
}
