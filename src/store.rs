//! Persistence ports.
//!
//! Services only see these traits; `db` implements them over MongoDB and
//! `memory` keeps everything in process.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Book, CartItem, Order, User};

pub type StoreResult<T> = Result<T, StoreError>;

/// Hard cap on any catalog listing.
pub const CATALOG_PAGE_LIMIT: i64 = 50;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_isbn(&self, isbn: &str) -> StoreResult<Option<Book>>;

    async fn find_by_title(&self, title: &str) -> StoreResult<Option<Book>>;

    /// Books whose title or author contains `query`, ignoring case.
    async fn search(&self, query: &str, limit: i64) -> StoreResult<Vec<Book>>;

    async fn list(&self, limit: i64) -> StoreResult<Vec<Book>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Fails with [`StoreError::Duplicate`] when the email is taken.
    async fn insert(&self, user: &User) -> StoreResult<()>;

    /// Atomically bumps the named counter and returns the new value.
    async fn next_sequence(&self, name: &str) -> StoreResult<i64>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn insert(&self, item: &CartItem) -> StoreResult<()>;

    /// Stores every row in one call. Rows whose id is already stored are
    /// skipped, so repeating a batch adds nothing.
    async fn insert_many(&self, items: &[CartItem]) -> StoreResult<()>;

    async fn list(&self, owner: &str) -> StoreResult<Vec<CartItem>>;

    async fn count(&self, owner: &str) -> StoreResult<u64>;

    /// Deletes one item, only if it belongs to `owner`.
    async fn remove(&self, owner: &str, id: &str) -> StoreResult<bool>;

    async fn clear(&self, owner: &str) -> StoreResult<u64>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Records `order` and deletes the cart rows it was built from as one
    /// unit. Rows added to the cart after the snapshot stay.
    async fn commit(&self, order: &Order) -> StoreResult<()>;

    async fn list(&self, owner: &str) -> StoreResult<Vec<Order>>;
}

/// Handles to every port, shared by the services.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub users: Arc<dyn UserStore>,
    pub cart: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    /// Uses one backend value for all four ports.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: CatalogStore + UserStore + CartStore + OrderStore + 'static,
    {
        Stores {
            catalog: backend.clone(),
            users: backend.clone(),
            cart: backend.clone(),
            orders: backend,
        }
    }
}
