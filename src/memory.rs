use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use crate::error::StoreError;
use crate::models::{Book, CartItem, Order, User};
use crate::store::{CartStore, CatalogStore, OrderStore, StoreResult, UserStore};

#[derive(Default)]
struct Tables {
    books: Vec<Book>,
    users: Vec<User>,
    cart: Vec<CartItem>,
    orders: Vec<Order>,
    counters: HashMap<String, i64>,
}

/// In-process backend. Every port call takes the single lock, so each call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_books(books: Vec<Book>) -> Self {
        let store = Self::new();
        store.lock().books = books;
        store
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of persisted cart rows across all owners.
    #[cfg(test)]
    pub fn cart_rows(&self) -> usize {
        self.lock().cart.len()
    }
}

/// Parses a JSON array of book documents. Rows without a price get a random
/// one drawn from `price_range` (inclusive).
pub fn parse_seed(raw: &str, price_range: (u32, u32)) -> Result<Vec<Book>, StoreError> {
    let rows: Vec<Value> = serde_json::from_str(raw)
        .map_err(|e| StoreError::Backend(format!("invalid catalog seed: {e}")))?;
    let mut rng = rand::thread_rng();
    let mut books = Vec::with_capacity(rows.len());
    for mut row in rows {
        if let Value::Object(fields) = &mut row {
            if !fields.contains_key("price") {
                let price = rng.gen_range(price_range.0..=price_range.1);
                fields.insert("price".into(), Value::from(price));
            }
        }
        let book: Book = match serde_json::from_value(row) {
            Ok(book) => book,
            Err(e) => {
                log::warn!("skipping malformed catalog row: {}", e);
                continue;
            }
        };
        if book.title.trim().is_empty() {
            continue;
        }
        books.push(book);
    }
    Ok(books)
}

fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn cap(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(0)
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_by_isbn(&self, isbn: &str) -> StoreResult<Option<Book>> {
        Ok(self.lock().books.iter().find(|b| b.isbn == isbn).cloned())
    }

    async fn find_by_title(&self, title: &str) -> StoreResult<Option<Book>> {
        Ok(self.lock().books.iter().find(|b| b.title == title).cloned())
    }

    async fn search(&self, query: &str, limit: i64) -> StoreResult<Vec<Book>> {
        let needle = query.to_lowercase();
        Ok(self
            .lock()
            .books
            .iter()
            .filter(|b| contains_ignore_case(&b.title, &needle) || contains_ignore_case(&b.author, &needle))
            .take(cap(limit))
            .cloned()
            .collect())
    }

    async fn list(&self, limit: i64) -> StoreResult<Vec<Book>> {
        Ok(self.lock().books.iter().take(cap(limit)).cloned().collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.lock();
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate(format!("email {}", user.email)));
        }
        tables.users.push(user.clone());
        Ok(())
    }

    async fn next_sequence(&self, name: &str) -> StoreResult<i64> {
        let mut tables = self.lock();
        let seq = tables.counters.entry(name.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn insert(&self, item: &CartItem) -> StoreResult<()> {
        if item.owner.as_deref().map_or(true, str::is_empty) {
            return Err(StoreError::Backend("cart rows need an owner".into()));
        }
        self.lock().cart.push(item.clone());
        Ok(())
    }

    async fn insert_many(&self, items: &[CartItem]) -> StoreResult<()> {
        if items.iter().any(|i| i.owner.as_deref().map_or(true, str::is_empty)) {
            return Err(StoreError::Backend("cart rows need an owner".into()));
        }
        let mut tables = self.lock();
        for item in items {
            if !tables.cart.iter().any(|stored| stored.id == item.id) {
                tables.cart.push(item.clone());
            }
        }
        Ok(())
    }

    async fn list(&self, owner: &str) -> StoreResult<Vec<CartItem>> {
        Ok(self
            .lock()
            .cart
            .iter()
            .filter(|i| i.owner.as_deref() == Some(owner))
            .cloned()
            .collect())
    }

    async fn count(&self, owner: &str) -> StoreResult<u64> {
        let count = self
            .lock()
            .cart
            .iter()
            .filter(|i| i.owner.as_deref() == Some(owner))
            .count();
        Ok(count as u64)
    }

    async fn remove(&self, owner: &str, id: &str) -> StoreResult<bool> {
        let mut tables = self.lock();
        let position = tables
            .cart
            .iter()
            .position(|i| i.id == id && i.owner.as_deref() == Some(owner));
        Ok(match position {
            Some(index) => {
                tables.cart.remove(index);
                true
            }
            None => false,
        })
    }

    async fn clear(&self, owner: &str) -> StoreResult<u64> {
        let mut tables = self.lock();
        let before = tables.cart.len();
        tables.cart.retain(|i| i.owner.as_deref() != Some(owner));
        Ok((before - tables.cart.len()) as u64)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn commit(&self, order: &Order) -> StoreResult<()> {
        let mut tables = self.lock();
        tables.orders.push(order.clone());
        let owner = Some(order.owner.as_str());
        tables
            .cart
            .retain(|i| i.owner.as_deref() != owner || !order.items.iter().any(|o| o.id == i.id));
        Ok(())
    }

    async fn list(&self, owner: &str) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .lock()
            .orders
            .iter()
            .filter(|o| o.owner == owner)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}
