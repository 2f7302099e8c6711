//! Cart management for both session kinds.
//!
//! Logged-in users keep their items in the shared cart store, owned by their
//! email. Guests keep them inside their own session context, which the caller
//! writes back after any change.

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::{AppError, AppResult};
use crate::models::CartItem;
use crate::session::SessionContext;
use crate::store::CartStore;

/// Most items a guest cart may hold. The whole cart rides in the session
/// cookie, which browsers drop past 4 KB.
pub const GUEST_CART_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub total: f64,
    pub count: usize,
}

#[derive(Clone)]
pub struct CartManager {
    catalog: Catalog,
    cart: Arc<dyn CartStore>,
}

impl CartManager {
    pub fn new(catalog: Catalog, cart: Arc<dyn CartStore>) -> Self {
        CartManager { catalog, cart }
    }

    /// Snapshots the book titled `title` into the session's cart.
    pub async fn add_item(&self, context: &mut SessionContext, title: &str) -> AppResult<CartItem> {
        let book = self
            .catalog
            .find_by_title(title)
            .await?
            .ok_or(AppError::BookNotFound)?;

        match &context.user {
            Some(user) => {
                let item = CartItem::snapshot(&book, Some(user.email.clone()));
                self.cart.insert(&item).await?;
                Ok(item)
            }
            None => {
                if context.guest_cart.len() >= GUEST_CART_LIMIT {
                    return Err(AppError::InvalidInput(format!(
                        "Guest carts hold at most {GUEST_CART_LIMIT} items, please login to add more"
                    )));
                }
                let item = CartItem::snapshot(&book, None);
                context.guest_cart.push(item.clone());
                Ok(item)
            }
        }
    }

    /// Removes one item. Guests may also name the item by ISBN; only the
    /// first match goes.
    pub async fn remove_item(&self, context: &mut SessionContext, item_ref: &str) -> AppResult<()> {
        match &context.user {
            Some(user) => {
                if self.cart.remove(&user.email, item_ref).await? {
                    Ok(())
                } else {
                    Err(AppError::ItemNotFound)
                }
            }
            None => {
                let position = context
                    .guest_cart
                    .iter()
                    .position(|item| item.id == item_ref)
                    .or_else(|| context.guest_cart.iter().position(|item| item.isbn == item_ref))
                    .ok_or(AppError::ItemNotFound)?;
                context.guest_cart.remove(position);
                Ok(())
            }
        }
    }

    pub async fn count(&self, context: &SessionContext) -> AppResult<u64> {
        match &context.user {
            Some(user) => Ok(self.cart.count(&user.email).await?),
            None => Ok(context.guest_cart.len() as u64),
        }
    }

    pub async fn clear(&self, context: &mut SessionContext) -> AppResult<()> {
        match &context.user {
            Some(user) => {
                let removed = self.cart.clear(&user.email).await?;
                log::debug!("cleared {} cart items for {}", removed, user.email);
            }
            None => context.guest_cart.clear(),
        }
        Ok(())
    }

    pub async fn items(&self, context: &SessionContext) -> AppResult<CartView> {
        let items = match &context.user {
            Some(user) => self.cart.list(&user.email).await?,
            None => context.guest_cart.clone(),
        };
        let total = items.iter().map(|item| item.price).sum();
        Ok(CartView { count: items.len(), total, items })
    }

    /// Moves a guest cart into the logged-in user's stored cart.
    ///
    /// Items keep their ids, so adopting the same guest cart again after a
    /// failed login stores nothing twice. The context keeps its guest cart
    /// until the store accepts the batch. Returns how many items were carried over.
    pub async fn adopt_guest_cart(&self, context: &mut SessionContext) -> AppResult<usize> {
        let owner = match &context.user {
            Some(user) => user.email.clone(),
            None => return Ok(0),
        };

        let items: Vec<CartItem> = context
            .guest_cart
            .iter()
            .cloned()
            .map(|mut item| {
                item.owner = Some(owner.clone());
                item
            })
            .collect();
        self.cart.insert_many(&items).await?;
        context.guest_cart.clear();

        let adopted = items.len();
        if adopted > 0 {
            log::info!("moved {} guest cart items to {}", adopted, owner);
        }
        Ok(adopted)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{Book, SessionIdentity};

    pub(crate) fn book(isbn: &str, title: &str, price: f64) -> Book {
        Book {
            isbn: isbn.into(),
            title: title.into(),
            author: "Author".into(),
            year: Some("1999".into()),
            publisher: None,
            image_url_small: String::new(),
            image_url_medium: format!("http://img/{isbn}.jpg"),
            image_url_large: String::new(),
            price,
        }
    }

    pub(crate) fn member(email: &str) -> SessionContext {
        SessionContext::authenticated(SessionIdentity {
            user_id: 1,
            username: "reader".into(),
            email: email.into(),
        })
    }

    fn manager() -> (CartManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_books(vec![
            book("0001", "T", 500.0),
            book("0002", "U", 300.0),
        ]));
        let catalog = Catalog::new(store.clone());
        (CartManager::new(catalog, store.clone()), store)
    }

    #[actix_web::test]
    async fn add_then_count_for_member() {
        let (cart, _) = manager();
        let mut context = member("a@x.io");

        let item = cart.add_item(&mut context, "T").await.unwrap();
        assert_eq!(item.isbn, "0001");
        assert_eq!(item.price, 500.0);
        assert_eq!(item.owner.as_deref(), Some("a@x.io"));
        assert_eq!(cart.count(&context).await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn unknown_title_is_book_not_found() {
        let (cart, _) = manager();
        let mut context = member("a@x.io");
        let err = cart.add_item(&mut context, "Missing").await.unwrap_err();
        assert!(matches!(err, AppError::BookNotFound));
    }

    #[actix_web::test]
    async fn clear_is_idempotent() {
        let (cart, _) = manager();
        let mut context = member("a@x.io");
        cart.add_item(&mut context, "T").await.unwrap();
        cart.add_item(&mut context, "U").await.unwrap();

        cart.clear(&mut context).await.unwrap();
        assert_eq!(cart.count(&context).await.unwrap(), 0);
        cart.clear(&mut context).await.unwrap();
        assert_eq!(cart.count(&context).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn guest_cart_lives_only_in_the_session() {
        let (cart, store) = manager();
        let mut guest = SessionContext::default();

        cart.add_item(&mut guest, "T").await.unwrap();
        cart.add_item(&mut guest, "U").await.unwrap();
        assert_eq!(cart.count(&guest).await.unwrap(), 2);
        assert!(guest.guest_cart.iter().all(|item| item.owner.is_none()));

        cart.remove_item(&mut guest, "0002").await.unwrap();
        cart.clear(&mut guest).await.unwrap();
        assert_eq!(store.cart_rows(), 0);
    }

    #[actix_web::test]
    async fn guest_duplicates_are_removed_one_at_a_time() {
        let (cart, _) = manager();
        let mut guest = SessionContext::default();
        let first = cart.add_item(&mut guest, "T").await.unwrap();
        let second = cart.add_item(&mut guest, "T").await.unwrap();

        cart.remove_item(&mut guest, &second.id).await.unwrap();
        assert_eq!(guest.guest_cart.len(), 1);
        assert_eq!(guest.guest_cart[0].id, first.id);

        cart.remove_item(&mut guest, "0001").await.unwrap();
        assert!(guest.guest_cart.is_empty());
        assert!(matches!(
            cart.remove_item(&mut guest, "0001").await,
            Err(AppError::ItemNotFound)
        ));
    }

    #[actix_web::test]
    async fn members_cannot_remove_each_others_items() {
        let (cart, _) = manager();
        let mut alice = member("alice@x.io");
        let mut bob = member("bob@x.io");
        let item = cart.add_item(&mut alice, "T").await.unwrap();

        let err = cart.remove_item(&mut bob, &item.id).await.unwrap_err();
        assert!(matches!(err, AppError::ItemNotFound));
        assert_eq!(cart.count(&alice).await.unwrap(), 1);

        cart.remove_item(&mut alice, &item.id).await.unwrap();
        assert_eq!(cart.count(&alice).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn login_adopts_the_guest_cart() {
        let (cart, store) = manager();
        let mut context = SessionContext::default();
        cart.add_item(&mut context, "T").await.unwrap();
        cart.add_item(&mut context, "U").await.unwrap();

        context.user = member("a@x.io").user;
        assert_eq!(cart.adopt_guest_cart(&mut context).await.unwrap(), 2);
        assert!(context.guest_cart.is_empty());
        assert_eq!(store.cart_rows(), 2);

        let view = cart.items(&context).await.unwrap();
        assert_eq!(view.count, 2);
        assert_eq!(view.total, 800.0);
    }

    #[actix_web::test]
    async fn guest_cart_is_capped() {
        let (cart, _) = manager();
        let mut guest = SessionContext::default();
        for _ in 0..GUEST_CART_LIMIT {
            cart.add_item(&mut guest, "T").await.unwrap();
        }

        let err = cart.add_item(&mut guest, "U").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(guest.guest_cart.len(), GUEST_CART_LIMIT);

        cart.remove_item(&mut guest, "0001").await.unwrap();
        cart.add_item(&mut guest, "U").await.unwrap();
        assert_eq!(cart.count(&guest).await.unwrap(), GUEST_CART_LIMIT as u64);
    }

    #[actix_web::test]
    async fn members_are_not_capped() {
        let (cart, _) = manager();
        let mut context = member("a@x.io");
        for _ in 0..=GUEST_CART_LIMIT {
            cart.add_item(&mut context, "T").await.unwrap();
        }
        assert_eq!(cart.count(&context).await.unwrap(), GUEST_CART_LIMIT as u64 + 1);
    }

    #[actix_web::test]
    async fn adopting_the_same_guest_cart_twice_stores_it_once() {
        let (cart, store) = manager();
        let mut guest = SessionContext::default();
        cart.add_item(&mut guest, "T").await.unwrap();
        cart.add_item(&mut guest, "U").await.unwrap();

        let mut first = SessionContext { user: member("a@x.io").user, ..guest.clone() };
        let mut retry = SessionContext { user: member("a@x.io").user, ..guest };
        cart.adopt_guest_cart(&mut first).await.unwrap();
        cart.adopt_guest_cart(&mut retry).await.unwrap();

        assert_eq!(store.cart_rows(), 2);
        assert_eq!(cart.count(&first).await.unwrap(), 2);
    }

    #[actix_web::test]
    async fn anonymous_count_is_zero() {
        let (cart, _) = manager();
        assert_eq!(cart.count(&SessionContext::default()).await.unwrap(), 0);
    }
}
