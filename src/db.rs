use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, InsertManyOptions,
    ReturnDocument,
};
use mongodb::{Client, Collection, Database, IndexModel};

use crate::error::StoreError;
use crate::models::{Book, CartItem, Counter, Order, User};
use crate::store::{CartStore, CatalogStore, OrderStore, StoreResult, UserStore};

/// MongoDB-backed implementation of every store port.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    books: Collection<Book>,
    users: Collection<User>,
    cart: Collection<CartItem>,
    orders: Collection<Order>,
    counters: Collection<Counter>,
    transactions: bool,
}

pub async fn connect(database_url: &str, database_name: &str) -> Result<(Client, Database), StoreError> {
    let client_options = ClientOptions::parse(database_url).await?;
    let client = Client::with_options(client_options)?;
    let database = client.database(database_name);
    Ok((client, database))
}

impl MongoStore {
    /// `transactions` selects a multi-document transaction for checkout; it
    /// needs a replica set, so standalone servers run with it off.
    pub async fn open(database_url: &str, database_name: &str, transactions: bool) -> Result<Self, StoreError> {
        let (client, db) = connect(database_url, database_name).await?;
        let store = MongoStore {
            books: db.collection("books"),
            users: db.collection("users"),
            cart: db.collection("cart"),
            orders: db.collection("orders"),
            counters: db.collection("counters"),
            client,
            transactions,
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique_email = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users.create_index(unique_email, None).await?;

        let by_owner = IndexModel::builder().keys(doc! { "owner": 1 }).build();
        self.cart.create_index(by_owner.clone(), None).await?;
        self.orders.create_index(by_owner, None).await?;

        let by_isbn = IndexModel::builder().keys(doc! { "isbn": 1 }).build();
        self.books.create_index(by_isbn, None).await?;
        Ok(())
    }

    async fn commit_in_transaction(&self, order: &Order) -> Result<(), StoreError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let result = async {
            self.orders.insert_one_with_session(order, None, &mut session).await?;
            self.cart.delete_many_with_session(ordered_rows(order), None, &mut session).await?;
            Ok::<(), mongodb::error::Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                session.commit_transaction().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    log::error!("failed to abort checkout transaction: {}", abort);
                }
                Err(e.into())
            }
        }
    }

    async fn commit_with_compensation(&self, order: &Order) -> Result<(), StoreError> {
        self.orders.insert_one(order, None).await?;
        if let Err(e) = self.cart.delete_many(ordered_rows(order), None).await {
            log::warn!("clearing cart for order {} failed, rolling the order back", order.id);
            if let Err(undo) = self.orders.delete_one(doc! { "_id": order.id.as_str() }, None).await {
                log::error!("order {} could not be rolled back: {}", order.id, undo);
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// Cart rows captured by `order`. Rows added after the snapshot stay in the cart.
fn ordered_rows(order: &Order) -> Document {
    let ids: Vec<&str> = order.items.iter().map(|i| i.id.as_str()).collect();
    doc! { "owner": order.owner.as_str(), "_id": { "$in": ids } }
}

/// Escapes regex metacharacters so user input is matched literally.
pub fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\.^$|?*+()[]{}-/".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn search_filter(query: &str) -> Document {
    let pattern = escape_regex(query);
    doc! {
        "$or": [
            { "title": { "$regex": pattern.as_str(), "$options": "i" } },
            { "author": { "$regex": pattern.as_str(), "$options": "i" } },
        ]
    }
}

#[async_trait]
impl CatalogStore for MongoStore {
    async fn find_by_isbn(&self, isbn: &str) -> StoreResult<Option<Book>> {
        Ok(self.books.find_one(doc! { "isbn": isbn }, None).await?)
    }

    async fn find_by_title(&self, title: &str) -> StoreResult<Option<Book>> {
        Ok(self.books.find_one(doc! { "title": title }, None).await?)
    }

    async fn search(&self, query: &str, limit: i64) -> StoreResult<Vec<Book>> {
        let options = FindOptions::builder().limit(limit).build();
        let cursor = self.books.find(search_filter(query), options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list(&self, limit: i64) -> StoreResult<Vec<Book>> {
        let options = FindOptions::builder().limit(limit).build();
        let cursor = self.books.find(None, options).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users.find_one(doc! { "email": email }, None).await?)
    }

    async fn insert(&self, user: &User) -> StoreResult<()> {
        self.users.insert_one(user, None).await?;
        Ok(())
    }

    async fn next_sequence(&self, name: &str) -> StoreResult<i64> {
        let filter = doc! { "_id": name };
        let update = doc! { "$inc": { "seq": 1_i64 } };

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        match self.counters.find_one_and_update(filter, update, options).await? {
            Some(counter) => Ok(counter.seq),
            None => Err(StoreError::Backend(format!("failed to generate `{name}` sequence value"))),
        }
    }
}

#[async_trait]
impl CartStore for MongoStore {
    async fn insert(&self, item: &CartItem) -> StoreResult<()> {
        if item.owner.as_deref().map_or(true, str::is_empty) {
            return Err(StoreError::Backend("cart rows need an owner".into()));
        }
        self.cart.insert_one(item, None).await?;
        Ok(())
    }

    async fn insert_many(&self, items: &[CartItem]) -> StoreResult<()> {
        if items.iter().any(|i| i.owner.as_deref().map_or(true, str::is_empty)) {
            return Err(StoreError::Backend("cart rows need an owner".into()));
        }
        if items.is_empty() {
            return Ok(());
        }
        let options = InsertManyOptions::builder().ordered(false).build();
        match self.cart.insert_many(items, options).await.map_err(StoreError::from) {
            Ok(_) | Err(StoreError::Duplicate(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, owner: &str) -> StoreResult<Vec<CartItem>> {
        let options = FindOptions::builder().sort(doc! { "added_at": 1 }).build();
        let cursor = self.cart.find(doc! { "owner": owner }, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count(&self, owner: &str) -> StoreResult<u64> {
        Ok(self.cart.count_documents(doc! { "owner": owner }, None).await?)
    }

    async fn remove(&self, owner: &str, id: &str) -> StoreResult<bool> {
        let result = self.cart.delete_one(doc! { "_id": id, "owner": owner }, None).await?;
        Ok(result.deleted_count == 1)
    }

    async fn clear(&self, owner: &str) -> StoreResult<u64> {
        let result = self.cart.delete_many(doc! { "owner": owner }, None).await?;
        Ok(result.deleted_count)
    }
}

#[async_trait]
impl OrderStore for MongoStore {
    async fn commit(&self, order: &Order) -> StoreResult<()> {
        if self.transactions {
            self.commit_in_transaction(order).await
        } else {
            self.commit_with_compensation(order).await
        }
    }

    async fn list(&self, owner: &str) -> StoreResult<Vec<Order>> {
        let options = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
        let cursor = self.orders.find(doc! { "owner": owner }, options).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(escape_regex("c++ (2nd ed.)"), r"c\+\+ \(2nd ed\.\)");
        assert_eq!(escape_regex("plain"), "plain");
    }

    #[test]
    fn search_matches_title_or_author() {
        let filter = search_filter("tolkien");
        let clauses = filter.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn checkout_deletes_only_ordered_rows() {
        let book = crate::cart::tests::book("0001", "T", 500.0);
        let ordered = CartItem::snapshot(&book, Some("ada@example.com".into()));
        let order = Order::from_items("ada@example.com", vec![ordered.clone()]);

        let filter = ordered_rows(&order);
        assert_eq!(filter.get_str("owner").unwrap(), "ada@example.com");
        let ids = filter.get_document("_id").unwrap().get_array("$in").unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].as_str(), Some(ordered.id.as_str()));
    }
}
