use std::sync::Arc;

use crate::error::AppResult;
use crate::models::Book;
use crate::store::{CatalogStore, CATALOG_PAGE_LIMIT};

/// Read-only view over the imported books.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn CatalogStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Catalog { store }
    }

    pub async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        Ok(self.store.find_by_isbn(isbn.trim()).await?)
    }

    pub async fn find_by_title(&self, title: &str) -> AppResult<Option<Book>> {
        Ok(self.store.find_by_title(title).await?)
    }

    pub async fn list(&self) -> AppResult<Vec<Book>> {
        Ok(self.store.list(CATALOG_PAGE_LIMIT).await?)
    }

    /// Returns `None` for a blank query; callers show the plain listing instead.
    pub async fn search(&self, query: &str) -> AppResult<Option<Vec<Book>>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.store.search(query, CATALOG_PAGE_LIMIT).await?))
    }
}
