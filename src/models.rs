use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Price the importer falls back to when a row carries none.
pub const DEFAULT_PRICE: f64 = 449.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub isbn: String,
    pub title: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub author: String,
    #[serde(default, deserialize_with = "loose_opt_string", skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "loose_opt_string", skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "image_url_s", default, deserialize_with = "loose_string")]
    pub image_url_small: String,
    #[serde(rename = "image_url_m", default, deserialize_with = "loose_string")]
    pub image_url_medium: String,
    #[serde(rename = "image_url_l", default, deserialize_with = "loose_string")]
    pub image_url_large: String,
    #[serde(default = "default_price")]
    pub price: f64,
}

fn default_price() -> f64 {
    DEFAULT_PRICE
}

// The CSV importer stores numeric-looking cells (years, some authors) as numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Text(String),
    Int(i64),
    Float(f64),
}

impl Loose {
    fn into_string(self) -> Option<String> {
        match self {
            Loose::Text(s) => Some(s),
            Loose::Int(n) => Some(n.to_string()),
            Loose::Float(f) if f.is_nan() => None,
            Loose::Float(f) => Some(f.to_string()),
        }
    }
}

fn loose_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Loose>::deserialize(d)?.and_then(Loose::into_string))
}

fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(loose_opt_string(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SignUpInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl SignUpInput {
    /// Trims fields and rejects obviously malformed submissions.
    pub fn validate(self) -> Result<Self, String> {
        let username = self.username.trim().to_string();
        let email = self.email.trim().to_lowercase();
        if username.is_empty() {
            return Err("username is required".into());
        }
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err("a valid email is required".into());
        }
        if self.password.is_empty() {
            return Err("password is required".into());
        }
        Ok(SignUpInput { username, email, password: self.password })
    }
}

#[derive(Debug, Deserialize)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

/// Who the current session belongs to once logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub user_id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Counter {
    pub _id: String,
    pub seq: i64,
}

/// A book snapshot sitting in someone's cart.
///
/// `owner` is the user's email for persisted items and `None` for items held
/// in a guest session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub author: String,
    pub price: f64,
    pub isbn: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn snapshot(book: &Book, owner: Option<String>) -> Self {
        CartItem {
            id: uuid::Uuid::new_v4().to_string(),
            title: book.title.clone(),
            author: book.author.clone(),
            price: book.price,
            isbn: book.isbn.clone(),
            image_url: book.image_url_medium.clone(),
            owner,
            added_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner: String,
    pub items: Vec<CartItem>,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds an order owning copies of `items`; the total is fixed here.
    pub fn from_items(owner: &str, items: Vec<CartItem>) -> Self {
        let total_amount = items.iter().map(|item| item.price).sum();
        Order {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            items,
            total_amount,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddToCartInput {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFromCartInput {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatInput {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use serde_json::json;

    #[test]
    fn book_reads_importer_documents() {
        let book: Book = serde_json::from_value(json!({
            "isbn": "0195153448",
            "title": "Classical Mythology",
            "author": "Mark P. O. Morford",
            "year": 2002,
            "publisher": "Oxford University Press",
            "image_url_m": "http://images.example/m.jpg",
        }))
        .unwrap();

        assert_eq!(book.year.as_deref(), Some("2002"));
        assert_eq!(book.image_url_medium, "http://images.example/m.jpg");
        assert_eq!(book.price, DEFAULT_PRICE);
    }

    #[test]
    fn nan_cells_read_as_empty() {
        let book: Book = mongodb::bson::from_document(doc! {
            "isbn": "1",
            "title": "T",
            "author": f64::NAN,
            "image_url_s": "http://images.example/s.jpg",
            "image_url_m": f64::NAN,
            "image_url_l": f64::NAN,
            "price": 120.0,
        })
        .unwrap();
        assert_eq!(book.author, "");
        assert_eq!(book.image_url_small, "http://images.example/s.jpg");
        assert_eq!(book.image_url_medium, "");
        assert_eq!(book.image_url_large, "");
        assert_eq!(book.price, 120.0);
    }

    #[test]
    fn signup_input_is_normalised() {
        let input = SignUpInput {
            username: "  ada ".into(),
            email: " Ada@Example.com ".into(),
            password: "pw".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(input.username, "ada");
        assert_eq!(input.email, "ada@example.com");
    }

    #[test]
    fn signup_input_rejects_bad_email() {
        let result = SignUpInput {
            username: "ada".into(),
            email: "not-an-email".into(),
            password: "pw".into(),
        }
        .validate();
        assert!(result.is_err());
    }

    #[test]
    fn order_total_is_sum_of_snapshots() {
        let book = |price| Book {
            isbn: "1".into(),
            title: "T".into(),
            author: "A".into(),
            year: None,
            publisher: None,
            image_url_small: String::new(),
            image_url_medium: String::new(),
            image_url_large: String::new(),
            price,
        };
        let items = vec![
            CartItem::snapshot(&book(500.0), Some("a@b.c".into())),
            CartItem::snapshot(&book(300.0), Some("a@b.c".into())),
        ];
        let order = Order::from_items("a@b.c", items);
        assert_eq!(order.total_amount, 800.0);
        assert_eq!(order.items.len(), 2);
    }
}
