use actix_web::web;

use crate::cart::CartManager;
use crate::catalog::Catalog;
use crate::chat::ChatRelay;
use crate::identity::Identity;
use crate::orders::OrderService;
use crate::routes;
use crate::store::Stores;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub identity: Identity,
    pub cart: CartManager,
    pub orders: OrderService,
    pub chat: ChatRelay,
}

impl AppState {
    pub fn new(stores: Stores, chat: ChatRelay) -> Self {
        let catalog = Catalog::new(stores.catalog);
        AppState {
            identity: Identity::new(stores.users),
            cart: CartManager::new(catalog.clone(), stores.cart.clone()),
            orders: OrderService::new(stores.cart, stores.orders),
            catalog,
            chat,
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(routes::health))
        .route("/signup", web::get().to(routes::signup_page))
        .route("/signup", web::post().to(routes::sign_up))
        .route("/login", web::get().to(routes::login_page))
        .route("/login", web::post().to(routes::sign_in))
        .route("/logout", web::get().to(routes::sign_out))
        .route("/", web::get().to(routes::home))
        .route("/book/{isbn}", web::get().to(routes::book_details))
        .route("/search", web::get().to(routes::search))
        .route("/cart", web::get().to(routes::cart_page))
        .service(
            web::scope("/api")
                .route("/cart/add", web::post().to(routes::add_to_cart))
                .route("/cart/remove", web::post().to(routes::remove_from_cart))
                .route("/cart/count", web::get().to(routes::cart_count))
                .route("/cart/clear", web::post().to(routes::clear_cart))
                .route("/cart/buy", web::post().to(routes::buy_cart))
                .route("/orders", web::get().to(routes::order_history))
                .route("/chatbot", web::post().to(routes::chatbot)),
        );
}
