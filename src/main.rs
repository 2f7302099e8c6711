use std::io;
use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};

mod app;
mod cart;
mod catalog;
mod chat;
mod config;
mod db;
mod error;
mod identity;
mod memory;
mod middleware;
mod models;
mod orders;
mod routes;
mod session;
mod store;

use config::{AppConfig, StorageBackend};
use error::AppError;
use memory::MemoryStore;
use session::SessionKeys;
use store::Stores;

fn startup_error(err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

async fn open_stores(config: &AppConfig) -> Result<Stores, AppError> {
    match config.backend {
        StorageBackend::Mongo => {
            let store = db::MongoStore::open(
                &config.database_url,
                &config.database_name,
                config.mongo_transactions,
            )
            .await?;
            log::info!("connected to MongoDB database `{}`", config.database_name);
            Ok(Stores::from_backend(Arc::new(store)))
        }
        StorageBackend::Memory => {
            let books = match &config.catalog_seed {
                Some(path) => {
                    let raw = std::fs::read_to_string(path)
                        .map_err(|e| AppError::Config(format!("cannot read CATALOG_SEED {path}: {e}")))?;
                    memory::parse_seed(&raw, config.seed_price_range)?
                }
                None => Vec::new(),
            };
            log::info!("using in-memory storage with {} books", books.len());
            Ok(Stores::from_backend(Arc::new(MemoryStore::with_books(books))))
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env().map_err(startup_error)?;
    let stores = open_stores(&config).await.map_err(startup_error)?;
    let chat = chat::ChatRelay::new(config.chat.clone()).map_err(startup_error)?;
    if config.chat.api_url.is_none() {
        log::warn!("CHAT_API_URL not set, chatbot runs in echo mode");
    }

    let state = web::Data::new(app::AppState::new(stores, chat));
    let keys = SessionKeys::new(&config.jwt_secret, config.session_ttl_hours, config.cookie_secure);

    log::info!("BookGenie listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::SessionMiddleware::new(keys.clone()))
            .wrap(Logger::default())
            .configure(app::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
