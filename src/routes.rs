use actix_web::http::header;
use actix_web::{web, Either, HttpResponse, ResponseError};
use serde_json::json;

use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{AddToCartInput, ChatInput, RemoveFromCartInput, SearchQuery, SignInInput, SignUpInput};
use crate::session::{Session, SessionContext};

const SIGNUP_PAGE: &str = include_str!("../templates/signup.html");
const LOGIN_PAGE: &str = include_str!("../templates/login.html");

/// Form posts come from the HTML pages, JSON from scripts.
type Submission<T> = Either<web::Json<T>, web::Form<T>>;

fn into_parts<T>(submission: Submission<T>) -> (T, bool) {
    match submission {
        Either::Left(json) => (json.into_inner(), true),
        Either::Right(form) => (form.into_inner(), false),
    }
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn html(page: &'static str) -> HttpResponse {
    HttpResponse::Ok().content_type("text/html; charset=utf-8").body(page)
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn signup_page() -> HttpResponse {
    html(SIGNUP_PAGE)
}

pub async fn login_page() -> HttpResponse {
    html(LOGIN_PAGE)
}

pub async fn sign_up(state: web::Data<AppState>, submission: Submission<SignUpInput>) -> AppResult<HttpResponse> {
    let (input, is_json) = into_parts(submission);
    let user_id = state.identity.signup(input).await?;
    if is_json {
        Ok(HttpResponse::Created().json(json!({ "success": true, "user_id": user_id })))
    } else {
        Ok(see_other("/login"))
    }
}

pub async fn sign_in(
    state: web::Data<AppState>,
    session: Session,
    submission: Submission<SignInInput>,
) -> AppResult<HttpResponse> {
    let (input, is_json) = into_parts(submission);
    let identity = state.identity.login(input).await?;

    let mut context = SessionContext {
        guest_cart: session.context().guest_cart,
        ..SessionContext::authenticated(identity.clone())
    };
    state.cart.adopt_guest_cart(&mut context).await?;
    session.renew(context);

    if is_json {
        Ok(HttpResponse::Ok().json(json!({ "success": true, "user": identity })))
    } else {
        Ok(see_other("/"))
    }
}

pub async fn sign_out(state: web::Data<AppState>, session: Session) -> HttpResponse {
    let mut context = session.context();
    state.identity.logout(&mut context);
    session.purge();
    see_other("/login")
}

pub async fn home(state: web::Data<AppState>, session: Session) -> AppResult<HttpResponse> {
    let books = state.catalog.list().await?;
    Ok(HttpResponse::Ok().json(json!({ "user": session.context().user, "books": books })))
}

pub async fn book_details(state: web::Data<AppState>, isbn: web::Path<String>) -> AppResult<HttpResponse> {
    match state.catalog.find_by_isbn(&isbn.into_inner()).await? {
        Some(book) => Ok(HttpResponse::Ok().json(book)),
        None => Err(AppError::BookNotFound),
    }
}

pub async fn search(state: web::Data<AppState>, query: web::Query<SearchQuery>) -> AppResult<HttpResponse> {
    match state.catalog.search(&query.q).await? {
        Some(books) => Ok(HttpResponse::Ok().json(json!({ "query": query.q.trim(), "books": books }))),
        None => Ok(see_other("/")),
    }
}

pub async fn cart_page(state: web::Data<AppState>, session: Session) -> AppResult<HttpResponse> {
    let view = state.cart.items(&session.context()).await?;
    Ok(HttpResponse::Ok().json(view))
}

pub async fn add_to_cart(
    state: web::Data<AppState>,
    session: Session,
    data: web::Json<AddToCartInput>,
) -> AppResult<HttpResponse> {
    let mut context = session.context();
    let item = state.cart.add_item(&mut context, &data.title).await?;
    if context.is_guest() {
        session.renew(context);
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true, "item": item })))
}

pub async fn remove_from_cart(
    state: web::Data<AppState>,
    session: Session,
    data: web::Json<RemoveFromCartInput>,
) -> AppResult<HttpResponse> {
    let item_id = match data.into_inner().id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => return Err(AppError::InvalidInput("No item id provided".into())),
    };

    let mut context = session.context();
    state.cart.remove_item(&mut context, &item_id).await?;
    if context.is_guest() {
        session.renew(context);
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

pub async fn cart_count(state: web::Data<AppState>, session: Session) -> AppResult<HttpResponse> {
    let count = state.cart.count(&session.context()).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

pub async fn clear_cart(state: web::Data<AppState>, session: Session) -> AppResult<HttpResponse> {
    let mut context = session.context();
    state.cart.clear(&mut context).await?;
    if context.is_guest() {
        session.renew(context);
    }
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

pub async fn buy_cart(state: web::Data<AppState>, session: Session) -> HttpResponse {
    match state.orders.place_order(&session.context()).await {
        Ok(order) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Order placed successfully",
            "order": order,
        })),
        Err(e) => {
            if e.status_code().is_server_error() {
                log::error!("checkout failed: {}", e);
            }
            HttpResponse::build(e.status_code())
                .json(json!({ "success": false, "message": e.public_message() }))
        }
    }
}

pub async fn order_history(state: web::Data<AppState>, session: Session) -> AppResult<HttpResponse> {
    let orders = state.orders.orders(&session.context()).await?;
    Ok(HttpResponse::Ok().json(orders))
}

pub async fn chatbot(state: web::Data<AppState>, session: Session, data: web::Json<ChatInput>) -> AppResult<HttpResponse> {
    match state.chat.relay(&session.context(), &data.message).await {
        Ok(reply) => Ok(HttpResponse::Ok().json(json!({ "reply": reply }))),
        Err(AppError::Unauthenticated) => {
            Ok(HttpResponse::Unauthorized().json(json!({ "reply": "Please login first!" })))
        }
        Err(e) => Err(e),
    }
}
