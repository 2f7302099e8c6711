use actix_service::{forward_ready, Service};
use actix_web::dev::{ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use actix_web::{Error, HttpMessage};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::error::AppError;
use crate::session::{SessionChange, SessionContext, SessionKeys, SESSION_COOKIE, SESSION_TOKEN_HEADER};

/// Loads the session context into request extensions and persists changes.
///
/// A missing or invalid token never rejects the request; it simply starts an
/// anonymous session.
pub struct SessionMiddleware {
    keys: Rc<SessionKeys>,
}

impl SessionMiddleware {
    pub fn new(keys: SessionKeys) -> Self {
        SessionMiddleware { keys: Rc::new(keys) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SessionMiddlewareService<S>;
    type InitError = ();

    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SessionMiddlewareService {
            service: Rc::new(service),
            keys: self.keys.clone(),
        })
    }
}

pub struct SessionMiddlewareService<S> {
    service: Rc<S>,
    keys: Rc<SessionKeys>,
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(|token| token.trim().to_string())
}

fn incoming_context(req: &ServiceRequest, keys: &SessionKeys) -> SessionContext {
    let token = req
        .cookie(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| bearer_token(req));

    token
        .and_then(|token| keys.decode(&token))
        .unwrap_or_default()
}

impl<S, B> Service<ServiceRequest> for SessionMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let keys = self.keys.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let context = incoming_context(&req, &keys);
            req.extensions_mut().insert(context);

            let mut res = service.call(req).await?;

            let change = res.request().extensions_mut().remove::<SessionChange>();
            match change {
                Some(SessionChange::Renew(context)) => {
                    let token = keys.encode(&context)?;
                    let header = HeaderValue::from_str(&token)
                        .map_err(|e| AppError::Session(e.to_string()))?;
                    res.response_mut()
                        .add_cookie(&keys.cookie(token))
                        .map_err(|e| AppError::Session(e.to_string()))?;
                    res.headers_mut()
                        .insert(HeaderName::from_static(SESSION_TOKEN_HEADER), header);
                }
                Some(SessionChange::Purge) => {
                    res.response_mut()
                        .add_cookie(&keys.removal_cookie())
                        .map_err(|e| AppError::Session(e.to_string()))?;
                }
                None => {}
            }
            Ok(res)
        })
    }
}
