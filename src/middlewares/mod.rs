use actix_web::{
    Error, HttpMessage, HttpRequest,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web,
};
use serde::Deserialize;

use crate::{ENV, api::error, utils::Claims};

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer header first; browsers cannot set headers on a WebSocket
/// handshake, so a `token` query parameter is accepted as well.
fn extract_token(req: &ServiceRequest) -> Option<String> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);

    header.or_else(|| {
        web::Query::<TokenQuery>::from_query(req.query_string())
            .ok()
            .and_then(|q| q.into_inner().token)
            .filter(|t| !t.is_empty())
    })
}

pub async fn authentication<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<B>, Error>
where
    B: MessageBody + 'static,
{
    let Some(token) = extract_token(&req) else {
        return Err(error::Error::unauthorized("Token Invalid or Expired").into());
    };

    let claims = Claims::decode(&token, ENV.jwt_secret.as_ref())
        .map_err(|_| error::Error::unauthorized("Token Invalid or Expired"))?;

    req.extensions_mut().insert(claims);

    next.call(req).await
}

pub fn get_claims(req: &HttpRequest) -> Result<Claims, error::Error> {
    let extensions = req.extensions();

    let claims = extensions
        .get::<Claims>()
        .ok_or_else(|| error::Error::unauthorized("Unauthorized"))?
        .clone();

    Ok(claims)
}
