use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use deadpool_redis::{CreatePoolError, PoolError, redis::RedisError};
use std::borrow::Cow;

use crate::ENV;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Bad Request: {0}")]
    BadRequest(Cow<'static, str>),
    #[error("Unauthorized: {0}")]
    Unauthorized(Cow<'static, str>),
    #[error("Forbidden: {0}")]
    Forbidden(Cow<'static, str>),
    #[error("Not Found: {0}")]
    NotFound(Cow<'static, str>),
    #[error("Internal Server Error")]
    InternalServer,
}

#[derive(serde::Serialize)]
pub struct ErrorBody {
    pub message: Cow<'static, str>,
}

impl Error {
    pub fn unauthorized(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Unauthorized(msg.into())
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match *self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InternalServer => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let header = ("Access-Control-Allow-Origin", ENV.frontend_url.as_str());
        let mut res = HttpResponse::build(self.status_code());

        res.insert_header(header);
        res.insert_header(("Access-Control-Allow-Credentials", "true"));

        match self {
            // Has Message
            Error::NotFound(msg)
            | Error::Unauthorized(msg)
            | Error::BadRequest(msg)
            | Error::Forbidden(msg) => res.json(ErrorBody { message: msg.clone() }),
            // No Message
            Error::InternalServer => {
                res.json(ErrorBody { message: "Internal Server Error".into() })
            }
        }
    }
}

/// Reasons a candidate message or recipient row is refused before any write.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message must contain text or media")]
    EmptyMessage,
    #[error("message exceeds 1000 character limit")]
    MessageTooLong,
    #[error("invalid media URL format")]
    InvalidMediaUrl,
    #[error("direct messages require exactly one recipient")]
    InvalidRecipient,
    #[error("broadcasts cannot have direct recipient")]
    InvalidBroadcast,
    #[error("message requires at least one recipient")]
    NoRecipients,
    #[error("direct messages should not specify recipients list")]
    DirectMessageNoList,
    #[error("both message and user IDs are required")]
    MissingIds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User,
    Message,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::User => f.write_str("User"),
            Resource::Message => f.write_str("Message"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SystemError {
    // domain errors
    #[error("Validation Error: {0}")]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(Resource),
    #[error("Forbidden: {0}")]
    Forbidden(Cow<'static, str>),
    // realtime errors
    #[error("Delivery failed: {0}")]
    Delivery(Cow<'static, str>),
    #[error("Connection registry unavailable")]
    Registry(#[from] actix::MailboxError),
    // jwt errors
    #[error("JWT Error")]
    JwtError(#[from] jsonwebtoken::errors::Error),
    // sqlx errors
    #[error("Database Error : {0}")]
    DatabaseError(Cow<'static, str>),
    #[error("Migration Error")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
    // serde errors
    #[error("JSON Serialization/Deserialization Error")]
    JsonError(#[from] serde_json::Error),
    // redis errors
    #[error(transparent)]
    PoolInit(#[from] CreatePoolError),
    #[error("Redis pool error: {0}")]
    PoolGet(#[from] PoolError),
    #[error("Redis error")]
    RedisError(#[from] RedisError),
    #[error("Internal System Error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl From<SystemError> for Error {
    fn from(value: SystemError) -> Self {
        match value {
            SystemError::Validation(reason) => Error::BadRequest(reason.to_string().into()),
            SystemError::Forbidden(msg) => Error::Forbidden(msg),
            SystemError::NotFound(resource) => Error::NotFound(format!("{resource} not found").into()),
            _ => {
                tracing::error!("Internal Server Error: {:?}", value);
                Error::InternalServer
            }
        }
    }
}

impl From<sqlx::Error> for SystemError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                // foreign key violation: a referenced user vanished mid-write
                Some("23503") => return SystemError::NotFound(Resource::User),
                _ => {
                    tracing::error!("Unhandled DB error: {:?}", db_err);
                    return SystemError::DatabaseError(db_err.message().to_string().into());
                }
            }
        }
        tracing::error!("{:?}", err);
        SystemError::InternalError(Box::new(err))
    }
}

impl SystemError {
    pub fn forbidden(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn delivery(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Delivery(msg.into())
    }
}
