use actix_cors::Cors;
use actix_web::{
    self, App, HttpServer, http,
    middleware::{Logger, from_fn},
    web,
};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::{
    configs::{RedisCache, connect_database, init_logging},
    middlewares::authentication,
    modules::{
        message::{repository_pg::MessageRepositoryPg, service::MessageService},
        user::{
            repository::UserRepository, repository_cache::CachedUserRepository,
            repository_pg::UserRepositoryPg,
        },
        websocket::{
            handler::websocket_handler, notifier::WebSocketNotifier, registry::ConnectionRegistry,
        },
    },
};

mod api;
mod configs;
mod constants;
mod middlewares;
mod modules;
#[cfg(test)]
mod test;
mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    constants::Env::default()
});

#[actix_web::get("/")]
async fn health_check(registry: web::Data<ConnectionRegistry>) -> String {
    match registry.online_users().await {
        Ok(users) => format!("Server is running, {} user(s) online", users.len()),
        Err(_) => "Server is running".to_string(),
    }
}

async fn build_user_repository(
    db_pool: &sqlx::PgPool,
) -> std::io::Result<Arc<dyn UserRepository + Send + Sync>> {
    let pg_repo = Arc::new(UserRepositoryPg::new(db_pool.clone()));

    let Some(redis_url) = ENV.redis_url.as_deref() else {
        tracing::info!("REDIS_URL not set, user lookups go straight to Postgres");
        return Ok(pg_repo);
    };

    let cache = RedisCache::new(redis_url)
        .await
        .map_err(|_| std::io::Error::other("Redis connection error"))?;
    Ok(Arc::new(CachedUserRepository::new(pg_repo, Arc::new(cache))))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging("info").map_err(std::io::Error::other)?;
    tracing::info!("Environment variables loaded");

    let db_pool =
        connect_database().await.map_err(|_| std::io::Error::other("Database connection error"))?;

    let user_repo = build_user_repository(&db_pool).await?;
    let message_repo = Arc::new(MessageRepositoryPg::new(db_pool.clone()));

    let registry = ConnectionRegistry::start();
    let notifier = WebSocketNotifier::new(
        registry.clone(),
        Duration::from_millis(ENV.notify_timeout_ms),
    );

    let message_service =
        MessageService::with_dependencies(message_repo, user_repo, Arc::new(notifier));

    tracing::info!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    let server_registry = registry.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&ENV.frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(message_service.clone()))
            .app_data(web::Data::new(server_registry.clone()))
            .service(health_check)
            .service(
                web::resource("/ws")
                    .wrap(from_fn(authentication))
                    .route(web::get().to(websocket_handler)),
            )
            .service(
                web::scope("/api")
                    .wrap(from_fn(authentication))
                    .configure(modules::message::route::configure),
            )
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await?;

    match registry.shutdown().await {
        Ok(closed) => tracing::info!("Shutdown complete, {} connection(s) closed", closed),
        Err(e) => tracing::error!("Registry shutdown failed: {}", e),
    }
    Ok(())
}
