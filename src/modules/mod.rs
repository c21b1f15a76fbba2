pub mod message {
    pub mod schema;
    pub mod model;
    pub mod validation;
    pub mod lifecycle;
    pub mod repository;
    pub mod repository_pg;
    pub mod service;
    pub mod handle;
    pub mod route;
}

pub mod user {
    pub mod schema;
    pub mod repository;
    pub mod repository_pg;
    pub mod repository_cache;
}

pub mod websocket;
