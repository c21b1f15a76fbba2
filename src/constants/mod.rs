pub struct Env {
    pub jwt_secret: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: Option<String>,
    pub frontend_url: String,
    pub ip: String,
    pub port: u16,
    pub notify_timeout_ms: u64,
    pub ws_heartbeat_secs: u64,
    pub ws_client_timeout_secs: u64,
    pub ws_max_frame_size: usize,
}

fn parse_or<T: std::str::FromStr>(key: &str, default: &str) -> T {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .unwrap_or_else(|_| panic!("{key} must be a valid number"))
}

impl Env {
    fn new() -> Self {
        let jwt_secret = std::env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in .env file or environment variable");

        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");
        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", "5");

        let redis_url = std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty());

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("PORT", "8080");

        let notify_timeout_ms = parse_or("NOTIFY_TIMEOUT_MS", "5000");
        let ws_heartbeat_secs = parse_or("WS_HEARTBEAT_SECS", "30");
        let ws_client_timeout_secs = parse_or("WS_CLIENT_TIMEOUT_SECS", "60");
        let ws_max_frame_size = parse_or("WS_MAX_FRAME_SIZE", "512");

        Env {
            jwt_secret,
            database_url,
            db_max_connections,
            redis_url,
            frontend_url,
            ip,
            port,
            notify_timeout_ms,
            ws_heartbeat_secs,
            ws_client_timeout_secs,
            ws_max_frame_size,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
