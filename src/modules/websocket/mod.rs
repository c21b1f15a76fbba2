/// Real-time delivery over WebSocket
///
/// - Message protocol (ClientMessage & ServerMessage)
/// - Connection handles and the registry actor that tracks them
/// - Notifier pushing persisted messages to online users
/// - HTTP handler upgrading requests to WebSocket
pub mod connection;
pub mod events;
pub mod handler;
pub mod message;
pub mod notifier;
pub mod registry;
