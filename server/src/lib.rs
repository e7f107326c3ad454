pub mod conversation;
pub mod http_server;
pub mod transcript;
