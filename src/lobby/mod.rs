//! Lobbies: pre-match grouping of clients into teams

pub mod model;
pub mod service;

pub use service::LobbyManager;
