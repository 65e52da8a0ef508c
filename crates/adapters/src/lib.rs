//! stobot adapters crate
//!
//! Infrastructure adapters implementing the domain ports:
//! - `store`: SQLite and in-memory news stores
//! - `news`: Arc Games feed client
//! - `chat`: Discord REST adapter
//! - `channels_file`: channels.txt import parser

pub mod channels_file;
mod discord;
mod html;
mod news_api;
mod store_memory;
mod store_sqlite;

/// Re-exports for store adapters
pub mod store {
    pub use crate::store_memory::MemoryStore;
    pub use crate::store_sqlite::SqliteStore;
}

/// Re-exports for the upstream feed adapter
pub mod news {
    pub use crate::news_api::ArcNewsClient;
}

/// Re-exports for the chat adapter
pub mod chat {
    pub use crate::discord::DiscordChat;
}
