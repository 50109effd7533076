mod config;
mod file;
mod memory;
mod redis;
mod types;

pub(crate) use config::build_store;
pub use file::FileSessionStore;
pub use memory::MemorySessionStore;
pub use redis::RedisSessionStore;
pub use types::{Mutation, SessionStore};
