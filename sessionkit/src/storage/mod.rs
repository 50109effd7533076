mod codec;
mod errors;
mod session_store;
mod types;

pub use codec::{from_value, to_value};
pub use errors::StorageError;
pub(crate) use session_store::build_store;
pub use session_store::{
    FileSessionStore, MemorySessionStore, Mutation, RedisSessionStore, SessionStore,
};
pub use types::{SessionRecord, Value};
