pub mod in_memory_mutex;
pub mod redis_mutex;

pub use in_memory_mutex::InMemoryMutex;
pub use redis_mutex::RedisMutex;
