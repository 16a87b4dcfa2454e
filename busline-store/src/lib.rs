pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod mailer;
pub mod memory;
pub mod redis_repo;

pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use events::{EventProducer, KafkaEventSink};
pub use mailer::{dispatcher_from_config, ConsoleDispatcher, SmtpDispatcher};
pub use memory::MemoryStore;
pub use redis_repo::RedisClient;
