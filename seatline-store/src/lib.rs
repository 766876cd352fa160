pub mod app_config;
pub mod database;
pub mod redis_repo;
pub mod seat_repo;
pub mod booking_repo;
pub mod payment_repo;
pub mod ticket_repo;
pub mod trip_repo;
pub mod memory;

pub use database::DbClient;
pub use redis_repo::RedisClient;
pub use seat_repo::PgSeatStore;
pub use booking_repo::PgBookingRepository;
pub use payment_repo::PgPaymentRepository;
pub use ticket_repo::PgTicketRepository;
pub use trip_repo::PgTripRepository;
