pub mod health_handlers;
pub mod measurement_handlers;
pub mod user_handlers;
