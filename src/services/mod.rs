//! Persistence contracts, external collaborators and their implementations.

pub mod downstream;
pub mod image_store;
pub mod measurement_repository;
pub mod meter_reader;
pub mod repository;
pub mod user_repository;
