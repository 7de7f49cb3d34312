pub mod errors;
pub mod events;
pub mod records;
pub mod store;
