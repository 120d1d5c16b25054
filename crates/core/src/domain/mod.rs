pub mod address;
pub mod order;
pub mod pizza;
