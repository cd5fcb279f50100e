pub mod fsutils;
pub mod unit_interval;
pub mod workers;
