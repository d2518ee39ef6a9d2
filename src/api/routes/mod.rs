pub mod checks;
pub mod gpus;
pub mod health;
pub mod metrics;
pub mod registration;
pub mod results;
