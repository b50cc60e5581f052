pub mod attempt;
pub mod audit;
pub mod donation;
pub mod error;
pub mod event;
pub mod gateway;
pub mod id;
pub mod job;
pub mod money;
pub mod notify;
pub mod payment;
pub mod store;
pub mod transition;
