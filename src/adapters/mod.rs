pub mod api_errors;
pub mod donations;
pub mod mollie;
pub mod notifier;
pub mod ops;
pub mod stripe;
pub mod webhook;
