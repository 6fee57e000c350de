//! Data model shared across the application.

pub mod alert;
pub mod compare;
pub mod ioc;
pub mod monitor;
pub mod scan;
pub mod target;
