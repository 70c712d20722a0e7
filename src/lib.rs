//! SignalCast Library
//!
//! Online-adaptive signal confidence and risk weighting with a real-time
//! market-update broadcaster

pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod features;
pub mod oracle;
pub mod persistence;
pub mod risk;
pub mod strategy;
pub mod types;
