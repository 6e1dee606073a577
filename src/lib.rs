pub mod api;
pub mod broker;
pub mod clients;
pub mod config;
pub mod consumer;
pub mod mailer;
pub mod models;
pub mod publisher;
pub mod templates;
pub mod topology;
pub mod utils;
pub mod worker;
