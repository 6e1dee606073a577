pub mod health;
pub mod ledger;
pub mod rbmq;
pub mod redis;
pub mod smtp;
