pub mod health;
pub mod message;
pub mod registrant;
pub mod retry;
pub mod status;
pub mod topology;
pub mod validation;
