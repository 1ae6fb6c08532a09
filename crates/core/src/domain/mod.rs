pub mod approval;
pub mod client;
pub mod notification;
pub mod opportunity;
pub mod user;
