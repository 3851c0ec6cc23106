pub mod client;
pub mod job;
pub mod member;
pub mod role;
pub mod site;
