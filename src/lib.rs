pub mod backend;
pub mod client;
pub mod compatibility;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod recommend;
pub mod resource;
pub mod server;

#[cfg(test)]
mod server_test;
#[cfg(test)]
mod test_support;
