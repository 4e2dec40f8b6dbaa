pub mod config;
pub mod decision;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod resource;
pub mod runner;
pub mod server;
pub mod workflow;
