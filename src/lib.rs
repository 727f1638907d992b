pub mod cloud;
pub mod config;
pub mod credential;
pub mod display;
pub mod errors;
pub mod experiment;
pub mod job;
pub mod poll;
pub mod probe;
pub mod timer;
pub mod types;

#[cfg(test)]
mod testutil;
