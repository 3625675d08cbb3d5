pub mod api;
pub mod config;
pub mod coordinator;
pub mod entities;
pub mod gpio;

#[cfg(test)]
mod testing;
