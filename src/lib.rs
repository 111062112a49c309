pub mod cli;
pub mod config;
pub mod database;
pub mod job;
pub mod renderer;

#[cfg(test)]
pub mod testing;
