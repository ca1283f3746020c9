pub mod app;
pub mod cli;
pub mod config;
pub mod debounce;
pub mod dispatcher;
pub mod fetcher;
pub mod logging;
pub mod navigation;
pub mod output;
pub mod pagination;
pub mod query;
pub mod session;
pub mod state;
pub mod utils;

#[cfg(test)]
mod tests;
