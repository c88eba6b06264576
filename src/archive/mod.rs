pub mod audit;
pub mod classify;
pub mod config;
pub mod fsops;
pub mod identity;
pub mod migrate;
pub mod owner;
pub mod reconcile;
pub mod record;
pub mod scanner;
pub mod snapshot;
pub mod util;
pub mod warn;

#[cfg(test)]
mod testing;
