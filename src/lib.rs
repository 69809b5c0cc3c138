pub mod api;
pub mod background;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod error;
pub mod export;
pub mod holders;
pub mod ledger;
pub mod points;
pub mod processor;
pub mod reaction;
pub mod rpc;
pub mod storage;
