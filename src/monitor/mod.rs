pub mod compress;
pub mod config;
pub mod conversation;
pub mod daemon_lock;
pub mod diff;
pub mod extractor;
pub mod facts;
pub mod ledger;
pub mod parser;
pub mod paths;
pub mod scoring;
pub mod thresholds;
pub mod util;
pub mod warn;
pub mod watcher;
