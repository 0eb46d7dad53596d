#![forbid(unsafe_code)]

pub mod classify;
pub mod cli;
pub mod crawl;
pub mod download;
pub mod extract;
pub mod formats;
pub mod ledger;
pub mod logging;
pub mod municipalities;
pub mod select;
