//! CSV driver: script rows in, ledger state out.

pub mod account_writer;
pub mod script_reader;
pub mod script_runner;
