pub mod job;
pub mod ledger;
pub mod registry;
pub mod runner;
