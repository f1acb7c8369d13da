//! clusterkeeper - topology reconciliation for replicated database clusters
//!
//! Periodically compares the desired topology of each cluster against
//! what its instances report, then issues the imperative commands that
//! close the gap: primary election, standby bootstrap, switchover,
//! cleanup, rolling upgrade, restore and most-available tuning.

pub mod cli;
pub mod instance;
pub mod model;
pub mod observability;
pub mod operator;
pub mod platform;
pub mod reconcile;
pub mod replication;
pub mod retry;
pub mod sim;
