//! Vigil - a long-running liveness monitor.
//!
//! Periodically probes remote targets over ICMP, HTTP, and DNS, smooths the
//! recent liveness history of each target into a discrete health state, and
//! emits a notification only when that state actually changes. Outbound
//! messages flow through a single ordered delivery queue whose consumer
//! retries failed sends with exponential backoff.

pub mod command;
pub mod config;
pub mod delivery;
pub mod monitor;
pub mod probe;
pub mod scheduler;
