//! Request interception for offcache.
//!
//! This crate provides the network abstraction and its reqwest client, the
//! route classifier, and the [`Worker`] that answers requests from the
//! versioned stores according to per-route strategies.

pub mod fetch;
pub mod route;
pub mod worker;

pub use fetch::{Destination, FetchClient, FetchConfig, Network, Request, Response, ResponseSource};
pub use route::{RouteTable, Strategy};
pub use worker::{
    ActivationReport, CONTACT_SYNC, InstallReport, LifecycleState, MessageReply, StoreStatus, SubmitOutcome,
    SyncReport, Worker, WorkerEvent, WorkerMessage, WorkerStatus,
};

/// Header names for building requests without a direct reqwest dependency.
pub use reqwest::header;
