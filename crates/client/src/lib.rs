//! Client side of offgrid: the network interception layer and its host.
//!
//! This crate provides the request router and caching strategies, the
//! durable retry queue, the interceptor lifecycle controller and the host
//! coordinator's recovery loop.

pub mod fetch;
pub mod host;
pub mod interceptor;
pub mod lifecycle;
pub mod queue;
pub mod router;
pub mod signals;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use fetch::{Destination, HttpTransport, Method, Request, Response, ResponseSource, Transport, TransportConfig};
pub use host::{CoordinatorConfig, HostCoordinator, LoadOutcome, ManualAction, ReloadScheduler, Reloader, TerminalState};
pub use interceptor::Interceptor;
pub use lifecycle::{
    HostEvent, InProcessRegistration, LifecycleController, LifecycleState, Registration, RegistrationEvent,
};
pub use queue::{DrainReport, ReplayRecord, RetryPolicy, RetryQueue};
pub use router::{Matcher, RouteRule, Router, RouterBuilder, default_rules};
pub use signals::{ErrorSignal, ErrorSignals};
pub use strategy::{CacheFirst, NetworkFirst, NetworkOnly, StaleWhileRevalidate, Strategy};
