//! Request router.
//!
//! Rules are tried in registration order and the first match owns the
//! request. There is no specificity ranking: a general rule registered
//! before a narrower one shadows it.

mod defaults;

use std::fmt;
use std::sync::Arc;

use offgrid_core::{CacheDb, Error};
use regex::Regex;
use reqwest::Method;

use crate::fetch::{Destination, Request, Response, Transport};
use crate::queue::RetryQueue;
use crate::strategy::Strategy;

pub use defaults::{
    API_READ_NAMESPACE, IMAGES_NAMESPACE, NAVIGATION_NAMESPACE, STATIC_NAMESPACE, TASK_QUEUE, default_rules,
};

type Predicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Request predicate of a route.
#[derive(Clone)]
pub enum Matcher {
    Destination(Destination),
    Destinations(Vec<Destination>),
    /// URL path starts with the prefix.
    PathPrefix(String),
    /// Regex over the full URL.
    Pattern(Regex),
    SameOrigin,
    CrossOrigin,
    /// Every inner matcher must match.
    All(Vec<Matcher>),
    Custom(Predicate),
}

impl Matcher {
    pub fn custom(f: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Custom(Arc::new(f))
    }

    /// Compile `pattern` into a [`Matcher::Pattern`].
    pub fn pattern(pattern: &str) -> Result<Self, Error> {
        Regex::new(pattern)
            .map(Matcher::Pattern)
            .map_err(|e| Error::InvalidInput(format!("bad route pattern {pattern:?}: {e}")))
    }

    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Matcher::Destination(d) => request.destination == *d,
            Matcher::Destinations(ds) => ds.contains(&request.destination),
            Matcher::PathPrefix(prefix) => request.url.path().starts_with(prefix.as_str()),
            Matcher::Pattern(re) => re.is_match(request.url.as_str()),
            Matcher::SameOrigin => request.same_origin,
            Matcher::CrossOrigin => !request.same_origin,
            Matcher::All(all) => all.iter().all(|m| m.matches(request)),
            Matcher::Custom(f) => f(request),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Destination(d) => f.debug_tuple("Destination").field(d).finish(),
            Matcher::Destinations(ds) => f.debug_tuple("Destinations").field(ds).finish(),
            Matcher::PathPrefix(p) => f.debug_tuple("PathPrefix").field(p).finish(),
            Matcher::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Matcher::SameOrigin => f.write_str("SameOrigin"),
            Matcher::CrossOrigin => f.write_str("CrossOrigin"),
            Matcher::All(all) => f.debug_tuple("All").field(all).finish(),
            Matcher::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One routing rule. Immutable once the router is built.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub name: String,
    pub matcher: Matcher,
    /// Methods the rule accepts; GET unless overridden.
    pub methods: Vec<Method>,
    pub strategy: Arc<dyn Strategy>,
    pub namespace: String,
    /// Retry queue for mutations that fail at the network layer.
    pub queue: Option<String>,
    /// Request headers the cached responses vary on.
    pub vary: Vec<String>,
}

impl RouteRule {
    pub fn new(
        name: impl Into<String>, matcher: Matcher, strategy: impl Strategy + 'static, namespace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            matcher,
            methods: vec![Method::GET],
            strategy: Arc::new(strategy),
            namespace: namespace.into(),
            queue: None,
            vary: Vec::new(),
        }
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn vary<S: Into<String>>(mut self, headers: impl IntoIterator<Item = S>) -> Self {
        self.vary = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches(&self, request: &Request) -> bool {
        self.methods.contains(&request.method) && self.matcher.matches(request)
    }
}

pub struct RouterBuilder {
    db: CacheDb,
    transport: Arc<dyn Transport>,
    rules: Vec<RouteRule>,
    queue: Option<Arc<RetryQueue>>,
}

impl RouterBuilder {
    pub fn rule(mut self, rule: RouteRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = RouteRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Queue that receives failed mutations of queued routes.
    pub fn retry_queue(mut self, queue: Arc<RetryQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn build(self) -> Router {
        if self.queue.is_none() && self.rules.iter().any(|r| r.queue.is_some()) {
            tracing::warn!("queued routes registered without a retry queue; failed mutations will not be kept");
        }
        tracing::debug!(rules = self.rules.len(), "router built");
        Router { db: self.db, transport: self.transport, rules: self.rules, queue: self.queue }
    }
}

pub struct Router {
    db: CacheDb,
    transport: Arc<dyn Transport>,
    rules: Vec<RouteRule>,
    queue: Option<Arc<RetryQueue>>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("rules", &self.rules).finish_non_exhaustive()
    }
}

impl Router {
    pub fn builder(db: CacheDb, transport: Arc<dyn Transport>) -> RouterBuilder {
        RouterBuilder { db, transport, rules: Vec::new(), queue: None }
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// First rule that owns `request`.
    pub fn match_rule(&self, request: &Request) -> Option<&RouteRule> {
        self.rules.iter().find(|r| r.matches(request))
    }

    /// Dispatch `request` to its rule's strategy, or straight to the network.
    ///
    /// Strategy errors reach the caller with their original code. A transient
    /// failure of a mutation on a queued route is persisted for replay and
    /// comes back wrapped in [`Error::Queued`] with the row id; if it could
    /// not be persisted the bare failure is returned.
    pub async fn route(&self, request: &Request) -> Result<Response, Error> {
        let Some(rule) = self.match_rule(request) else {
            tracing::debug!(method = %request.method, url = %request.url, "no route, passing through");
            return self.transport.fetch(request).await;
        };

        tracing::debug!(route = %rule.name, strategy = rule.strategy.name(), url = %request.url, "routed");
        let namespace = self.db.open_namespace(&rule.namespace);
        let keyed;
        let request = if rule.vary.is_empty() {
            request
        } else {
            keyed = request.clone().varying_on(&rule.vary);
            &keyed
        };
        let error = match rule.strategy.execute(&self.transport, request, &namespace).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        let Some(queue_name) = rule.queue.as_ref().filter(|_| error.is_transient() && request.is_mutating()) else {
            return Err(error);
        };
        let Some(queue) = &self.queue else {
            tracing::warn!(queue = %queue_name, url = %request.url, "no retry queue attached, mutation lost");
            return Err(error);
        };

        match queue.enqueue(queue_name, request).await {
            Ok(id) => Err(Error::Queued { queue: queue_name.clone(), id, source: Box::new(error) }),
            Err(qe) => {
                tracing::warn!(queue = %queue_name, error = %qe, url = %request.url, "failed mutation could not be queued");
                Err(error)
            }
        }
    }
}
