//! Crawl frontier: task admission, expansion and per-key lifecycle
//!
//! The frontier is owned by a single producer, the crawl coordinator. It turns
//! seed keys and links found on fetched pages into [`CrawlTask`]s, running each
//! key through its route's [`CacheGate`] so every task already knows whether it
//! will read the cache or hit the network.
//!
//! Every key moves through a one-way lifecycle:
//!
//! ```text
//! Seeded -> CacheHit  -> FetchedLocal                -> Extracted | Expanded
//!        -> CacheMiss -> FetchedRemote -> Persisted  -> Extracted | Expanded
//! ```
//!
//! with `Failed` and `Skipped` as the other terminal states. A key that has
//! been admitted once is never admitted again in the same run, which keeps
//! expansion finite even when anchor pages reference each other.

use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use crate::cache::{CacheGate, CacheWriter};
use crate::codec::{ResourceLocator, UrlCodec};
use crate::error::LocatorError;
use crate::extract::{Extractor, Link};
use crate::key::EntityKey;

/// Tag naming the route (codec plus extractor) that handles a task
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(String);

impl HandlerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HandlerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for HandlerId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl Borrow<str> for HandlerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of crawl work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    locator: ResourceLocator,
    key: EntityKey,
    handler: HandlerId,
}

impl CrawlTask {
    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn handler(&self) -> &HandlerId {
        &self.handler
    }
}

/// Lifecycle of a key within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Seeded,
    CacheHit,
    CacheMiss,
    FetchedLocal,
    FetchedRemote,
    Persisted,
    Extracted,
    Expanded,
    Failed,
    /// Remote fetch withheld because the run is local-only
    Skipped,
}

impl KeyState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            KeyState::Extracted | KeyState::Expanded | KeyState::Failed | KeyState::Skipped
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition(self, next: KeyState) -> bool {
        use KeyState::*;
        match (self, next) {
            (_, Failed) => !self.is_terminal(),
            (Seeded, CacheHit | CacheMiss) => true,
            (CacheHit, FetchedLocal) => true,
            (CacheMiss, FetchedRemote | Skipped) => true,
            (FetchedRemote, Persisted) => true,
            (FetchedLocal | Persisted, Extracted | Expanded) => true,
            _ => false,
        }
    }
}

/// A handler's codec, cache access, extractor and follow rules
pub struct Route {
    handler: HandlerId,
    gate: CacheGate,
    writer: CacheWriter,
    extractor: Arc<dyn Extractor>,
    follow: Option<HandlerId>,
    allow_list: Option<HashSet<String>>,
}

impl Route {
    pub fn new(
        handler: impl Into<HandlerId>,
        codec: UrlCodec,
        extractor: impl Extractor + 'static,
    ) -> Self {
        let codec = Arc::new(codec);
        Self {
            handler: handler.into(),
            gate: CacheGate::new(codec.clone()),
            writer: CacheWriter::new(codec),
            extractor: Arc::new(extractor),
            follow: None,
            allow_list: None,
        }
    }

    /// Send links found on this route's pages to another handler
    pub fn follow_into(mut self, handler: impl Into<HandlerId>) -> Self {
        self.follow = Some(handler.into());
        self
    }

    /// Only admit keys whose name is in `names`, for seeds and links alike
    pub fn allow_only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allow_list = Some(
            names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .collect(),
        );
        self
    }

    pub fn handler(&self) -> &HandlerId {
        &self.handler
    }

    pub fn gate(&self) -> &CacheGate {
        &self.gate
    }

    pub fn writer(&self) -> &CacheWriter {
        &self.writer
    }

    pub fn codec(&self) -> &UrlCodec {
        self.gate.codec()
    }

    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }

    /// Handler that receives expansion links; defaults to this route
    pub fn follow_handler(&self) -> &HandlerId {
        self.follow.as_ref().unwrap_or(&self.handler)
    }

    pub fn allows(&self, key: &EntityKey) -> bool {
        self.allow_list
            .as_ref()
            .is_none_or(|names| names.contains(key.name()))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("handler", &self.handler)
            .field("codec", self.gate.codec())
            .field("follow", &self.follow)
            .field("allow_list", &self.allow_list.as_ref().map(HashSet::len))
            .finish()
    }
}

/// Result of offering a key or link to the frontier
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// A new task ready to be fetched
    Task(CrawlTask),
    /// The link could not be turned into a key or locator
    Rejected {
        handler: HandlerId,
        link: String,
        error: LocatorError,
    },
}

/// Deduplicating task producer
#[derive(Debug, Default)]
pub struct Frontier {
    routes: HashMap<HandlerId, Arc<Route>>,
    states: HashMap<(HandlerId, EntityKey), KeyState>,
}

impl Frontier {
    pub fn new<I>(routes: I) -> Self
    where
        I: IntoIterator<Item = Arc<Route>>,
    {
        Self {
            routes: routes
                .into_iter()
                .map(|route| (route.handler().clone(), route))
                .collect(),
            states: HashMap::new(),
        }
    }

    pub fn route(&self, handler: &str) -> Option<&Arc<Route>> {
        self.routes.get(handler)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.values()
    }

    /// Lazily admit seed keys for `handler`
    pub fn seed<'a, I>(&'a mut self, handler: HandlerId, keys: I) -> impl Iterator<Item = Admission> + 'a
    where
        I: IntoIterator<Item = EntityKey>,
        I::IntoIter: 'a,
    {
        keys.into_iter()
            .filter_map(move |key| self.admit(&handler, Link::Key(key)))
    }

    /// Lazily admit the links found on the page of `from`
    ///
    /// Links go to the follow handler of `from`'s route. Keys already seen in
    /// this run and keys outside the route's allow-list are dropped.
    pub fn expand<'a>(
        &'a mut self,
        from: &CrawlTask,
        links: Vec<Link>,
    ) -> impl Iterator<Item = Admission> + use<'a> {
        let target = self
            .routes
            .get(from.handler())
            .map(|route| route.follow_handler().clone());
        links.into_iter().filter_map(move |link| {
            let target = target.as_ref()?;
            self.admit(target, link)
        })
    }

    /// Offer one link to `handler`; `None` means the key was already seen,
    /// filtered out, or the handler is unknown
    pub fn admit(&mut self, handler: &HandlerId, link: Link) -> Option<Admission> {
        let Some(route) = self.routes.get(handler).cloned() else {
            tracing::warn!(handler = %handler, "link offered to unknown handler");
            return None;
        };
        let reject = |link: String, error| {
            Some(Admission::Rejected {
                handler: handler.clone(),
                link,
                error,
            })
        };

        let key = match link {
            Link::Key(key) => key,
            Link::Url(url) => match route.codec().decode_str(&url) {
                Ok(key) => key,
                Err(error) => return reject(url, error),
            },
        };

        if !route.allows(&key) {
            tracing::debug!(handler = %handler, key = %key, "not in allow-list");
            return None;
        }

        let id = (handler.clone(), key);
        if self.states.contains_key(&id) {
            tracing::debug!(handler = %handler, key = %id.1, "already admitted");
            return None;
        }

        let locator = match route.gate().resolve_fetch_target(&id.1) {
            Ok(locator) => locator,
            Err(error) => return reject(id.1.to_string(), error),
        };
        let (handler, key) = id;
        self.states
            .insert((handler.clone(), key.clone()), KeyState::Seeded);
        Some(Admission::Task(CrawlTask {
            locator,
            key,
            handler,
        }))
    }

    /// Record a lifecycle step for `task`'s key
    ///
    /// Returns `false` and leaves the state unchanged when the step is not a
    /// valid transition.
    pub fn mark(&mut self, task: &CrawlTask, next: KeyState) -> bool {
        let id = (task.handler.clone(), task.key.clone());
        match self.states.get_mut(&id) {
            Some(state) if state.can_transition(next) => {
                *state = next;
                true
            }
            Some(state) => {
                tracing::warn!(key = %task.key, from = ?state, to = ?next, "invalid key transition");
                false
            }
            None => false,
        }
    }

    pub fn state(&self, handler: &HandlerId, key: &EntityKey) -> Option<KeyState> {
        self.states.get(&(handler.clone(), key.clone())).copied()
    }

    /// Number of keys admitted so far
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Keys that were admitted but never reached a terminal state
    pub fn unfinished(&self) -> Vec<(HandlerId, EntityKey)> {
        let mut keys: Vec<_> = self
            .states
            .iter()
            .filter(|(_, state)| !state.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        keys.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.name().cmp(b.1.name()))
                .then_with(|| {
                    let suffix = |key: &EntityKey| key.attribute().map(|x| x.suffix());
                    suffix(&a.1).cmp(&suffix(&b.1))
                })
        });
        keys
    }
}
