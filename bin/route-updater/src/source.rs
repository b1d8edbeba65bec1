//! TrafficDirector event subscription
//!
//! Objects are watched untyped and parsed one at a time, so a single object
//! that does not match the schema is skipped without stalling the others.

use crate::error::SourceError;
use async_trait::async_trait;
use director_api::TrafficDirector;
use director_core::{ResourceEvent, ResourceIdentity};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, DynamicObject};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

pub type EventStream = BoxStream<'static, Result<ResourceEvent, SourceError>>;

/// A feed of lifecycle events. The first subscription starts with the
/// current objects; the stream ends only if the underlying watch gives up.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self) -> Result<EventStream, SourceError>;
}

/// Watches TrafficDirectors in one namespace.
///
/// The watcher resumes from the last seen resourceVersion after a server-side
/// timeout and only relists after the version expires. Relisted objects whose
/// version did not change produce no event.
pub struct KubeEventSource {
    api: Api<DynamicObject>,
    namespace: String,
    config: watcher::Config,
    tracker: Arc<Mutex<ResourceTracker>>,
}

impl KubeEventSource {
    pub fn new(client: Client, namespace: &str, watch_timeout_secs: u32) -> Self {
        let resource = ApiResource::erase::<TrafficDirector>(&());
        Self {
            api: Api::namespaced_with(client, namespace, &resource),
            namespace: namespace.to_string(),
            config: watcher::Config::default().timeout(watch_timeout_secs),
            tracker: Arc::new(Mutex::new(ResourceTracker::default())),
        }
    }
}

#[async_trait]
impl EventSource for KubeEventSource {
    async fn subscribe(&self) -> Result<EventStream, SourceError> {
        info!("Watching TrafficDirectors in namespace {}", self.namespace);

        let tracker = self.tracker.clone();
        let events = watcher(self.api.clone(), self.config.clone())
            .default_backoff()
            .flat_map(move |item| {
                let events = tracker
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .observe(item);
                stream::iter(events)
            });
        Ok(events.boxed())
    }
}

/// Last delivered object per identity, used to tell creations from updates,
/// drop unchanged relisted objects and detect deletions missed while the
/// watch was down.
#[derive(Default)]
pub struct ResourceTracker {
    known: HashMap<ResourceIdentity, TrafficDirector>,
    relisted: Option<HashSet<ResourceIdentity>>,
}

impl ResourceTracker {
    pub fn observe(
        &mut self,
        item: Result<watcher::Event<DynamicObject>, watcher::Error>,
    ) -> Vec<Result<ResourceEvent, SourceError>> {
        let event = match item {
            Ok(event) => event,
            Err(e) => return vec![Err(e.into())],
        };

        match event {
            watcher::Event::Init => {
                debug!("Listing TrafficDirectors");
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let (Some(id), Some(relisted)) = (identity(&obj.metadata), self.relisted.as_mut()) {
                    relisted.insert(id);
                }
                self.applied(obj)
            }
            watcher::Event::Apply(obj) => self.applied(obj),
            watcher::Event::Delete(obj) => self.deleted(obj),
            watcher::Event::InitDone => self.relist_done(),
        }
    }

    fn applied(&mut self, obj: DynamicObject) -> Vec<Result<ResourceEvent, SourceError>> {
        let Some(td) = parse(obj) else {
            return Vec::new();
        };
        let Some(id) = identity(&td.metadata) else {
            return vec![Ok(ResourceEvent::Created(td))];
        };

        let event = match self.known.get(&id) {
            Some(previous) if same_version(previous, &td) => {
                debug!(
                    "TrafficDirector {} unchanged at version {:?}",
                    id, td.metadata.resource_version
                );
                return Vec::new();
            }
            Some(_) => ResourceEvent::Updated(td.clone()),
            None => ResourceEvent::Created(td.clone()),
        };
        self.known.insert(id, td);
        vec![Ok(event)]
    }

    fn deleted(&mut self, obj: DynamicObject) -> Vec<Result<ResourceEvent, SourceError>> {
        let previous = identity(&obj.metadata).and_then(|id| self.known.remove(&id));
        match parse(obj).or(previous) {
            Some(td) => vec![Ok(ResourceEvent::Deleted(td))],
            None => Vec::new(),
        }
    }

    fn relist_done(&mut self) -> Vec<Result<ResourceEvent, SourceError>> {
        let Some(relisted) = self.relisted.take() else {
            return Vec::new();
        };
        let gone: Vec<ResourceIdentity> = self
            .known
            .keys()
            .filter(|id| !relisted.contains(*id))
            .cloned()
            .collect();

        gone.into_iter()
            .filter_map(|id| {
                let td = self.known.remove(&id)?;
                info!("TrafficDirector {} was deleted while not watching", id);
                Some(Ok(ResourceEvent::Deleted(td)))
            })
            .collect()
    }
}

fn identity(meta: &ObjectMeta) -> Option<ResourceIdentity> {
    match (meta.namespace.as_deref(), meta.name.as_deref()) {
        (Some(ns), Some(name)) if !ns.is_empty() && !name.is_empty() => {
            Some(ResourceIdentity::new(ns, name))
        }
        _ => None,
    }
}

fn parse(obj: DynamicObject) -> Option<TrafficDirector> {
    let name = obj.metadata.name.clone().unwrap_or_default();
    match obj.try_parse::<TrafficDirector>() {
        Ok(td) => Some(td),
        Err(e) => {
            warn!("Skipping malformed TrafficDirector '{}': {}", name, e);
            None
        }
    }
}

fn same_version(a: &TrafficDirector, b: &TrafficDirector) -> bool {
    match (&a.metadata.resource_version, &b.metadata.resource_version) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
