//! Selection-driven resolution of one request.
//!
//! The registry is read once per request. Everything else is fetched only
//! when a selected field needs it:
//!
//! - `Environment.builds` is the only trigger for a build list fetch.
//! - `Build.metadata` is the only trigger for a metadata fetch.
//! - `Mfe.dependencies` resolves against the request's registry snapshot.
//!
//! Sibling apps, environments and builds are driven concurrently on the
//! request's task. Build list and metadata fetches are deduplicated per
//! request, and their failures become `null` at the affected field.
//!
//! Dependencies form a graph. Each branch carries the keys of the apps above
//! it; an app that reappears on its own branch is still materialized but its
//! `dependencies` resolve to `null`, which is what stops a cycle. The same
//! app stays fully resolvable on any branch it does not close a cycle on.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use mfe_sources::{AppIndex, AppRecord, BuildRecord, EnvironmentRef, MetadataRecord};
use serde_json::{Map, Value};

use crate::Sources;
use crate::cache::FetchCache;
use crate::error::ErrorCategory;
use crate::selection::{
    AppField, BuildField, EnvironmentField, EnvironmentSlot, MetadataField, QuerySelection,
    RootField, Selected,
};

type BuildList = Option<Arc<Vec<BuildRecord>>>;

/// State shared by every branch of one request.
pub(crate) struct RequestScope<'a> {
    sources: &'a Sources,
    apps: AppIndex,
    builds: FetchCache<String, BuildList>,
    metadata: FetchCache<(String, String), Option<MetadataRecord>>,
}

/// Ancestor keys of the app being resolved, root first.
type Ancestry<'s> = Vec<&'s str>;

impl<'a> RequestScope<'a> {
    pub(crate) fn new(sources: &'a Sources, apps: AppIndex) -> Self {
        Self {
            sources,
            apps,
            builds: FetchCache::new(),
            metadata: FetchCache::new(),
        }
    }

    pub(crate) fn build_lists_requested(&self) -> usize {
        self.builds.len()
    }

    pub(crate) fn metadata_requested(&self) -> usize {
        self.metadata.len()
    }

    pub(crate) async fn resolve(&self, selection: &QuerySelection) -> Value {
        let mut pending = Vec::with_capacity(selection.roots.len());
        for root in &selection.roots {
            pending.push(self.resolve_root(root));
        }
        Value::Object(join_all(pending).await.into_iter().collect())
    }

    fn resolve_root<'s>(&'s self, root: &'s Selected<RootField>) -> BoxFuture<'s, (String, Value)> {
        async move {
            let value = match &root.field {
                RootField::AllApps(selection) => {
                    let mut pending = Vec::with_capacity(self.apps.len());
                    for app in self.apps.all() {
                        pending.push(self.resolve_app(app, selection, Vec::new()));
                    }
                    Value::Array(join_all(pending).await)
                }
                RootField::AppByKey { key, selection } => match self.apps.get(key) {
                    Some(app) => self.resolve_app(app, selection, Vec::new()).await,
                    None => {
                        tracing::debug!(
                            category = ErrorCategory::LookupMiss.as_str(),
                            key = %key,
                            "app not in registry"
                        );
                        Value::Null
                    }
                },
            };
            (root.output.clone(), value)
        }
        .boxed()
    }

    fn resolve_app<'s>(
        &'s self,
        app: &'s AppRecord,
        selection: &'s [Selected<AppField>],
        ancestry: Ancestry<'s>,
    ) -> BoxFuture<'s, Value> {
        async move {
            let closes_cycle = ancestry.contains(&app.key.as_str());
            let mut path = ancestry;
            if !closes_cycle {
                path.push(app.key.as_str());
            }

            let mut pending = Vec::with_capacity(selection.len());
            for selected in selection {
                pending.push(self.resolve_app_field(app, selected, closes_cycle, path.clone()));
            }
            Value::Object(join_all(pending).await.into_iter().collect())
        }
        .boxed()
    }

    fn resolve_app_field<'s>(
        &'s self,
        app: &'s AppRecord,
        selected: &'s Selected<AppField>,
        closes_cycle: bool,
        path: Ancestry<'s>,
    ) -> BoxFuture<'s, (String, Value)> {
        async move {
            let value = match &selected.field {
                AppField::Key => Value::String(app.key.clone()),
                AppField::Type => Value::String(app.kind.clone()),
                AppField::Name => Value::String(app.name.clone()),
                AppField::Dependencies(_) if closes_cycle => {
                    tracing::debug!(key = %app.key, path = ?path, "dependency cycle cut");
                    Value::Null
                }
                AppField::Dependencies(dep_selection) => {
                    self.resolve_dependencies(app, dep_selection, path).await
                }
                AppField::Environments(slots) => self.resolve_environments(app, slots).await,
            };
            (selected.output.clone(), value)
        }
        .boxed()
    }

    fn resolve_dependencies<'s>(
        &'s self,
        app: &'s AppRecord,
        selection: &'s [Selected<AppField>],
        path: Ancestry<'s>,
    ) -> BoxFuture<'s, Value> {
        async move {
            let found = self.apps.select(app.dependencies.iter().map(String::as_str));
            if found.len() < app.dependencies.len() {
                let missing: Vec<_> = app
                    .dependencies
                    .iter()
                    .filter(|key| self.apps.get(key).is_none())
                    .collect();
                if !missing.is_empty() {
                    tracing::debug!(
                        category = ErrorCategory::LookupMiss.as_str(),
                        key = %app.key,
                        missing = ?missing,
                        "dependencies not in registry"
                    );
                }
            }

            let mut pending = Vec::with_capacity(found.len());
            for dependency in found {
                pending.push(self.resolve_app(dependency, selection, path.clone()));
            }
            Value::Array(join_all(pending).await)
        }
        .boxed()
    }

    fn resolve_environments<'s>(
        &'s self,
        app: &'s AppRecord,
        slots: &'s [Selected<EnvironmentSlot>],
    ) -> BoxFuture<'s, Value> {
        async move {
            let mut pending = Vec::with_capacity(slots.len());
            for slot in slots {
                pending.push(self.resolve_environment_slot(app, slot));
            }
            Value::Object(join_all(pending).await.into_iter().collect())
        }
        .boxed()
    }

    fn resolve_environment_slot<'s>(
        &'s self,
        app: &'s AppRecord,
        slot: &'s Selected<EnvironmentSlot>,
    ) -> BoxFuture<'s, (String, Value)> {
        async move {
            let value = match app.environments.get(slot.field.name) {
                Some(environment) => {
                    self.resolve_environment(environment, &slot.field.selection)
                        .await
                }
                None => Value::Null,
            };
            (slot.output.clone(), value)
        }
        .boxed()
    }

    fn resolve_environment<'s>(
        &'s self,
        environment: &'s EnvironmentRef,
        selection: &'s [Selected<EnvironmentField>],
    ) -> BoxFuture<'s, Value> {
        async move {
            // Keys are written in selection order.
            let mut pending = Vec::with_capacity(selection.len());
            for selected in selection {
                match &selected.field {
                    EnvironmentField::Href => {
                        let entry = (
                            selected.output.clone(),
                            Value::String(environment.href.clone()),
                        );
                        pending.push(async move { entry }.boxed());
                    }
                    EnvironmentField::Builds(build_selection) => {
                        pending.push(self.resolve_builds(
                            &environment.href,
                            &selected.output,
                            build_selection,
                        ));
                    }
                }
            }
            Value::Object(join_all(pending).await.into_iter().collect())
        }
        .boxed()
    }

    fn resolve_builds<'s>(
        &'s self,
        environment_href: &'s str,
        output: &'s str,
        selection: &'s [Selected<BuildField>],
    ) -> BoxFuture<'s, (String, Value)> {
        async move {
            let value = match self.build_list(environment_href).await {
                Some(builds) => {
                    let mut pending = Vec::with_capacity(builds.len());
                    for build in builds.iter() {
                        pending.push(self.resolve_build(build.clone(), selection));
                    }
                    Value::Array(join_all(pending).await)
                }
                None => Value::Null,
            };
            (output.to_string(), value)
        }
        .boxed()
    }

    fn resolve_build<'s>(
        &'s self,
        build: BuildRecord,
        selection: &'s [Selected<BuildField>],
    ) -> BoxFuture<'s, Value> {
        async move {
            let mut fields = Map::new();
            for selected in selection {
                let value = match &selected.field {
                    BuildField::Name => Value::String(build.name.clone()),
                    BuildField::Href => Value::String(build.href.clone()),
                    BuildField::Metadata(metadata_selection) => {
                        match self.build_metadata(&build).await {
                            Some(record) => metadata_value(&record, metadata_selection),
                            None => Value::Null,
                        }
                    }
                };
                fields.insert(selected.output.clone(), value);
            }
            Value::Object(fields)
        }
        .boxed()
    }

    /// Build list for an environment, fetched at most once per request.
    async fn build_list(&self, environment_href: &str) -> BuildList {
        let fetch = async move {
            match self
                .sources
                .builds
                .fetch_builds_for_environment(environment_href)
                .await
            {
                Ok(builds) => Some(Arc::new(builds)),
                Err(err) => {
                    tracing::warn!(
                        category = ErrorCategory::SubtreeFetchFailure.as_str(),
                        environment = %environment_href,
                        error = %err,
                        "build list unavailable"
                    );
                    None
                }
            }
        };
        self.builds
            .get_or_fetch(environment_href.to_string(), fetch)
            .await
    }

    /// Metadata for a build, fetched at most once per request.
    async fn build_metadata(&self, build: &BuildRecord) -> Option<MetadataRecord> {
        let fetch = async move {
            match self
                .sources
                .metadata
                .fetch_metadata_for_build(&build.href, &build.name)
                .await
            {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!(
                        category = ErrorCategory::SubtreeFetchFailure.as_str(),
                        environment = %build.href,
                        build = %build.name,
                        error = %err,
                        "build metadata unavailable"
                    );
                    None
                }
            }
        };
        self.metadata
            .get_or_fetch((build.href.clone(), build.name.clone()), fetch)
            .await
    }
}

fn metadata_value(record: &MetadataRecord, selection: &[Selected<MetadataField>]) -> Value {
    let fields = selection
        .iter()
        .map(|selected| {
            let value = match selected.field {
                MetadataField::Id => record.id.clone(),
                MetadataField::Source => record.source.clone(),
            };
            (selected.output.clone(), Value::String(value))
        })
        .collect();
    Value::Object(fields)
}
