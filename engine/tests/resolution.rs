#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end resolution against canned upstream documents.
//!
//! Every test asserts on the fetches the engine actually issued as well as
//! on the result tree.

use std::sync::Arc;

use mfe_engine::{Engine, EngineOptions, ErrorCategory, QueryRequest, ResolveError, Sources};
use mfe_sources::testing::StaticFetcher;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use url::Url;

const REGISTRY: &str = "https://registry.test/v0/ep.global.config.json";

fn env(app: &str, name: &str) -> String {
    format!("https://cdn.test/{app}/{name}/")
}

fn builds_href(app: &str, name: &str) -> String {
    format!("{}ep.builds.config.json", env(app, name))
}

fn metadata_href(app: &str, name: &str, build: &str) -> String {
    format!("{}{build}/ep.metadata.config.json", env(app, name))
}

/// Registry with `shell` (live + staging, depends on `auth`), `auth` (live
/// only), a vendor entry and an untyped proxy-target entry.
fn registry() -> Value {
    json!({
        "auth": {
            "type": "MFE_APP",
            "name": "Authentication",
            "dependencies": [],
            "environments": { "live": { "href": env("auth", "live") } }
        },
        "fontawesome": { "type": "VENDOR", "href": "https://cdn.test/fa.js" },
        "proxyTargets": { "urls": ["https://proxy.test/"] },
        "shell": {
            "type": "MFE_APP",
            "name": "Shell",
            "dependencies": ["auth", "missing", "auth"],
            "environments": {
                "live": { "href": env("shell", "live") },
                "staging": { "href": env("shell", "staging") }
            }
        }
    })
}

fn engine(fetcher: &Arc<StaticFetcher>) -> Engine {
    engine_with(fetcher, EngineOptions::default())
}

fn engine_with(fetcher: &Arc<StaticFetcher>, options: EngineOptions) -> Engine {
    let location = Url::parse(REGISTRY).unwrap();
    Engine::new(Sources::new(fetcher.clone(), location), options)
}

async fn run(engine: &Engine, query: &str) -> Value {
    engine
        .execute(&QueryRequest::new(query))
        .await
        .expect("query should resolve")
}

#[tokio::test]
async fn scalars_only_fetch_the_registry() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(REGISTRY, registry()));

    let data = run(
        &engine(&fetcher),
        "{ mfes { key type name environments { live { href } local { href } } } }",
    )
    .await;

    assert_eq!(
        data,
        json!({
            "mfes": [
                {
                    "key": "auth",
                    "type": "MFE_APP",
                    "name": "Authentication",
                    "environments": {
                        "live": { "href": env("auth", "live") },
                        "local": null
                    }
                },
                {
                    "key": "shell",
                    "type": "MFE_APP",
                    "name": "Shell",
                    "environments": {
                        "live": { "href": env("shell", "live") },
                        "local": null
                    }
                }
            ]
        })
    );
    assert_eq!(fetcher.fetched_hrefs(), vec![REGISTRY.to_string()]);
}

#[tokio::test]
async fn builds_and_metadata_are_selection_gated() {
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_json(REGISTRY, registry())
            .with_json(&builds_href("shell", "live"), json!(["main", "feature-x"]))
            .with_json(
                &metadata_href("shell", "live", "main"),
                json!({ "buildId": 812, "buildName": "main" }),
            )
            .with_json(
                &metadata_href("shell", "live", "feature-x"),
                json!({ "buildId": "abc", "buildName": "pr-7", "sourceName": "feature-x" }),
            ),
    );
    let engine = engine(&fetcher);

    let names = run(&engine, r#"{ mfe(key: "shell") { environments { live { builds { name } } } } }"#).await;
    assert_eq!(
        names,
        json!({ "mfe": { "environments": { "live": { "builds": [
            { "name": "main" },
            { "name": "feature-x" }
        ] } } } })
    );
    assert_eq!(fetcher.total_fetches(), 2);

    let with_metadata = run(
        &engine,
        r#"{ mfe(key: "shell") { environments { live { builds { name metadata { id source } } } } } }"#,
    )
    .await;
    assert_eq!(
        with_metadata,
        json!({ "mfe": { "environments": { "live": { "builds": [
            { "name": "main", "metadata": { "id": "812", "source": "main" } },
            { "name": "feature-x", "metadata": { "id": "abc", "source": "feature-x" } }
        ] } } } })
    );
    // Second request has its own snapshot: registry + builds + two metadata.
    assert_eq!(fetcher.total_fetches(), 2 + 4);
}

#[tokio::test]
async fn dependencies_follow_authored_order_without_misses_or_repeats() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(REGISTRY, registry()));

    let data = run(
        &engine(&fetcher),
        r#"{ mfe(key: "shell") { key dependencies { key dependencies { key } } } }"#,
    )
    .await;

    assert_eq!(
        data,
        json!({ "mfe": {
            "key": "shell",
            "dependencies": [ { "key": "auth", "dependencies": [] } ]
        } })
    );
    assert_eq!(fetcher.fetch_count(REGISTRY), 1);
}

#[tokio::test]
async fn unknown_key_resolves_to_null() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(REGISTRY, registry()));

    let data = run(&engine(&fetcher), r#"{ mfe(key: "nope") { key } }"#).await;

    assert_eq!(data, json!({ "mfe": null }));
}

#[tokio::test]
async fn self_dependency_is_cut_after_one_level() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(
        REGISTRY,
        json!({
            "loop": { "type": "MFE_APP", "name": "Loop", "dependencies": ["loop"] }
        }),
    ));

    let data = run(
        &engine(&fetcher),
        r#"{ mfe(key: "loop") { key dependencies { key name dependencies { key } } } }"#,
    )
    .await;

    assert_eq!(
        data,
        json!({ "mfe": {
            "key": "loop",
            "dependencies": [ { "key": "loop", "name": "Loop", "dependencies": null } ]
        } })
    );
}

#[tokio::test]
async fn mutual_cycle_is_cut_where_it_closes() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(
        REGISTRY,
        json!({
            "a": { "type": "MFE_APP", "name": "A", "dependencies": ["b"] },
            "b": { "type": "MFE_APP", "name": "B", "dependencies": ["a"] }
        }),
    ));

    let data = run(
        &engine(&fetcher),
        "{ mfes { key dependencies { key dependencies { key dependencies { key } } } } }",
    )
    .await;

    assert_eq!(
        data["mfes"][0],
        json!({
            "key": "a",
            "dependencies": [ {
                "key": "b",
                "dependencies": [ { "key": "a", "dependencies": null } ]
            } ]
        })
    );
    assert_eq!(
        data["mfes"][1]["dependencies"][0]["dependencies"][0],
        json!({ "key": "b", "dependencies": null })
    );
}

#[tokio::test]
async fn shared_app_stays_resolvable_on_sibling_paths() {
    // `top` reaches `leaf` twice through different parents; neither path is a
    // cycle, so both copies keep their dependencies.
    let fetcher = Arc::new(StaticFetcher::new().with_json(
        REGISTRY,
        json!({
            "top": { "type": "MFE_APP", "name": "Top", "dependencies": ["left", "right"] },
            "left": { "type": "MFE_APP", "name": "Left", "dependencies": ["leaf"] },
            "right": { "type": "MFE_APP", "name": "Right", "dependencies": ["leaf"] },
            "leaf": { "type": "MFE_APP", "name": "Leaf", "dependencies": ["base"] },
            "base": { "type": "MFE_APP", "name": "Base" }
        }),
    ));

    let data = run(
        &engine(&fetcher),
        r#"{ mfe(key: "top") { dependencies { key dependencies { key dependencies { key } } } } }"#,
    )
    .await;

    let expected_leaf = json!({ "key": "leaf", "dependencies": [ { "key": "base" } ] });
    assert_eq!(data["mfe"]["dependencies"][0]["dependencies"][0], expected_leaf);
    assert_eq!(data["mfe"]["dependencies"][1]["dependencies"][0], expected_leaf);
}

#[tokio::test]
async fn failed_build_list_only_nulls_its_own_field() {
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_json(REGISTRY, registry())
            .with_status(&builds_href("shell", "live"), 503)
            .with_json(&builds_href("shell", "staging"), json!(["rc-1"]))
            .with_malformed(&builds_href("auth", "live"), "<html>oops</html>"),
    );

    let data = run(
        &engine(&fetcher),
        "{ mfes { key environments { live { href builds { name } } staging { builds { name } } } } }",
    )
    .await;

    assert_eq!(
        data,
        json!({ "mfes": [
            {
                "key": "auth",
                "environments": {
                    "live": { "href": env("auth", "live"), "builds": null },
                    "staging": null
                }
            },
            {
                "key": "shell",
                "environments": {
                    "live": { "href": env("shell", "live"), "builds": null },
                    "staging": { "builds": [ { "name": "rc-1" } ] }
                }
            }
        ] })
    );
}

#[tokio::test]
async fn failed_metadata_only_nulls_its_own_build() {
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_json(REGISTRY, registry())
            .with_json(&builds_href("auth", "live"), json!(["good", "bad", "shapeless"]))
            .with_json(
                &metadata_href("auth", "live", "good"),
                json!({ "buildId": "1", "buildName": "good" }),
            )
            .with_status(&metadata_href("auth", "live", "bad"), 404)
            .with_json(&metadata_href("auth", "live", "shapeless"), json!({ "buildName": "x" })),
    );

    let data = run(
        &engine(&fetcher),
        r#"{ mfe(key: "auth") { environments { live { builds { name metadata { id } } } } } }"#,
    )
    .await;

    assert_eq!(
        data["mfe"]["environments"]["live"]["builds"],
        json!([
            { "name": "good", "metadata": { "id": "1" } },
            { "name": "bad", "metadata": null },
            { "name": "shapeless", "metadata": null }
        ])
    );
}

#[tokio::test]
async fn shared_environment_is_fetched_once_per_request() {
    let shared = "https://cdn.test/common/live/";
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_json(
                REGISTRY,
                json!({
                    "one": { "type": "MFE_APP", "name": "One",
                             "environments": { "live": { "href": shared }, "test": { "href": shared } } },
                    "two": { "type": "MFE_APP", "name": "Two",
                             "environments": { "live": { "href": shared } } }
                }),
            )
            .with_json(&format!("{shared}ep.builds.config.json"), json!(["main"]))
            .with_json(
                &format!("{shared}main/ep.metadata.config.json"),
                json!({ "buildId": 3, "buildName": "main" }),
            ),
    );

    let data = run(
        &engine(&fetcher),
        "{ mfes { environments { live { builds { metadata { id } } } test { builds { name } } } } }",
    )
    .await;

    assert_eq!(data["mfes"][1]["environments"]["live"]["builds"][0]["metadata"]["id"], "3");
    assert_eq!(fetcher.fetch_count(&format!("{shared}ep.builds.config.json")), 1);
    assert_eq!(fetcher.fetch_count(&format!("{shared}main/ep.metadata.config.json")), 1);
    assert_eq!(fetcher.total_fetches(), 3);
}

#[tokio::test]
async fn root_fields_share_one_registry_snapshot() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(REGISTRY, registry()));

    let data = run(
        &engine(&fetcher),
        r#"query Both($app: String = "auth") {
            all: mfes { key }
            one: mfe(key: $app) { name }
            other: mfe(key: "shell") { dependencies { key } }
        }"#,
    )
    .await;

    assert_eq!(
        data,
        json!({
            "all": [ { "key": "auth" }, { "key": "shell" } ],
            "one": { "name": "Authentication" },
            "other": { "dependencies": [ { "key": "auth" } ] }
        })
    );
    assert_eq!(fetcher.total_fetches(), 1);
}

#[tokio::test]
async fn variables_and_operation_name_select_the_operation() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(REGISTRY, registry()));
    let request = QueryRequest {
        operation_name: Some("ByKey".into()),
        ..QueryRequest::new(
            r#"query All { mfes { key } }
               query ByKey($key: String!) { mfe(key: $key) { key } }"#,
        )
    }
    .with_variable("key", "shell");

    let data = engine(&fetcher).execute(&request).await.unwrap();

    assert_eq!(data, json!({ "mfe": { "key": "shell" } }));
}

#[tokio::test]
async fn invalid_queries_issue_no_fetches() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(REGISTRY, registry()));
    let engine = engine(&fetcher);

    for query in [
        "{ mfes { key",
        "{ mfes { colour } }",
        "{ mfes { environments } }",
        "{ mfe { key } }",
        r#"{ mfe(key: "a", extra: "b") { key } }"#,
        "{ mfe(key: $undeclared) { key } }",
        "{ mfes { environments { live { builds { href } } } } }",
        "{ mfes { ...AppFields } }",
        r#"{ mfe(key: "a") { key } mfe(key: "b") { key } }"#,
    ] {
        let err = engine
            .execute(&QueryRequest::new(query))
            .await
            .expect_err(query);
        assert_eq!(err.category(), ErrorCategory::QueryFailure, "{query}: {err}");
    }
    assert_eq!(fetcher.total_fetches(), 0);
}

#[tokio::test]
async fn repeated_selections_resolve_as_one() {
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_json(REGISTRY, registry())
            .with_json(&builds_href("auth", "live"), json!(["main"])),
    );

    let data = run(
        &engine(&fetcher),
        r#"{ mfe(key: "auth") {
               environments { live { href } }
               environments { live { builds { name } } }
           } }"#,
    )
    .await;

    assert_eq!(
        data,
        json!({ "mfe": { "environments": { "live": {
            "href": env("auth", "live"),
            "builds": [ { "name": "main" } ]
        } } } })
    );
    assert_eq!(fetcher.fetch_count(&builds_href("auth", "live")), 1);
}

#[tokio::test]
async fn conflicting_selections_are_rejected_before_fetching() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(REGISTRY, registry()));

    let err = engine(&fetcher)
        .execute(&QueryRequest::new("{ mfes { label: key label: name } }"))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::QueryFailure);
    assert_eq!(fetcher.total_fetches(), 0);
}

#[tokio::test]
async fn results_follow_registry_and_selection_order() {
    let registry = json!({
        "shell": { "type": "MFE_APP", "name": "Shell",
                   "environments": { "live": { "href": env("shell", "live") } } },
        "auth": { "type": "MFE_APP", "name": "Authentication" }
    });
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_json(REGISTRY, registry)
            .with_json(&builds_href("shell", "live"), json!([])),
    );

    let data = run(
        &engine(&fetcher),
        "{ mfes { name key environments { live { builds { name } href } } } }",
    )
    .await;

    let apps = data["mfes"].as_array().unwrap();
    let keys: Vec<_> = apps.iter().map(|app| app["key"].as_str().unwrap()).collect();
    assert_eq!(keys, vec!["shell", "auth"]);

    let fields: Vec<_> = apps[0].as_object().unwrap().keys().cloned().collect();
    assert_eq!(fields, vec!["name", "key", "environments"]);
    let live: Vec<_> = apps[0]["environments"]["live"]
        .as_object()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    assert_eq!(live, vec!["builds", "href"]);
}

#[tokio::test]
async fn build_href_is_selectable_when_exposed() {
    let fetcher = Arc::new(
        StaticFetcher::new()
            .with_json(REGISTRY, registry())
            .with_json(&builds_href("auth", "live"), json!(["main"])),
    );
    let engine = engine_with(
        &fetcher,
        EngineOptions {
            expose_build_href: true,
        },
    );

    let data = run(&engine, r#"{ mfe(key: "auth") { environments { live { builds { href } } } } }"#).await;

    assert_eq!(
        data["mfe"]["environments"]["live"]["builds"],
        json!([ { "href": env("auth", "live") } ])
    );
}

#[tokio::test]
async fn unreachable_registry_fails_the_request() {
    let fetcher = Arc::new(StaticFetcher::new().with_status(REGISTRY, 500));

    let err = engine(&fetcher)
        .execute(&QueryRequest::new("{ mfes { key } }"))
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::EntryResolution(_)), "{err}");
    assert_eq!(err.category(), ErrorCategory::EntryResolutionFailure);
}

#[tokio::test]
async fn malformed_registry_fails_the_request() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(REGISTRY, json!(["not", "a", "map"])));

    let err = engine(&fetcher)
        .execute(&QueryRequest::new("{ mfes { key } }"))
        .await
        .unwrap_err();

    assert!(matches!(err, ResolveError::EntryResolution(_)), "{err}");
}

#[tokio::test]
async fn execution_can_run_on_a_spawned_task() {
    let fetcher = Arc::new(StaticFetcher::new().with_json(REGISTRY, registry()));
    let engine = engine(&fetcher);

    let data = tokio::spawn(async move { engine.execute(&QueryRequest::new("{ mfes { key } }")).await })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(data["mfes"].as_array().map(Vec::len), Some(2));
}
