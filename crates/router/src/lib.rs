//! Code route extraction and search (spec.md §4.5).
//!
//! Scans indexed files for discoverable symbols — functions, classes,
//! endpoints, handlers, structs, interfaces — and persists them through
//! `concord-store`'s code-route tables.

mod go;
mod js_ts;
mod keywords;
mod python;

use concord_common::error::Result;
use concord_common::types::RouteType;
use concord_store::{CodeRoute, NewCodeRoute, StateStore};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

/// One route found in a file, before the file path is known to the
/// extractor (attached by `build_routing_system`).
#[derive(Debug, Clone)]
pub struct ExtractedRoute {
    pub route_type: RouteType,
    pub name: String,
    pub line_number: i64,
    pub signature: String,
    pub docstring: String,
    pub keywords: BTreeSet<String>,
}

/// Extensions eligible for routing (spec.md §4.5). `java` is recognised by
/// the file index but has no extraction rule in the spec, so it is listed
/// here only to be explicitly skipped rather than silently matched by
/// one of the other extractors.
const ROUTABLE_EXTENSIONS: &[&str] = &["py", "js", "ts", "go", "java"];

fn extract_for_extension(extension: &str, source: &str) -> Option<Vec<ExtractedRoute>> {
    match extension {
        "py" => Some(python::extract(source)),
        "js" | "ts" => Some(js_ts::extract(source)),
        "go" => Some(go::extract(source)),
        _ => None,
    }
}

fn has_extractor(extension: &str) -> bool {
    matches!(extension, "py" | "js" | "ts" | "go")
}

/// Parses every indexed file with a routable extension and replaces its
/// routes as a unit: clear then re-insert, so repeated runs are idempotent
/// (spec.md §4.5).
pub async fn build_routing_system(store: &StateStore) -> Result<usize> {
    let files = store.search_file_index(None, None, None, i64::MAX).await?;
    let mut indexed = 0usize;

    for file in files {
        if !ROUTABLE_EXTENSIONS.contains(&file.extension.as_str()) || !has_extractor(&file.extension) {
            continue;
        }

        let source = match tokio::fs::read_to_string(&file.path).await {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %file.path, error = %e, "skipping unreadable file during routing");
                continue;
            }
        };

        let Some(routes) = extract_for_extension(&file.extension, &source) else { continue };

        store.clear_routes_for_file(&file.path).await?;
        for route in routes {
            store
                .add_code_route(NewCodeRoute {
                    file_path: file.path.clone(),
                    route_type: route.route_type,
                    name: route.name,
                    line_number: route.line_number,
                    signature: route.signature,
                    docstring: route.docstring,
                    keywords: route.keywords,
                })
                .await?;
        }
        indexed += 1;
    }

    info!(files = indexed, "rebuilt code routing index");
    Ok(indexed)
}

/// Indexes a single file's routes without touching the rest of the index
/// (used by the librarian when a file changes after the initial scan).
pub async fn index_file(store: &StateStore, path: &Path, extension: &str) -> Result<usize> {
    if !has_extractor(extension) {
        return Ok(0);
    }
    let source = tokio::fs::read_to_string(path).await?;
    let routes = extract_for_extension(extension, &source).unwrap_or_default();
    let path_str = path.to_string_lossy().to_string();

    store.clear_routes_for_file(&path_str).await?;
    let count = routes.len();
    for route in routes {
        store
            .add_code_route(NewCodeRoute {
                file_path: path_str.clone(),
                route_type: route.route_type,
                name: route.name,
                line_number: route.line_number,
                signature: route.signature,
                docstring: route.docstring,
                keywords: route.keywords,
            })
            .await?;
    }
    Ok(count)
}

/// Delegates to the store, newest-indexed-first up to `limit` (spec.md §4.5).
pub async fn search_routes(store: &StateStore, query: &str, route_type: Option<RouteType>, limit: i64) -> Result<Vec<CodeRoute>> {
    store.search_code_routes(query, route_type, limit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[tokio::test]
    async fn build_routing_system_indexes_python_and_skips_non_routable_extensions() {
        let store = StateStore::connect_in_memory().await.unwrap();
        let dir = tempdir().unwrap();

        let py_path = dir.path().join("service.py");
        let mut f = std::fs::File::create(&py_path).unwrap();
        writeln!(f, "def handle_get_users():\n    pass\n").unwrap();

        let txt_path = dir.path().join("notes.txt");
        std::fs::write(&txt_path, "just notes").unwrap();

        store
            .add_file_to_index(py_path.to_str().unwrap(), "py", 10, "2026-01-01T00:00:00Z", None, &BTreeSet::new())
            .await
            .unwrap();
        store
            .add_file_to_index(txt_path.to_str().unwrap(), "txt", 10, "2026-01-01T00:00:00Z", None, &BTreeSet::new())
            .await
            .unwrap();

        let indexed = build_routing_system(&store).await.unwrap();
        assert_eq!(indexed, 1);

        let routes = store.get_routes_for_file(py_path.to_str().unwrap()).await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "handle_get_users");
    }

    #[tokio::test]
    async fn rerunning_build_routing_system_is_idempotent() {
        let store = StateStore::connect_in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        let py_path = dir.path().join("a.py");
        std::fs::write(&py_path, "def f():\n    pass\n").unwrap();
        store
            .add_file_to_index(py_path.to_str().unwrap(), "py", 10, "2026-01-01T00:00:00Z", None, &BTreeSet::new())
            .await
            .unwrap();

        build_routing_system(&store).await.unwrap();
        build_routing_system(&store).await.unwrap();

        let routes = store.get_routes_for_file(py_path.to_str().unwrap()).await.unwrap();
        assert_eq!(routes.len(), 1);
    }

    #[tokio::test]
    async fn search_routes_delegates_to_store() {
        let store = StateStore::connect_in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        let py_path = dir.path().join("api.py");
        std::fs::write(&py_path, "@app.get(\"/x\")\ndef list_items():\n    pass\n").unwrap();
        store
            .add_file_to_index(py_path.to_str().unwrap(), "py", 10, "2026-01-01T00:00:00Z", None, &BTreeSet::new())
            .await
            .unwrap();
        build_routing_system(&store).await.unwrap();

        let found = search_routes(&store, "list", Some(RouteType::Endpoint), 10).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
