use crate::StateStore;
use concord_common::error::{AgentError, Result};
use concord_common::types::{new_id, now_iso, CodeRoute, RouteType};
use sqlx::Row;
use std::collections::BTreeSet;

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreUnavailable(e.to_string())
}

fn route_type_str(t: RouteType) -> &'static str {
    match t {
        RouteType::Function => "function",
        RouteType::Class => "class",
        RouteType::Method => "method",
        RouteType::Endpoint => "endpoint",
        RouteType::Handler => "handler",
        RouteType::Struct => "struct",
        RouteType::Interface => "interface",
        RouteType::Property => "property",
    }
}

fn route_type_from_str(s: &str) -> Result<RouteType> {
    match s {
        "function" => Ok(RouteType::Function),
        "class" => Ok(RouteType::Class),
        "method" => Ok(RouteType::Method),
        "endpoint" => Ok(RouteType::Endpoint),
        "handler" => Ok(RouteType::Handler),
        "struct" => Ok(RouteType::Struct),
        "interface" => Ok(RouteType::Interface),
        "property" => Ok(RouteType::Property),
        other => Err(AgentError::CorruptState(format!("unknown route type: {other}"))),
    }
}

fn row_to_route(row: &sqlx::sqlite::SqliteRow) -> Result<CodeRoute> {
    let keywords_raw: String = row.try_get("keywords").map_err(store_err)?;
    let keywords: BTreeSet<String> = serde_json::from_str(&keywords_raw).unwrap_or_default();
    Ok(CodeRoute {
        id: row.try_get("id").map_err(store_err)?,
        file_path: row.try_get("file_path").map_err(store_err)?,
        route_type: route_type_from_str(&row.try_get::<String, _>("route_type").map_err(store_err)?)?,
        name: row.try_get("name").map_err(store_err)?,
        line_number: row.try_get("line_number").map_err(store_err)?,
        signature: row.try_get("signature").map_err(store_err)?,
        docstring: row.try_get("docstring").map_err(store_err)?,
        keywords,
        indexed_at: row.try_get("indexed_at").map_err(store_err)?,
    })
}

/// One route pending insertion; the id and `indexed_at` are assigned by the
/// store so callers don't need to invent them (spec.md §4.5).
pub struct NewCodeRoute {
    pub file_path: String,
    pub route_type: RouteType,
    pub name: String,
    pub line_number: i64,
    pub signature: String,
    pub docstring: String,
    pub keywords: BTreeSet<String>,
}

impl StateStore {
    /// Clears then re-inserts; callers replace a file's routes as a unit
    /// (spec.md §4.2/§4.5 atomic-per-file-replacement pattern).
    pub async fn clear_routes_for_file(&self, file_path: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM code_routes WHERE file_path = ?")
            .bind(file_path)
            .execute(self.pool())
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    pub async fn add_code_route(&self, route: NewCodeRoute) -> Result<String> {
        let id = new_id();
        let keywords_json = serde_json::to_string(&route.keywords)?;
        sqlx::query(
            "INSERT INTO code_routes (id, file_path, route_type, name, line_number, signature, docstring, keywords, indexed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&route.file_path)
        .bind(route_type_str(route.route_type))
        .bind(&route.name)
        .bind(route.line_number)
        .bind(&route.signature)
        .bind(&route.docstring)
        .bind(&keywords_json)
        .bind(now_iso())
        .execute(self.pool())
        .await
        .map_err(store_err)?;
        Ok(id)
    }

    pub async fn get_routes_for_file(&self, file_path: &str) -> Result<Vec<CodeRoute>> {
        let rows = sqlx::query("SELECT * FROM code_routes WHERE file_path = ? ORDER BY line_number ASC")
            .bind(file_path)
            .fetch_all(self.pool())
            .await
            .map_err(store_err)?;
        rows.iter().map(row_to_route).collect()
    }

    /// Substring match against name, keywords and docstring, newest-indexed
    /// first (spec.md §4.2/§4.5).
    pub async fn search_code_routes(&self, query: &str, route_type: Option<RouteType>, limit: i64) -> Result<Vec<CodeRoute>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let mut sql = String::from(
            "SELECT * FROM code_routes WHERE (lower(name) LIKE ? OR lower(keywords) LIKE ? OR lower(docstring) LIKE ?)",
        );
        if route_type.is_some() {
            sql.push_str(" AND route_type = ?");
        }
        sql.push_str(" ORDER BY indexed_at DESC LIMIT ?");

        let mut q = sqlx::query(&sql).bind(&pattern).bind(&pattern).bind(&pattern);
        if let Some(rt) = route_type {
            q = q.bind(route_type_str(rt));
        }
        q = q.bind(limit);
        let rows = q.fetch_all(self.pool()).await.map_err(store_err)?;
        rows.iter().map(row_to_route).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reindexing_a_file_replaces_its_routes_as_a_unit() {
        let store = StateStore::connect_in_memory().await.unwrap();
        store
            .add_code_route(NewCodeRoute {
                file_path: "/tmp/a.py".into(),
                route_type: RouteType::Function,
                name: "old_fn".into(),
                line_number: 1,
                signature: "old_fn()".into(),
                docstring: String::new(),
                keywords: ["old_fn".to_string()].into_iter().collect(),
            })
            .await
            .unwrap();

        store.clear_routes_for_file("/tmp/a.py").await.unwrap();
        store
            .add_code_route(NewCodeRoute {
                file_path: "/tmp/a.py".into(),
                route_type: RouteType::Function,
                name: "new_fn".into(),
                line_number: 2,
                signature: "new_fn()".into(),
                docstring: String::new(),
                keywords: ["new_fn".to_string()].into_iter().collect(),
            })
            .await
            .unwrap();

        let routes = store.get_routes_for_file("/tmp/a.py").await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "new_fn");
    }

    #[tokio::test]
    async fn search_matches_name_and_keywords() {
        let store = StateStore::connect_in_memory().await.unwrap();
        store
            .add_code_route(NewCodeRoute {
                file_path: "/tmp/a.py".into(),
                route_type: RouteType::Endpoint,
                name: "get_users".into(),
                line_number: 1,
                signature: "get_users()".into(),
                docstring: String::new(),
                keywords: ["api".to_string(), "users".to_string()].into_iter().collect(),
            })
            .await
            .unwrap();

        let found = store.search_code_routes("users", None, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        let found_by_type = store.search_code_routes("get", Some(RouteType::Endpoint), 10).await.unwrap();
        assert_eq!(found_by_type.len(), 1);
        let none = store.search_code_routes("get", Some(RouteType::Struct), 10).await.unwrap();
        assert!(none.is_empty());
    }
}
