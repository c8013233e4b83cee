//! Go route extraction: regex-based (spec.md §4.5).

use crate::keywords::base_keywords;
use crate::ExtractedRoute;
use concord_common::types::RouteType;
use once_cell::sync::Lazy;
use regex::Regex;

static METHOD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^func\s+\(([^)]*)\)\s+(\w+)\s*\(([^)]*)\)").unwrap());
static FUNC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^func\s+(\w+)\s*\(([^)]*)\)").unwrap());
static TYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^type\s+(\w+)\s+(struct|interface)\b").unwrap());

fn line_of(source: &str, byte_offset: usize) -> i64 {
    source[..byte_offset].lines().count() as i64 + 1
}

fn is_handler(name: &str, full_match: &str) -> bool {
    name.to_lowercase().contains("handler") || full_match.to_lowercase().contains("handler")
}

pub fn extract(source: &str) -> Vec<ExtractedRoute> {
    let mut routes = Vec::new();
    let mut method_spans = Vec::new();

    for caps in METHOD_RE.captures_iter(source) {
        let whole = caps.get(0).unwrap();
        method_spans.push((whole.start(), whole.end()));
        let recv = caps[1].trim().to_string();
        let name = caps[2].to_string();
        let params = caps[3].trim().to_string();
        let route_type = if is_handler(&name, whole.as_str()) { RouteType::Handler } else { RouteType::Method };
        routes.push(ExtractedRoute {
            route_type,
            signature: format!("func ({recv}) {name}({params})"),
            line_number: line_of(source, whole.start()),
            docstring: String::new(),
            keywords: base_keywords(&name),
            name,
        });
    }

    for caps in FUNC_RE.captures_iter(source) {
        let whole = caps.get(0).unwrap();
        if method_spans.iter().any(|(s, e)| whole.start() >= *s && whole.start() < *e) {
            continue;
        }
        let name = caps[1].to_string();
        let params = caps[2].trim().to_string();
        let route_type = if is_handler(&name, whole.as_str()) { RouteType::Handler } else { RouteType::Function };
        routes.push(ExtractedRoute {
            route_type,
            signature: format!("func {name}({params})"),
            line_number: line_of(source, whole.start()),
            docstring: String::new(),
            keywords: base_keywords(&name),
            name,
        });
    }

    for caps in TYPE_RE.captures_iter(source) {
        let name = caps[1].to_string();
        let route_type = if &caps[2] == "struct" { RouteType::Struct } else { RouteType::Interface };
        routes.push(ExtractedRoute {
            route_type,
            signature: format!("type {name} {}", &caps[2]),
            line_number: line_of(source, caps.get(0).unwrap().start()),
            docstring: String::new(),
            keywords: base_keywords(&name),
            name,
        });
    }

    routes.sort_by_key(|r| r.line_number);
    routes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_method_with_receiver() {
        let routes = extract("func (s *Server) Start(port int) {}\n");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "Start");
        assert_eq!(routes[0].signature, "func (s *Server) Start(port int)");
        assert_eq!(routes[0].route_type, RouteType::Method);
    }

    #[test]
    fn handler_name_marks_route_type_handler() {
        let routes = extract("func UserHandler(w http.ResponseWriter, r *http.Request) {}\n");
        assert_eq!(routes[0].route_type, RouteType::Handler);
    }

    #[test]
    fn detects_struct_and_interface() {
        let source = "type User struct {\n\tName string\n}\n\ntype Storer interface {\n\tSave() error\n}\n";
        let routes = extract(source);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].route_type, RouteType::Struct);
        assert_eq!(routes[1].route_type, RouteType::Interface);
    }

    #[test]
    fn plain_function_is_not_duplicated_as_method() {
        let source = "func Plain(a int) int { return a }\n";
        let routes = extract(source);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].route_type, RouteType::Function);
    }
}
