//! Python route extraction: a tree-sitter AST pass, falling back to regex
//! when the source fails to parse cleanly (spec.md §4.5).

use crate::keywords::base_keywords;
use crate::ExtractedRoute;
use concord_common::types::RouteType;
use once_cell::sync::Lazy;
use tree_sitter::{Node, Parser};

const ENDPOINT_DECORATORS: &[&str] = &["route", "get", "post", "put", "delete", "patch"];
const HANDLER_DECORATORS: &[&str] = &["command", "event", "handler"];

static FALLBACK_DEF_RE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?m)^\s*(?:async\s+)?def\s+(\w+)\s*\(([^)]*)\)").unwrap());
static FALLBACK_CLASS_RE: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"(?m)^\s*class\s+(\w+)").unwrap());

pub fn extract(source: &str) -> Vec<ExtractedRoute> {
    let mut parser = Parser::new();
    if parser.set_language(&tree_sitter_python::LANGUAGE.into()).is_ok() {
        if let Some(tree) = parser.parse(source, None) {
            let root = tree.root_node();
            if !root.has_error() {
                return extract_ast(root, source);
            }
        }
    }
    extract_fallback(source)
}

fn extract_ast(root: Node, source: &str) -> Vec<ExtractedRoute> {
    let mut routes = Vec::new();
    walk(root, source, &mut routes, false);
    routes
}

/// `in_class` is true while walking directly inside a class body, so a
/// `function_definition` there is recorded as a method rather than a
/// bare function; it resets to false once we descend into a function's
/// own body, since a function nested inside a method is a local helper,
/// not a method of the class.
fn walk(node: Node, source: &str, routes: &mut Vec<ExtractedRoute>, in_class: bool) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "function_definition" => {
                if let Some(route) = function_route(child, source, in_class) {
                    routes.push(route);
                }
                walk(child, source, routes, false);
                continue;
            }
            "class_definition" => {
                if let Some(route) = class_route(child, source) {
                    routes.push(route);
                }
                walk(child, source, routes, true);
                continue;
            }
            "decorated_definition" => {
                decorated_definition(child, source, routes, in_class);
                continue;
            }
            _ => {}
        }
        walk(child, source, routes, in_class);
    }
}

fn decorated_definition(node: Node, source: &str, routes: &mut Vec<ExtractedRoute>, in_class: bool) {
    let mut decorator_names = Vec::new();
    let mut defined: Option<Node> = None;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "decorator" => {
                if let Some(name) = decorator_call_name(child, source) {
                    decorator_names.push(name);
                }
            }
            "function_definition" | "class_definition" => defined = Some(child),
            _ => {}
        }
    }

    let Some(defined) = defined else { return };
    let base = match defined.kind() {
        "function_definition" => function_route(defined, source, in_class),
        "class_definition" => class_route(defined, source),
        _ => None,
    };
    if let Some(mut route) = base {
        apply_decorators(&mut route, &decorator_names);
        routes.push(route);
    }
}

/// Resolves `Name`, `Attribute`, or `Call.func` decorator expressions to a
/// bare lowercase identifier (spec.md §4.5).
fn decorator_call_name(decorator: Node, source: &str) -> Option<String> {
    let mut cursor = decorator.walk();
    let expr = decorator.children(&mut cursor).find(|c| c.kind() != "@")?;
    let target = if expr.kind() == "call" { expr.child_by_field_name("function")? } else { expr };

    let name_node = if target.kind() == "attribute" {
        target.child_by_field_name("attribute")?
    } else {
        target
    };
    Some(text(name_node, source).to_lowercase())
}

fn apply_decorators(route: &mut ExtractedRoute, decorator_names: &[String]) {
    for name in decorator_names {
        if ENDPOINT_DECORATORS.contains(&name.as_str()) {
            route.route_type = RouteType::Endpoint;
            route.keywords.insert("api".to_string());
            route.keywords.insert(name.clone());
        } else if HANDLER_DECORATORS.contains(&name.as_str()) {
            route.route_type = RouteType::Handler;
        } else if name == "property" {
            route.route_type = RouteType::Property;
        }
    }
}

fn function_route(node: Node, source: &str, in_class: bool) -> Option<ExtractedRoute> {
    let name_node = node.child_by_field_name("name")?;
    let name = text(name_node, source).to_string();
    let params_node = node.child_by_field_name("parameters");
    let params = params_node.map(|p| signature_params(p, source)).unwrap_or_default();
    let signature = format!("{name}({params})");
    let docstring = function_docstring(node, source);

    Some(ExtractedRoute {
        route_type: if in_class { RouteType::Method } else { RouteType::Function },
        name: name.clone(),
        line_number: (node.start_position().row + 1) as i64,
        signature,
        docstring,
        keywords: base_keywords(&name),
    })
}

fn class_route(node: Node, source: &str) -> Option<ExtractedRoute> {
    let name_node = node.child_by_field_name("name")?;
    let name = text(name_node, source).to_string();
    let mut keywords = base_keywords(&name);

    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for child in superclasses.children(&mut cursor) {
            if child.kind() == "identifier" {
                keywords.insert(text(child, source).to_lowercase());
            }
        }
    }

    Some(ExtractedRoute {
        route_type: RouteType::Class,
        name: name.clone(),
        line_number: (node.start_position().row + 1) as i64,
        signature: format!("class {name}"),
        docstring: function_docstring(node, source),
        keywords,
    })
}

fn function_docstring(node: Node, source: &str) -> String {
    let Some(body) = node.child_by_field_name("body") else { return String::new() };
    let mut cursor = body.walk();
    for stmt in body.children(&mut cursor) {
        if stmt.kind() == "expression_statement" {
            if let Some(string_node) = stmt.named_child(0) {
                if string_node.kind() == "string" {
                    return strip_string_literal(text(string_node, source));
                }
            }
        }
        break;
    }
    String::new()
}

fn signature_params(params: Node, source: &str) -> String {
    let mut cursor = params.walk();
    params
        .children(&mut cursor)
        .filter(|c| !matches!(c.kind(), "(" | ")" | ","))
        .map(|c| text(c, source).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn strip_string_literal(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

fn text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn extract_fallback(source: &str) -> Vec<ExtractedRoute> {
    let mut routes = Vec::new();

    for caps in FALLBACK_DEF_RE.captures_iter(source) {
        let name = caps[1].to_string();
        let params = caps[2].trim().to_string();
        let line = source[..caps.get(0).unwrap().start()].lines().count() as i64 + 1;
        routes.push(ExtractedRoute {
            route_type: RouteType::Function,
            signature: format!("{name}({params})"),
            line_number: line,
            docstring: String::new(),
            keywords: base_keywords(&name),
            name,
        });
    }

    for caps in FALLBACK_CLASS_RE.captures_iter(source) {
        let name = caps[1].to_string();
        let line = source[..caps.get(0).unwrap().start()].lines().count() as i64 + 1;
        routes.push(ExtractedRoute {
            route_type: RouteType::Class,
            signature: format!("class {name}"),
            line_number: line,
            docstring: String::new(),
            keywords: base_keywords(&name),
            name,
        });
    }

    routes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_function_with_docstring() {
        let source = "def greet(name):\n    \"\"\"Say hello.\"\"\"\n    return name\n";
        let routes = extract(source);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "greet");
        assert_eq!(routes[0].route_type, RouteType::Function);
        assert_eq!(routes[0].signature, "greet(name)");
        assert_eq!(routes[0].docstring, "Say hello.");
    }

    #[test]
    fn decorator_marks_route_as_endpoint_with_api_keyword() {
        let source = "@app.get(\"/users\")\ndef list_users():\n    pass\n";
        let routes = extract(source);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].route_type, RouteType::Endpoint);
        assert!(routes[0].keywords.contains("api"));
        assert!(routes[0].keywords.contains("get"));
    }

    #[test]
    fn method_nested_in_class_is_not_a_bare_function() {
        let source = "class Widget:\n    def resize(self, factor):\n        pass\n";
        let routes = extract(source);
        let method = routes.iter().find(|r| r.name == "resize").unwrap();
        assert_eq!(method.route_type, RouteType::Method);
    }

    #[test]
    fn nested_function_inside_method_stays_a_function() {
        let source = "class Widget:\n    def resize(self):\n        def helper():\n            pass\n        helper()\n";
        let routes = extract(source);
        let helper = routes.iter().find(|r| r.name == "helper").unwrap();
        assert_eq!(helper.route_type, RouteType::Function);
    }

    #[test]
    fn property_decorator_marks_property() {
        let source = "class Widget:\n    @property\n    def size(self):\n        return 1\n";
        let routes = extract(source);
        let prop = routes.iter().find(|r| r.name == "size").unwrap();
        assert_eq!(prop.route_type, RouteType::Property);
    }

    #[test]
    fn class_picks_up_base_class_keywords() {
        let source = "class Handler(BaseHandler):\n    pass\n";
        let routes = extract(source);
        let class = routes.iter().find(|r| r.name == "Handler").unwrap();
        assert!(class.keywords.contains("basehandler"));
    }

    #[test]
    fn malformed_source_falls_back_to_regex() {
        let source = "def broken(:\n    pass\ndef ok(a, b):\n    pass\n";
        let routes = extract(source);
        assert!(routes.iter().any(|r| r.name == "ok"));
    }
}
