//! JavaScript/TypeScript route extraction: regex-based (spec.md §4.5).

use crate::keywords::base_keywords;
use crate::ExtractedRoute;
use concord_common::types::RouteType;
use once_cell::sync::Lazy;
use regex::Regex;

static FUNCTION_DECL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)\s*\(([^)]*)\)").unwrap());
static ARROW_CONST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:export\s+)?const\s+(\w+)\s*=\s*(?:async\s*)?\(([^)]*)\)\s*=>").unwrap());
static FUNCTION_CONST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:export\s+)?const\s+(\w+)\s*=\s*(?:async\s+)?function\s*\(([^)]*)\)").unwrap());
static CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*(?:export\s+)?class\s+(\w+)[^{]*\{").unwrap());
static CLASS_METHOD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:static\s+)?(?:async\s+)?(?:get\s+|set\s+)?(\w+)\s*\(([^)]*)\)\s*\{").unwrap());

const RESERVED_WORDS: &[&str] = &["if", "for", "while", "switch", "catch", "function", "do", "else"];

fn line_of(source: &str, byte_offset: usize) -> i64 {
    source[..byte_offset].lines().count() as i64 + 1
}

/// Finds the byte range of a class body by counting braces from the `{`
/// the class declaration regex already matched.
fn class_body_span(source: &str, open_brace: usize) -> Option<(usize, usize)> {
    let bytes = source.as_bytes();
    let mut depth = 0i32;
    for (offset, &b) in bytes.iter().enumerate().skip(open_brace) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((open_brace + 1, offset));
                }
            }
            _ => {}
        }
    }
    None
}

pub fn extract(source: &str) -> Vec<ExtractedRoute> {
    let mut routes = Vec::new();

    for caps in FUNCTION_DECL_RE.captures_iter(source) {
        let name = caps[1].to_string();
        let params = caps[2].trim().to_string();
        routes.push(ExtractedRoute {
            route_type: RouteType::Function,
            signature: format!("{name}({params})"),
            line_number: line_of(source, caps.get(0).unwrap().start()),
            docstring: String::new(),
            keywords: base_keywords(&name),
            name,
        });
    }

    for caps in ARROW_CONST_RE.captures_iter(source) {
        let name = caps[1].to_string();
        let params = caps[2].trim().to_string();
        routes.push(ExtractedRoute {
            route_type: RouteType::Function,
            signature: format!("{name}({params})"),
            line_number: line_of(source, caps.get(0).unwrap().start()),
            docstring: String::new(),
            keywords: base_keywords(&name),
            name,
        });
    }

    for caps in FUNCTION_CONST_RE.captures_iter(source) {
        let name = caps[1].to_string();
        let params = caps[2].trim().to_string();
        routes.push(ExtractedRoute {
            route_type: RouteType::Function,
            signature: format!("{name}({params})"),
            line_number: line_of(source, caps.get(0).unwrap().start()),
            docstring: String::new(),
            keywords: base_keywords(&name),
            name,
        });
    }

    for caps in CLASS_RE.captures_iter(source) {
        let whole = caps.get(0).unwrap();
        let name = caps[1].to_string();
        routes.push(ExtractedRoute {
            route_type: RouteType::Class,
            signature: format!("class {name}"),
            line_number: line_of(source, whole.start()),
            docstring: String::new(),
            keywords: base_keywords(&name),
            name,
        });

        let open_brace = whole.end() - 1;
        if let Some((body_start, body_end)) = class_body_span(source, open_brace) {
            let body = &source[body_start..body_end];
            for method_caps in CLASS_METHOD_RE.captures_iter(body) {
                let method_name = method_caps[1].to_string();
                if RESERVED_WORDS.contains(&method_name.as_str()) {
                    continue;
                }
                let params = method_caps[2].trim().to_string();
                let method_whole = method_caps.get(0).unwrap();
                routes.push(ExtractedRoute {
                    route_type: RouteType::Method,
                    signature: format!("{method_name}({params})"),
                    line_number: line_of(source, body_start + method_whole.start()),
                    docstring: String::new(),
                    keywords: base_keywords(&method_name),
                    name: method_name,
                });
            }
        }
    }

    routes.sort_by_key(|r| r.line_number);
    routes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_function_declaration() {
        let routes = extract("export function handleRequest(req, res) {}\n");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "handleRequest");
        assert_eq!(routes[0].signature, "handleRequest(req, res)");
    }

    #[test]
    fn detects_arrow_and_function_expression_consts() {
        let source = "const add = (a, b) => a + b;\nconst mul = function(a, b) { return a * b; };\n";
        let routes = extract(source);
        let names: Vec<&str> = routes.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"add"));
        assert!(names.contains(&"mul"));
    }

    #[test]
    fn detects_class() {
        let routes = extract("export class UserController {}\n");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].route_type, RouteType::Class);
    }

    #[test]
    fn detects_class_methods_as_methods() {
        let source = "class UserController {\n  constructor(service) {\n    this.service = service;\n  }\n\n  async findOne(id) {\n    return this.service.find(id);\n  }\n}\n";
        let routes = extract(source);
        let ctor = routes.iter().find(|r| r.name == "constructor").unwrap();
        assert_eq!(ctor.route_type, RouteType::Method);
        let find_one = routes.iter().find(|r| r.name == "findOne").unwrap();
        assert_eq!(find_one.route_type, RouteType::Method);
        assert_eq!(find_one.signature, "findOne(id)");
    }

    #[test]
    fn top_level_function_inside_file_with_class_stays_a_function() {
        let source = "class Widget {}\n\nfunction standalone(a) {}\n";
        let routes = extract(source);
        let func = routes.iter().find(|r| r.name == "standalone").unwrap();
        assert_eq!(func.route_type, RouteType::Function);
    }
}
