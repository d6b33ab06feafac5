//! Dotted and slash-delimited target path addressing.

use log::error;

use crate::node::Node;

/// Splits a qualified variable name into `(target_path, leaf)`.
///
/// The separator is the first ':' or, failing that, the last '.'. One '/'
/// directly before the separator is dropped from the path, so `/:name`
/// addresses the host target. Plain names return `None`.
pub fn parse_path(name: &str) -> Option<(String, String)> {
    let separator = name.find(':').or_else(|| name.rfind('.'))?;
    let leaf = &name[separator + 1..];
    let path = &name[..separator];
    let path = path.strip_suffix('/').unwrap_or(path);
    Some((path.to_string(), leaf.to_string()))
}

/// Whether `name` is path-qualified.
pub fn is_path(name: &str) -> bool {
    parse_path(name).is_some()
}

/// Byte offset of the next '.' or '/' that splits a component; ".." is
/// consumed as a unit and never splits.
fn next_separator(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'.' if bytes.get(index + 1) == Some(&b'.') => index += 1,
            b'.' | b'/' => return Some(index),
            _ => {}
        }
        index += 1;
    }
    None
}

/// Walks `path` starting at `start`.
///
/// An empty path is `start` itself and a leading '/' restarts at the root.
/// Any unresolved component ends the walk with `None`; an empty component
/// inside the path is reported as malformed.
pub fn find_target(start: &Node, path: &str) -> Option<Node> {
    if path.is_empty() {
        return Some(start.clone());
    }

    let (mut node, mut rest) = match path.strip_prefix('/') {
        Some(rest) => (start.root(), rest),
        None => (start.clone(), path),
    };

    while !rest.is_empty() {
        let (component, next) = match next_separator(rest) {
            Some(0) => {
                error!("invalid path '{path}'");
                return None;
            }
            Some(index) => (&rest[..index], &rest[index + 1..]),
            None => (rest, ""),
        };
        node = node.get_relative_target(component)?;
        rest = next;
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qualified_names() {
        assert_eq!(parse_path("a/b:c"), Some(("a/b".into(), "c".into())));
        assert_eq!(parse_path("a.b.c"), Some(("a.b".into(), "c".into())));
        assert_eq!(parse_path("/a/:c"), Some(("/a".into(), "c".into())));
        assert_eq!(parse_path("/:c"), Some(("".into(), "c".into())));
        assert_eq!(parse_path("//:c"), Some(("/".into(), "c".into())));
        assert_eq!(parse_path("a:b.c"), Some(("a".into(), "b.c".into())));
        assert_eq!(parse_path("plain"), None);
        assert!(!is_path("plain"));
    }

    fn tree() -> (Node, Node, Node) {
        let root = Node::new("_level0");
        let x = Node::new("x");
        let y = Node::new("y");
        root.add_child(x.clone());
        x.add_child(y.clone());
        (root, x, y)
    }

    #[test]
    fn absolute_paths_start_at_root() {
        let (root, x, y) = tree();
        assert_eq!(find_target(&y, "/x/y"), Some(y.clone()));
        assert_eq!(find_target(&x, "/x"), Some(x.clone()));
        assert_eq!(find_target(&y, "/"), Some(root));
    }

    #[test]
    fn relative_paths() {
        let (root, x, y) = tree();
        assert_eq!(find_target(&y, "../y"), Some(y.clone()));
        assert_eq!(find_target(&x, "../x"), Some(x.clone()));
        assert_eq!(find_target(&root, "x.y"), Some(y.clone()));
        assert_eq!(find_target(&y, "_level0.x"), Some(x.clone()));
        assert_eq!(find_target(&y, ""), Some(y.clone()));
        assert_eq!(find_target(&root, "x/"), Some(x));
    }

    #[test]
    fn unresolved_or_malformed_paths() {
        let (root, _x, _y) = tree();
        assert_eq!(find_target(&root, "x/missing"), None);
        assert_eq!(find_target(&root, "x//y"), None);
        assert_eq!(find_target(&root, "missing.y"), None);
    }
}
