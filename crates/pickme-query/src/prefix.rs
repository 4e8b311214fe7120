//! Prefix parsing and resolution.

use pickme_core::{Config, Env};

/// A parsed `@`-prefix, or none if the raw query carried no recognized
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    /// `@name:rest`, a configured namespace.
    Namespace { name: String, rest: String },
    /// `@/relpath:rest` or `@./relpath:rest`, relative to the project root.
    Folder { relpath: String, rest: String },
    /// `@pattern` where `pattern` contains `*` or `?`.
    Glob { pattern: String },
    /// No recognized prefix; the whole input is the search query.
    None,
}

/// What a resolved prefix narrows the search to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedScope {
    pub roots: Vec<String>,
    pub patterns: Vec<String>,
}

/// Context needed to resolve a relative prefix.
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub project_root: Option<String>,
    pub env: Env,
}

/// Parse a raw query for an `@`-prefix. `@@rest` is an
/// escape hatch: it is never treated as a prefix, just a literal `@rest`
/// search. Callers should check for that case with [`strip_escaped_at`]
/// before calling this.
pub fn parse_prefix(raw: &str) -> (Prefix, &str) {
    let Some(body) = raw.strip_prefix('@') else {
        return (Prefix::None, raw);
    };
    if let Some(rest) = body.strip_prefix('@') {
        // handled by caller via strip_escaped_at; treat as no prefix here
        return (Prefix::None, rest);
    }

    if let Some(rest) = body.strip_prefix('/').or_else(|| body.strip_prefix("./")) {
        if let Some(colon) = rest.find(':') {
            let relpath = rest[..colon].to_string();
            let query_rest = rest[colon + 1..].to_string();
            return (
                Prefix::Folder {
                    relpath,
                    rest: query_rest,
                },
                "",
            );
        }
        return (
            Prefix::Folder {
                relpath: rest.to_string(),
                rest: String::new(),
            },
            "",
        );
    }

    if let Some(colon) = body.find(':') {
        let name = body[..colon].to_string();
        let rest = body[colon + 1..].to_string();
        return (Prefix::Namespace { name, rest }, "");
    }

    if body.contains('*') || body.contains('?') {
        return (
            Prefix::Glob {
                pattern: body.to_string(),
            },
            "",
        );
    }

    if body.starts_with('~') {
        // top-level `@~pattern` forces fuzzy; strip the `@` and let
        // `strip_fuzzy_sigil` strip the `~` downstream.
        return (Prefix::None, body);
    }

    (Prefix::None, raw)
}

/// `@@rest` escapes to a literal search for `@rest` with no prefix
/// parsing at all.
pub fn strip_escaped_at(raw: &str) -> Option<&str> {
    raw.strip_prefix("@@")
}

/// Resolve a parsed prefix into roots/patterns.
/// Unknown namespaces fail open to `projectRoot` with no pattern.
pub fn resolve(prefix: &Prefix, ctx: &ResolveContext, config: &Config) -> ResolvedScope {
    match prefix {
        Prefix::Namespace { name, .. } => match config.namespaces.get(name) {
            Some(value) => {
                let roots = value
                    .as_roots()
                    .into_iter()
                    .map(|r| ctx.env.expand_tilde(&r).to_string_lossy().into_owned())
                    .collect();
                ResolvedScope {
                    roots,
                    patterns: Vec::new(),
                }
            }
            None => ResolvedScope {
                roots: ctx.project_root.iter().cloned().collect(),
                patterns: Vec::new(),
            },
        },
        Prefix::Folder { relpath, .. } => {
            let root = match &ctx.project_root {
                Some(project_root) => join_relpath(project_root, relpath),
                None => relpath.clone(),
            };
            ResolvedScope {
                roots: vec![root],
                patterns: Vec::new(),
            }
        }
        Prefix::Glob { pattern } => ResolvedScope {
            roots: ctx.project_root.iter().cloned().collect(),
            patterns: vec![pattern.clone()],
        },
        Prefix::None => ResolvedScope::default(),
    }
}

fn join_relpath(root: &str, relpath: &str) -> String {
    let root = root.trim_end_matches('/');
    let relpath = relpath.trim_start_matches('/');
    if relpath.is_empty() {
        root.to_string()
    } else {
        format!("{root}/{relpath}")
    }
}

/// Does the search query, after any prefix stripping, force fuzzy mode?
/// (leading `~`, or a top-level `@~...` handled upstream). Returns the
/// stripped query and whether fuzzy was forced.
pub fn strip_fuzzy_sigil(query: &str) -> (String, bool) {
    match query.strip_prefix('~') {
        Some(rest) => (rest.to_string(), true),
        None => (query.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ResolveContext {
        ResolveContext {
            project_root: Some("/p".to_string()),
            env: Env::default(),
        }
    }

    #[test]
    fn test_escaped_at() {
        assert_eq!(strip_escaped_at("@@foo"), Some("foo"));
        assert_eq!(strip_escaped_at("@foo"), None);
    }

    #[test]
    fn test_namespace_prefix() {
        let (prefix, _) = parse_prefix("@work:button");
        assert_eq!(
            prefix,
            Prefix::Namespace {
                name: "work".to_string(),
                rest: "button".to_string()
            }
        );
    }

    #[test]
    fn test_folder_prefix() {
        let (prefix, _) = parse_prefix("@/src/components:Button");
        assert_eq!(
            prefix,
            Prefix::Folder {
                relpath: "src/components".to_string(),
                rest: "Button".to_string()
            }
        );
    }

    #[test]
    fn test_glob_prefix() {
        let (prefix, _) = parse_prefix("@*.ts");
        assert_eq!(
            prefix,
            Prefix::Glob {
                pattern: "*.ts".to_string()
            }
        );
    }

    #[test]
    fn test_top_level_fuzzy_prefix() {
        let (prefix, remainder) = parse_prefix("@~fbtsx");
        assert_eq!(prefix, Prefix::None);
        let (q, fuzzy) = strip_fuzzy_sigil(remainder);
        assert_eq!(q, "fbtsx");
        assert!(fuzzy);
    }

    #[test]
    fn test_no_prefix() {
        let (prefix, rest) = parse_prefix("Button.tsx");
        assert_eq!(prefix, Prefix::None);
        assert_eq!(rest, "Button.tsx");
    }

    #[test]
    fn test_unknown_namespace_falls_back_to_project_root() {
        let config = Config::default();
        let prefix = Prefix::Namespace {
            name: "ghost".to_string(),
            rest: String::new(),
        };
        let scope = resolve(&prefix, &ctx(), &config);
        assert_eq!(scope.roots, vec!["/p".to_string()]);
        assert!(scope.patterns.is_empty());
    }

    #[test]
    fn test_fuzzy_sigil_stripped() {
        let (q, fuzzy) = strip_fuzzy_sigil("~fbtsx");
        assert_eq!(q, "fbtsx");
        assert!(fuzzy);
    }

    #[test]
    fn test_no_fuzzy_sigil() {
        let (q, fuzzy) = strip_fuzzy_sigil("fbtsx");
        assert_eq!(q, "fbtsx");
        assert!(!fuzzy);
    }

    #[test]
    fn test_folder_resolves_against_project_root() {
        let prefix = Prefix::Folder {
            relpath: "src/utils".to_string(),
            rest: String::new(),
        };
        let config = Config::default();
        let scope = resolve(&prefix, &ctx(), &config);
        assert_eq!(scope.roots, vec!["/p/src/utils".to_string()]);
    }

    #[test]
    fn test_namespace_many_roots() {
        let mut config = Config::default();
        config.namespaces.insert(
            "personal".to_string(),
            pickme_core::config::NamespaceValue::Many(vec!["/a".to_string(), "/b".to_string()]),
        );
        let prefix = Prefix::Namespace {
            name: "personal".to_string(),
            rest: String::new(),
        };
        let scope = resolve(&prefix, &ctx(), &config);
        assert_eq!(scope.roots, vec!["/a".to_string(), "/b".to_string()]);
    }
}
