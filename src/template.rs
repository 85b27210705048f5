//! `@@`-prefixed include and variable templating for HTML sources.
//!
//! Two directives are recognised:
//!
//! ```text
//! @@include("partials/header.html")
//! @@include('partials/nav.html', {"active": "home"})
//! <title>@@name v@@version</title>
//! ```
//!
//! Include paths resolve against the directory of the file containing the
//! directive. The optional JSON object is merged over the current context for
//! the included file only. Variables walk the context with dots
//! (`@@page.title`); strings are inserted verbatim, any other JSON value is
//! inserted in its compact form. Unknown variables are left untouched, so a
//! stray `@@` in prose survives.
//!
//! When a dotted variable does not resolve in full, its longest resolvable
//! prefix is used and the rest is kept as text (`@@name.` at the end of a
//! sentence renders as `site.`).

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Maximum include nesting before the templater gives up.
pub const MAX_INCLUDE_DEPTH: usize = 32;

static INCLUDE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@@include\(\s*(?:"([^"]*)"|'([^']*)')\s*"#).expect("valid include regex")
});

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@@([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)*)").expect("valid variable regex")
});

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Bad @@include arguments in {file}: {message}")]
    Arguments { file: PathBuf, message: String },
    #[error("Include cycle: {0} includes itself")]
    Cycle(PathBuf),
    #[error("Includes nested deeper than {MAX_INCLUDE_DEPTH} levels at {0}")]
    TooDeep(PathBuf),
}

/// Source text for templating, or `None` for binary content (invalid UTF-8
/// or containing NUL bytes), which is copied instead.
pub fn as_text(bytes: &[u8]) -> Option<&str> {
    if bytes.contains(&0) {
        return None;
    }
    std::str::from_utf8(bytes).ok()
}

/// Render `source`, which was read from `file`.
pub fn render(source: &str, file: &Path, context: &Map<String, Value>) -> Result<String, TemplateError> {
    let mut stack = Vec::new();
    if let Ok(canonical) = file.canonicalize() {
        stack.push(canonical);
    }
    expand(source, file, context, &mut stack)
}

/// Read and render the file at `path`.
#[cfg(test)]
fn render_file(path: &Path, context: &Map<String, Value>) -> Result<String, TemplateError> {
    render_included(path, context, &mut Vec::new())
}

fn render_included(
    path: &Path,
    context: &Map<String, Value>,
    stack: &mut Vec<PathBuf>,
) -> Result<String, TemplateError> {
    let io_err = |source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let canonical = path.canonicalize().map_err(io_err)?;
    if stack.contains(&canonical) {
        return Err(TemplateError::Cycle(path.to_path_buf()));
    }
    if stack.len() >= MAX_INCLUDE_DEPTH {
        return Err(TemplateError::TooDeep(path.to_path_buf()));
    }
    let source = std::fs::read_to_string(path).map_err(io_err)?;

    stack.push(canonical);
    let rendered = expand(&source, path, context, stack);
    stack.pop();
    rendered
}

fn expand(
    source: &str,
    file: &Path,
    context: &Map<String, Value>,
    stack: &mut Vec<PathBuf>,
) -> Result<String, TemplateError> {
    let base = file.parent().unwrap_or(Path::new(""));
    let bad_args = |message: String| TemplateError::Arguments {
        file: file.to_path_buf(),
        message,
    };

    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(caps) = INCLUDE_START.captures(rest) {
        let Some(whole) = caps.get(0) else { break };
        out.push_str(&substitute(&rest[..whole.start()], context));

        let target = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        let mut tail = &rest[whole.end()..];

        let mut local = context.clone();
        if let Some(after_comma) = tail.strip_prefix(',') {
            let mut stream =
                serde_json::Deserializer::from_str(after_comma).into_iter::<Value>();
            match stream.next() {
                Some(Ok(Value::Object(overrides))) => local.extend(overrides),
                Some(Ok(other)) => {
                    return Err(bad_args(format!("expected a JSON object, got {other}")));
                }
                Some(Err(e)) => return Err(bad_args(e.to_string())),
                None => return Err(bad_args("missing context object".to_string())),
            }
            tail = &after_comma[stream.byte_offset()..];
        }

        let Some(after) = tail.trim_start().strip_prefix(')') else {
            return Err(bad_args(format!("unclosed @@include(\"{target}\"")));
        };

        out.push_str(&render_included(&base.join(target), &local, stack)?);
        rest = after;
    }

    out.push_str(&substitute(rest, context));
    Ok(out)
}

fn lookup<'a>(context: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    let (first, tail) = segments.split_first()?;
    tail.iter()
        .try_fold(context.get(*first)?, |value, key| value.as_object()?.get(*key))
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace `@@var` references in plain text (no include directives).
fn substitute(text: &str, context: &Map<String, Value>) -> String {
    VARIABLE
        .replace_all(text, |caps: &Captures| {
            let segments: Vec<&str> = caps[1].split('.').collect();
            for n in (1..=segments.len()).rev() {
                if let Some(value) = lookup(context, &segments[..n]) {
                    let mut rendered = display(value);
                    for segment in &segments[n..] {
                        rendered.push('.');
                        rendered.push_str(segment);
                    }
                    return rendered;
                }
            }
            caps[0].to_string()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn ctx(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn substitutes_known_variables() {
        let context = ctx(json!({"name": "site", "version": "1.0.0"}));
        assert_eq!(
            substitute("<title>@@name v@@version</title>", &context),
            "<title>site v1.0.0</title>"
        );
    }

    #[test]
    fn leaves_unknown_variables_untouched() {
        let context = ctx(json!({"name": "site"}));
        assert_eq!(
            substitute("mail me @@home or @@name", &context),
            "mail me @@home or site"
        );
    }

    #[test]
    fn dotted_lookup_and_prefix_fallback() {
        let context = ctx(json!({"page": {"title": "Home"}, "name": "site"}));
        assert_eq!(substitute("@@page.title", &context), "Home");
        assert_eq!(substitute("Welcome to @@name.", &context), "Welcome to site.");
        assert_eq!(substitute("@@name.html", &context), "site.html");
    }

    #[test]
    fn non_string_values_render_as_json() {
        let context = ctx(json!({"count": 3, "flag": true, "list": [1, 2]}));
        assert_eq!(substitute("@@count @@flag @@list", &context), "3 true [1,2]");
    }

    #[test]
    fn include_resolves_relative_to_including_file() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "partials/header.html", "<h1>@@name</h1>");
        write(
            tmp.path(),
            "blog/partials/aside.html",
            "<aside>blog</aside>",
        );
        let page = write(
            tmp.path(),
            "blog/post.html",
            r#"@@include("../partials/header.html")@@include('partials/aside.html')"#,
        );

        let out = render_file(&page, &ctx(json!({"name": "site"}))).unwrap();
        assert_eq!(out, "<h1>site</h1><aside>blog</aside>");
    }

    #[test]
    fn include_context_overrides_only_inside_include() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "nav.html", "[@@active|@@name]");
        let page = write(
            tmp.path(),
            "index.html",
            "@@include(\"nav.html\", {\"active\": \"home\", \"name\": \"inner\"}) @@name @@active",
        );

        let out = render_file(&page, &ctx(json!({"name": "outer"}))).unwrap();
        assert_eq!(out, "[home|inner] outer @@active");
    }

    #[test]
    fn multiline_context_object_is_accepted() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "card.html", "@@title");
        let page = write(
            tmp.path(),
            "index.html",
            "@@include('card.html', {\n  \"title\": \"A (b) c\"\n}\n)!",
        );
        assert_eq!(render_file(&page, &Map::new()).unwrap(), "A (b) c!");
    }

    #[test]
    fn nested_includes_render() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.html", "a(@@include(\"b.html\"))");
        write(tmp.path(), "b.html", "b(@@include(\"c.html\"))");
        write(tmp.path(), "c.html", "c");
        let page = write(tmp.path(), "index.html", "@@include(\"a.html\")");
        assert_eq!(render_file(&page, &Map::new()).unwrap(), "a(b(c))");
    }

    #[test]
    fn include_cycle_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.html", "@@include(\"b.html\")");
        write(tmp.path(), "b.html", "@@include(\"a.html\")");
        let page = tmp.path().join("a.html");
        assert!(matches!(
            render_file(&page, &Map::new()),
            Err(TemplateError::Cycle(_))
        ));
    }

    #[test]
    fn missing_include_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let page = write(tmp.path(), "index.html", "@@include(\"nope.html\")");
        assert!(matches!(
            render_file(&page, &Map::new()),
            Err(TemplateError::Io { .. })
        ));
    }

    #[test]
    fn malformed_arguments_are_reported() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "x.html", "x");
        let not_object = write(tmp.path(), "a.html", "@@include(\"x.html\", [1])");
        let unclosed = write(tmp.path(), "b.html", "@@include(\"x.html\" oops");
        assert!(matches!(
            render_file(&not_object, &Map::new()),
            Err(TemplateError::Arguments { .. })
        ));
        assert!(matches!(
            render_file(&unclosed, &Map::new()),
            Err(TemplateError::Arguments { .. })
        ));
    }

    #[test]
    fn render_from_memory_uses_file_location() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "partials/f.html", "footer");
        let page = write(tmp.path(), "index.html", "");
        let out = render("@@include(\"partials/f.html\")", &page, &Map::new()).unwrap();
        assert_eq!(out, "footer");
    }

    #[test]
    fn as_text_rejects_binary() {
        assert_eq!(as_text(b"<p>hi</p>"), Some("<p>hi</p>"));
        assert_eq!(as_text(b"\x89PNG\r\n\x1a\n\0\0"), None);
        assert_eq!(as_text(&[0xff, 0xfe, 0x41]), None);
    }
}
