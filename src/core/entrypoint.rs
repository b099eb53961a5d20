/*!
 * Entrypoint discovery
 *
 * Only top-level files of the walked set are candidates. Discovery never
 * guesses: more than one equally good candidate is an error.
 */

use regex::Regex;
use std::sync::LazyLock;

use super::app_config::EntrypointPolicy;
use super::walker::FileSet;
use crate::error::{Result, RsconnectError};

/// Module names tried in order for Python content
const PYTHON_CANDIDATES: [&str; 4] = ["app", "application", "main", "api"];

/// A resolved entrypoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entrypoint {
    /// `module` or `module:object`
    Module(String),
    /// Path of a document in the bundle
    Document(String),
}

impl Entrypoint {
    pub fn as_str(&self) -> &str {
        match self {
            Entrypoint::Module(s) | Entrypoint::Document(s) => s,
        }
    }
}

/// Resolve the entrypoint for `policy`, honouring an explicit choice
pub fn discover_entrypoint(
    files: &FileSet,
    policy: EntrypointPolicy,
    explicit: Option<&str>,
) -> Result<Option<Entrypoint>> {
    if let Some(explicit) = explicit {
        return resolve_explicit(policy, explicit).map(Some);
    }

    let top_level: Vec<&str> = files.paths().filter(|p| !p.contains('/')).collect();
    match policy {
        EntrypointPolicy::PythonModule => discover_python(&top_level).map(Some),
        EntrypointPolicy::Html => discover_html(&top_level).map(Some),
        EntrypointPolicy::Notebook => {
            sole_candidate(&top_level, "notebooks", |p| p.ends_with(".ipynb"))
                .map(|p| Some(Entrypoint::Document(p)))
        }
        EntrypointPolicy::None => Ok(None),
    }
}

fn resolve_explicit(policy: EntrypointPolicy, explicit: &str) -> Result<Entrypoint> {
    match policy {
        EntrypointPolicy::PythonModule => {
            validate_module_entrypoint(explicit)?;
            Ok(Entrypoint::Module(explicit.to_string()))
        }
        _ => Ok(Entrypoint::Document(explicit.replace('\\', "/"))),
    }
}

/// Accept `module` or `module:object`
pub fn validate_module_entrypoint(entrypoint: &str) -> Result<()> {
    let parts: Vec<&str> = entrypoint.split(':').collect();
    let valid = match parts.as_slice() {
        [module] => !module.is_empty(),
        [module, object] => !module.is_empty() && !object.is_empty(),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(RsconnectError::ManifestValidation(format!(
            "entrypoint '{}' is not in module:object format",
            entrypoint
        )))
    }
}

fn discover_python(top_level: &[&str]) -> Result<Entrypoint> {
    let py_files: Vec<&str> = top_level
        .iter()
        .copied()
        .filter(|p| p.ends_with(".py"))
        .collect();

    for candidate in PYTHON_CANDIDATES {
        let filename = format!("{}.py", candidate);
        if py_files.contains(&filename.as_str()) {
            return Ok(Entrypoint::Module(candidate.to_string()));
        }
    }

    if let [only] = py_files.as_slice() {
        return Ok(Entrypoint::Module(module_name(only)));
    }

    let conventional: Vec<&str> = py_files
        .iter()
        .copied()
        .filter(|p| app_name_pattern().is_match(p))
        .collect();
    if let [only] = conventional.as_slice() {
        return Ok(Entrypoint::Module(module_name(only)));
    }

    let candidates = if conventional.is_empty() {
        py_files
    } else {
        conventional
    };
    Err(RsconnectError::AmbiguousEntrypoint {
        expected: "Python files".to_string(),
        candidates: candidates.iter().map(|s| s.to_string()).collect(),
    })
}

fn discover_html(top_level: &[&str]) -> Result<Entrypoint> {
    if top_level.contains(&"index.html") {
        return Ok(Entrypoint::Document("index.html".to_string()));
    }
    sole_candidate(top_level, "HTML files", |p| {
        p.ends_with(".html") || p.ends_with(".htm")
    })
    .map(Entrypoint::Document)
}

fn sole_candidate<F>(top_level: &[&str], expected: &str, accept: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    let candidates: Vec<&str> = top_level.iter().copied().filter(|p| accept(p)).collect();
    match candidates.as_slice() {
        [only] => Ok(only.to_string()),
        _ => Err(RsconnectError::AmbiguousEntrypoint {
            expected: expected.to_string(),
            candidates: candidates.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

fn module_name(filename: &str) -> String {
    filename.trim_end_matches(".py").to_string()
}

/// `app-foo.py`, `app_foo.py`, `foo-app.py`, `foo_app.py`
fn app_name_pattern() -> &'static Regex {
    static PATTERN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(app[-_].+|.+[-_]app)\.py$").unwrap());
    &PATTERN
}
