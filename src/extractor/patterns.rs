//! Pattern catalogue for heuristic extraction

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Extensions the extractor and gap detector consider
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "java", "kt", "rb", "swift", "c",
    "h", "cpp", "hpp", "cs", "php", "vue", "svelte", "md", "json", "toml", "yaml", "yml",
];

/// Build output, dependency and VCS directories that are never scanned
pub const IGNORED_DIRS: &[&str] = &[
    "node_modules", "target", "dist", "build", "out", ".git", ".hg", ".svn", "vendor",
    "__pycache__", ".next", ".nuxt", ".venv", "venv", "coverage", ".idea", ".vscode", ".cache",
];

/// Conventional source directories looked for under a project root
pub const CONVENTIONAL_DIRS: &[&str] = &[
    "src", "lib", "app", "apps", "packages", "crates", "components", "pages", "api", "server",
    "client", "docs", "scripts",
];

/// Project configuration files watched at the root
pub const CONFIG_FILES: &[&str] = &[
    "package.json", "Cargo.toml", "tsconfig.json", "pyproject.toml", "go.mod", "README.md",
    "docker-compose.yml", "Makefile",
];

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

static DECISION_COMMIT: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b(refactor(?:ed|ing|s)?|architecture|architectural|chose|choose|decided|decision|migrat(?:e|ed|es|ing|ion)|switch(?:ed)? to|adopt(?:ed)?)\b",
    )
});

static FUNCTION_DEF: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?x)
        \bfn\s+([A-Za-z_]\w*)
        | \bfunction\*?\s+([A-Za-z_$][\w$]*)
        | \bdef\s+([A-Za-z_]\w*)
        | \bfunc\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)
        | \b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>
        ",
    )
});

static CODE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "async/await concurrency",
            compile(r"\bawait\b|\.await\b|\bPromise\.all\b|\btokio::spawn\b|\bgo\s+func\b|\basyncio\.gather\b"),
        ),
        (
            "React hooks",
            compile(r"\buse(?:State|Effect|Memo|Callback|Ref|Context|Reducer)\s*\("),
        ),
        (
            "class inheritance",
            compile(r"\bclass\s+\w+(?:<[^>]*>)?\s+extends\s+\w+|\bclass\s+\w+\s*\(\s*[A-Z]\w*[^)]*\)\s*:"),
        ),
        (
            "explicit error handling",
            compile(r"\btry\s*\{|\bcatch\s*\(|\bexcept\b|\bResult<|\?;|\bif\s+err\s*!=\s*nil"),
        ),
    ]
});

static ARCHITECTURE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("singleton", compile(r"\bgetInstance\s*\(|\bstatic\s+instance\b|\bOnceCell\b|\bLazy<")),
        ("factory", compile(r"\b\w*Factory\b|\bfn\s+new_\w+|\bcreate[A-Z]\w*\s*\(")),
        (
            "event-driven",
            compile(r"\baddEventListener\s*\(|\bEventEmitter\b|\.subscribe\s*\(|\bbroadcast::channel\b"),
        ),
        ("repository", compile(r"\b\w+Repository\b|\btrait\s+\w*Store\b")),
        ("middleware", compile(r"\bmiddleware\b|\bapp\.use\s*\(|\bLayer\b")),
        ("dependency injection", compile(r"@Injectable\b|@Inject\b|\bprovide\s*\(")),
    ]
});

static CONVERSATION_DECISION: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)\b(?:we(?:'ve| have)? decided to|decided to|let's use|let's go with|we(?:'ll| will) use|we chose|we should use|going with)\b[^.!?\n]*",
    )
});

static FILE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"\b[\w./-]+\.(?:rs|tsx?|jsx?|mjs|cjs|py|go|java|kt|rb|swift|cpp|hpp|c|h|cs|php|vue|svelte|json|toml|ya?ml|md)\b",
    )
});

static IDENTIFIER_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    compile(r"\b(?:[a-z][a-z0-9]*(?:[A-Z][a-z0-9]*)+|[a-z][a-z0-9]*(?:_[a-z0-9]+)+|[A-Za-z_]\w*\(\))")
});

static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| compile(r"(?s)/\*\*.*?\*/"));

static PY_DOCSTRING: Lazy<Regex> = Lazy::new(|| compile(r#"(?s)""".*?""""#));

static DOC_MARKERS: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"@param\b|@returns?\b|@throws\b|\bTODO\b|\bFIXME\b|#\s*Arguments\b|#\s*Returns\b|#\s*Errors\b|\bArgs:|\bReturns:|:param\b|:returns?:",
    )
});

/// Whether a commit message describes an architectural decision
pub fn is_decision_commit(message: &str) -> bool {
    DECISION_COMMIT.is_match(message)
}

/// Decision keywords found in a commit message, lowercased
pub fn decision_keywords(message: &str) -> Vec<String> {
    let found: IndexSet<String> = DECISION_COMMIT
        .find_iter(message)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    found.into_iter().collect()
}

/// Function names touched by a unified diff.
///
/// Looks at added/removed lines and hunk headers, which carry the enclosing
/// function for most languages.
pub fn changed_functions(diff: &str) -> Vec<String> {
    let mut names = IndexSet::new();
    for line in diff.lines() {
        let relevant = line.starts_with("@@")
            || ((line.starts_with('+') || line.starts_with('-'))
                && !line.starts_with("+++")
                && !line.starts_with("---"));
        if !relevant {
            continue;
        }
        names.extend(function_names(line));
    }
    names.into_iter().collect()
}

/// Function names defined in a snippet
pub fn function_names(text: &str) -> Vec<String> {
    let mut names = IndexSet::new();
    for caps in FUNCTION_DEF.captures_iter(text) {
        if let Some(name) = caps.iter().skip(1).flatten().next() {
            names.insert(name.as_str().to_string());
        }
    }
    names.into_iter().collect()
}

/// Added lines of a unified diff without the leading `+`
pub fn added_lines(diff: &str) -> String {
    diff.lines()
        .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
        .map(|l| &l[1..])
        .collect::<Vec<_>>()
        .join("\n")
}

/// Coarse code idioms present in the text
pub fn code_patterns(text: &str) -> Vec<String> {
    CODE_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(label, _)| label.to_string())
        .collect()
}

/// Architectural patterns and code idioms present in a source file
pub fn architecture_patterns(text: &str) -> Vec<String> {
    let mut found: Vec<String> = ARCHITECTURE_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(label, _)| label.to_string())
        .collect();
    found.extend(code_patterns(text));
    found
}

/// Decision sentences in a conversation message
pub fn decision_sentences(message: &str) -> Vec<String> {
    CONVERSATION_DECISION
        .find_iter(message)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// File-like tokens in free text
pub fn file_references(text: &str) -> Vec<String> {
    let found: IndexSet<String> = FILE_REFERENCE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .collect();
    found.into_iter().collect()
}

/// Identifier-like tokens (camelCase, snake_case, `call()`) in free text
pub fn identifier_references(text: &str) -> Vec<String> {
    let found: IndexSet<String> = IDENTIFIER_REFERENCE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches("()").to_string())
        .filter(|s| s.len() > 3)
        .collect();
    found.into_iter().collect()
}

/// Documentation comment blocks that carry parameter, return or TODO markers
pub fn doc_blocks(source: &str) -> Vec<String> {
    let mut blocks = Vec::new();

    for m in BLOCK_COMMENT.find_iter(source) {
        blocks.push(clean_comment(m.as_str()));
    }
    for m in PY_DOCSTRING.find_iter(source) {
        blocks.push(clean_comment(m.as_str()));
    }

    let mut run: Vec<&str> = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        match trimmed.strip_prefix("///").or_else(|| trimmed.strip_prefix("//!")) {
            Some(rest) => run.push(rest.trim()),
            None if !run.is_empty() => {
                blocks.push(run.join("\n"));
                run.clear();
            }
            None => {}
        }
    }
    if !run.is_empty() {
        blocks.push(run.join("\n"));
    }

    blocks.retain(|block| !block.is_empty() && DOC_MARKERS.is_match(block));
    blocks
}

fn clean_comment(raw: &str) -> String {
    let body = raw
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .trim_matches('"');
    body.lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether a path has an extension worth extracting from, or is a known config file
pub fn is_relevant_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if CONFIG_FILES.contains(&name) {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether any component of the path is an ignored directory
pub fn in_ignored_dir(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| IGNORED_DIRS.contains(&s))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_commit_detection() {
        assert!(is_decision_commit("Refactor auth module into services"));
        assert!(is_decision_commit("We decided to drop the ORM"));
        assert!(is_decision_commit("Migrated storage to sqlite"));
        assert!(!is_decision_commit("Fix typo in README"));
        assert_eq!(decision_keywords("Refactor: migrated to axum"), vec!["refactor", "migrated"]);
    }

    #[test]
    fn test_changed_functions_from_diff() {
        let diff = "\
diff --git a/src/auth.ts b/src/auth.ts
--- a/src/auth.ts
+++ b/src/auth.ts
@@ -10,6 +10,9 @@ function login(user) {
+const refreshToken = async (token) => {
+  return await api.refresh(token);
-function legacyRefresh(token) {
 fn untouched() {}
";
        assert_eq!(changed_functions(diff), vec!["login", "refreshToken", "legacyRefresh"]);
    }

    #[test]
    fn test_function_names_across_languages() {
        assert_eq!(function_names("pub fn parse_config() {"), vec!["parse_config"]);
        assert_eq!(function_names("def load(path):"), vec!["load"]);
        assert_eq!(function_names("func (s *Server) Start() error {"), vec!["Start"]);
    }

    #[test]
    fn test_code_patterns() {
        let text = "const [a, setA] = useState(0);\ntry { await fetch(url) } catch (e) {}";
        assert_eq!(
            code_patterns(text),
            vec!["async/await concurrency", "React hooks", "explicit error handling"]
        );
        assert_eq!(code_patterns("class Admin extends User {}"), vec!["class inheritance"]);
        assert!(code_patterns("let x = 1;").is_empty());
    }

    #[test]
    fn test_conversation_references() {
        let text = "Let's use redis for sessions. See src/session.ts and call refreshSession() from auth_handler.";
        assert_eq!(decision_sentences(text), vec!["Let's use redis for sessions"]);
        assert_eq!(file_references(text), vec!["src/session.ts"]);
        let idents = identifier_references(text);
        assert!(idents.contains(&"refreshSession".to_string()));
        assert!(idents.contains(&"auth_handler".to_string()));
    }

    #[test]
    fn test_doc_blocks_require_markers() {
        let source = r#"
/**
 * Validate a token.
 * @param token raw JWT
 * @returns claims
 */
function validate(token) {}

/** Plain description only */
const x = 1;

/// Parses input.
///
/// # Arguments
/// * `input` - raw text
fn parse(input: &str) {}

def f():
    """TODO: handle unicode"""
"#;
        let blocks = doc_blocks(source);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].contains("@param token raw JWT"));
        assert!(blocks[1].contains("TODO: handle unicode"));
        assert!(blocks[2].contains("# Arguments"));
    }

    #[test]
    fn test_relevant_paths() {
        assert!(is_relevant_file(Path::new("src/main.rs")));
        assert!(is_relevant_file(Path::new("Cargo.toml")));
        assert!(is_relevant_file(Path::new("go.mod")));
        assert!(!is_relevant_file(Path::new("logo.png")));
        assert!(in_ignored_dir(Path::new("web/node_modules/react/index.js")));
        assert!(!in_ignored_dir(Path::new("src/builder.rs")));
    }
}
