use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Default code-hosting host recognized in full web URLs.
pub const DEFAULT_HOST: &str = "github.com";

/// Owner/name pair identifying a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    #[serde(rename = "repo")]
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// `<base>/<owner>/<name>.git`, e.g. `https://github.com/acme/widgets.git`.
    pub fn clone_url(&self, base: &str) -> String {
        format!("{}/{}/{}.git", base.trim_end_matches('/'), self.owner, self.name)
    }

    /// `<base>/<owner>/<name>` without the `.git` suffix.
    pub fn web_url(&self, base: &str) -> String {
        format!("{}/{}/{}", base.trim_end_matches('/'), self.owner, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Extracts a [`RepositoryRef`] from free-form reference strings.
///
/// Patterns are tried in order:
/// 1. a web URL ending in `<host>/<owner>/<name>[.git][/]`
/// 2. the bare `<owner>/<name>[.git][/]` shorthand
#[derive(Debug, Clone)]
pub struct RepoUrlParser {
    patterns: [Regex; 2],
}

impl RepoUrlParser {
    pub fn new(host: &str) -> Self {
        let full = format!(r"{}/([^/]+)/([^/]+?)(?:\.git)?/?$", regex::escape(host));
        Self {
            patterns: [
                Regex::new(&full).expect("escaped host yields a valid pattern"),
                Regex::new(r"^([^/]+)/([^/]+?)(?:\.git)?/?$").expect("static pattern"),
            ],
        }
    }

    /// Returns the first match's owner and name, or `None` if nothing matches.
    pub fn parse(&self, raw: &str) -> Option<RepositoryRef> {
        let raw = raw.trim();
        self.patterns.iter().find_map(|re| {
            let caps = re.captures(raw)?;
            Some(RepositoryRef::new(&caps[1], &caps[2]))
        })
    }
}

impl Default for RepoUrlParser {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

/// Parse with the default host (`github.com`).
pub fn parse_repo_url(raw: &str) -> Option<RepositoryRef> {
    static PARSER: OnceLock<RepoUrlParser> = OnceLock::new();
    PARSER.get_or_init(RepoUrlParser::default).parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(raw: &str) -> Option<(String, String)> {
        parse_repo_url(raw).map(|r| (r.owner, r.name))
    }

    fn some(owner: &str, name: &str) -> Option<(String, String)> {
        Some((owner.to_string(), name.to_string()))
    }

    #[test]
    fn full_url_with_git_suffix_and_slash() {
        assert_eq!(
            pair("https://github.com/acme/widgets.git/"),
            some("acme", "widgets")
        );
    }

    #[test]
    fn full_url_variants() {
        assert_eq!(pair("https://github.com/acme/widgets"), some("acme", "widgets"));
        assert_eq!(pair("http://github.com/acme/widgets/"), some("acme", "widgets"));
        assert_eq!(pair("github.com/acme/widgets.git"), some("acme", "widgets"));
        assert_eq!(pair("git@github.com/acme/widgets.git"), some("acme", "widgets"));
    }

    #[test]
    fn shorthand() {
        assert_eq!(pair("acme/widgets"), some("acme", "widgets"));
        assert_eq!(pair("acme/widgets.git"), some("acme", "widgets"));
        assert_eq!(pair("acme/widgets/"), some("acme", "widgets"));
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(pair("  acme/widgets \n"), some("acme", "widgets"));
        assert_eq!(
            pair("\thttps://github.com/acme/widgets  "),
            some("acme", "widgets")
        );
    }

    #[test]
    fn dotted_names_survive() {
        assert_eq!(pair("acme/widgets.rs"), some("acme", "widgets.rs"));
        assert_eq!(
            pair("https://github.com/acme/site.github.io"),
            some("acme", "site.github.io")
        );
    }

    #[test]
    fn non_matching_inputs() {
        assert_eq!(pair("not a url"), None);
        assert_eq!(pair(""), None);
        assert_eq!(pair("   "), None);
        assert_eq!(pair("https://github.com/acme/widgets/tree/main"), None);
        assert_eq!(pair("https://gitlab.com/acme/widgets"), None);
        assert_eq!(pair("/widgets"), None);
    }

    #[test]
    fn custom_host() {
        let parser = RepoUrlParser::new("git.example.org");
        let r = parser.parse("https://git.example.org/team/tool.git").unwrap();
        assert_eq!(r, RepositoryRef::new("team", "tool"));
        // The host is matched literally, not as a regex.
        assert!(parser.parse("https://gitXexample.org/team/tool/extra").is_none());
    }

    #[test]
    fn urls_from_ref() {
        let r = RepositoryRef::new("acme", "widgets");
        assert_eq!(
            r.clone_url("https://github.com/"),
            "https://github.com/acme/widgets.git"
        );
        assert_eq!(r.web_url("https://github.com"), "https://github.com/acme/widgets");
        assert_eq!(r.to_string(), "acme/widgets");
    }

    #[test]
    fn serializes_name_as_repo() {
        let json = serde_json::to_value(RepositoryRef::new("acme", "widgets")).unwrap();
        assert_eq!(json, serde_json::json!({"owner": "acme", "repo": "widgets"}));
    }
}
