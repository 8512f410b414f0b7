//! Instruction templates, one per analysis kind and mode.

use std::path::Path;

use repoviz_core::{AnalysisKind, AnalysisMode, AnalysisRequest};

/// Mermaid constraints embedded verbatim in every diagram instruction.
pub const DIAGRAM_RULES: &str = "CRITICAL MERMAID SYNTAX RULES:
- Each node definition MUST be on a SINGLE LINE
- Node labels should be SHORT (1-5 words max)
- Do NOT put newlines inside square brackets []
- Use simple IDs like A, B, C or short names like React, DOM, etc.
- If you need line breaks in labels, use <br> tag, NOT actual newlines";

/// Output format plus one correct and one incorrect worked example.
pub const DIAGRAM_EXAMPLES: &str = "Output a Mermaid diagram using EXACTLY this format:
```mermaid
graph TD
    A[Short Label] --> B[Another Label]
    B --> C[Third Label]
    C --> D[Fourth Label]
```

CORRECT example:
```mermaid
graph TD
    A[React Core] --> B[Reconciler]
    B --> C[React DOM]
    B --> D[React Native]
```

WRONG example (DO NOT DO THIS):
```mermaid
graph TD
    A[React Core
    Package] --> B[Reconciler]
```";

/// Build the instruction for `request`. `workspace` is the local clone, if
/// any; `web_base` is where remote templates send the engine to browse.
pub fn build_instruction(
    request: &AnalysisRequest,
    workspace: Option<&Path>,
    web_base: &str,
) -> String {
    let owner = &request.repository.owner;
    let repo = &request.repository.name;
    match (request.mode, workspace) {
        (AnalysisMode::Local, Some(path)) => local_instruction(request.kind, owner, repo, path),
        _ => remote_instruction(
            request.kind,
            owner,
            repo,
            &request.repository.web_url(web_base),
        ),
    }
}

fn local_instruction(kind: AnalysisKind, owner: &str, repo: &str, path: &Path) -> String {
    let path = path.display();
    let intro = format!(
        "I have cloned the GitHub repository {owner}/{repo} to a local folder at: {path}"
    );
    match kind {
        AnalysisKind::Overview => format!(
            "You are a helpful assistant that analyzes code repositories.

{intro}

Please analyze this LOCAL repository by reading files and exploring the directory structure.

Use file system tools (read files, list directories, search) to explore the cloned repository.

Provide a comprehensive overview including:
1. **Repository Information**: Name, description, primary language, what the project does (read the README.md)
2. **Structure Overview**: List the directories and explain their purposes
3. **Key Files**: Read important files like README.md, package.json, requirements.txt, etc.
4. **Technology Stack**: Languages, frameworks, and tools used (based on config files)
5. **Project Type**: What kind of project this is (web app, library, CLI, etc.)

Start by listing the contents of {path} and then read the key files."
        ),
        AnalysisKind::Structure => format!(
            "You are a helpful assistant that analyzes code repositories.

{intro}

Please analyze the file structure of this LOCAL repository using file system tools.

List directories to explore the tree and read key files.

1. List ALL directories and files, explaining their purposes
2. Identify the project type (web app, library, CLI tool, etc.)
3. Find and read configuration files, explain what they configure
4. Identify entry points and main source files

Start by listing the contents of {path}"
        ),
        AnalysisKind::Dependencies => format!(
            "You are a helpful assistant that analyzes code repositories.

{intro}

Please analyze the dependencies of this LOCAL repository using file system tools.

Read dependency manifests and search the sources for imports.

1. Find and READ all dependency files (package.json, requirements.txt, Cargo.toml, go.mod, etc.)
2. List the main dependencies and their purposes
3. Identify any development dependencies
4. Summarize the technology stack

Start by listing the contents of {path} to find dependency files."
        ),
        AnalysisKind::Diagram => format!(
            "You are a helpful assistant that analyzes code repositories and creates Mermaid diagrams.

{intro}

Please analyze this LOCAL repository using file system tools (read files, list directories, search).

Your task:
1. Explore the directory structure
2. Read key files to understand the architecture (README.md, main source files, config files)
3. Based on your analysis, create a Mermaid flow diagram

{DIAGRAM_RULES}

{DIAGRAM_EXAMPLES}

Keep node labels concise. Use actual component/directory names from {owner}/{repo}.
Start by listing the contents of {path}"
        ),
    }
}

fn remote_instruction(kind: AnalysisKind, owner: &str, repo: &str, url: &str) -> String {
    match kind {
        AnalysisKind::Overview => format!(
            "You are a helpful assistant that analyzes GitHub repositories.

Please analyze the GitHub repository: {url}

Provide a comprehensive overview including:
1. **Repository Information**: Name, description, primary language, what the project does
2. **Structure Overview**: Main directories and their purposes based on common conventions
3. **Key Files**: Important files like README, package.json, requirements.txt, etc.
4. **Technology Stack**: Languages, frameworks, and tools likely used
5. **Project Type**: What kind of project this is (web app, library, CLI, etc.)

Fetch and analyze the repository information to provide accurate details."
        ),
        AnalysisKind::Structure => format!(
            "You are a helpful assistant that analyzes GitHub repositories.

Please analyze the file structure of: {url}

1. List the main directories and explain their purposes
2. Identify the project type (web app, library, CLI tool, etc.)
3. Find configuration files and explain what they configure
4. Identify entry points and main source files

Browse the repository to understand its structure."
        ),
        AnalysisKind::Dependencies => format!(
            "You are a helpful assistant that analyzes GitHub repositories.

Please analyze the dependencies of: {url}

1. Find all dependency files (package.json, requirements.txt, Cargo.toml, go.mod, etc.)
2. List the main dependencies and their purposes
3. Identify any development dependencies
4. Summarize the technology stack

Fetch the dependency information from the repository."
        ),
        AnalysisKind::Diagram => format!(
            "You are a helpful assistant that analyzes GitHub repositories and creates Mermaid diagrams.

IMPORTANT: Do NOT analyze any local files or the current working directory.
ONLY analyze the remote GitHub repository at this URL: {url}

Your task:
1. Fetch information about the GitHub repository {owner}/{repo} from the web
2. Based on the repository's README, file structure, and code organization, create a Mermaid flow diagram

The diagram should show:
- The overall architecture/structure of the project
- How different components/modules relate to each other
- Data flow or dependency relationships between parts

{DIAGRAM_RULES}

{DIAGRAM_EXAMPLES}

Use actual component names, directories, or module names from the {owner}/{repo} repository.
Do NOT reference any local files - only use information from the GitHub repository."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GITHUB: &str = "https://github.com";
    use repoviz_core::RepositoryRef;

    fn request(owner: &str, name: &str, kind: &str, mode: AnalysisMode) -> AnalysisRequest {
        AnalysisRequest::new(RepositoryRef::new(owner, name), AnalysisKind::parse_lossy(kind))
            .with_mode(mode)
    }

    #[test]
    fn diagram_rules_are_always_verbatim() {
        let ws = Path::new("/tmp/repos/widgets-01h");
        for (owner, name) in [("acme", "widgets"), ("facebook", "react"), ("a-b", "c.d")] {
            let local = build_instruction(&request(owner, name, "diagram", AnalysisMode::Local), Some(ws), GITHUB);
            let remote = build_instruction(&request(owner, name, "diagram", AnalysisMode::Remote), None, GITHUB);
            for text in [&local, &remote] {
                assert!(text.contains(DIAGRAM_RULES), "rules missing for {owner}/{name}");
                assert!(text.contains(DIAGRAM_EXAMPLES));
                assert!(text.contains(&format!("{owner}/{name}")));
            }
        }
    }

    #[test]
    fn local_templates_point_at_workspace() {
        let ws = Path::new("/tmp/repos/widgets-01h");
        for kind in ["overview", "structure", "dependencies", "diagram"] {
            let text = build_instruction(&request("acme", "widgets", kind, AnalysisMode::Local), Some(ws), GITHUB);
            assert!(text.contains("/tmp/repos/widgets-01h"), "{kind}");
            assert!(text.contains("acme/widgets"), "{kind}");
            assert!(text.contains("LOCAL"), "{kind}");
        }
    }

    #[test]
    fn remote_templates_point_at_web_url() {
        for kind in ["overview", "structure", "dependencies", "diagram"] {
            let text = build_instruction(&request("acme", "widgets", kind, AnalysisMode::Remote), None, GITHUB);
            assert!(text.contains("https://github.com/acme/widgets"), "{kind}");
            assert!(!text.contains("local folder"), "{kind}");
        }
    }

    #[test]
    fn templates_differ_per_kind() {
        let ws = Path::new("/w");
        let structure = build_instruction(&request("a", "b", "structure", AnalysisMode::Local), Some(ws), GITHUB);
        let deps = build_instruction(&request("a", "b", "dependencies", AnalysisMode::Local), Some(ws), GITHUB);
        assert!(structure.contains("List ALL directories and files"));
        assert!(structure.contains("entry points"));
        assert!(deps.contains("Cargo.toml"));
        assert!(deps.contains("technology stack"));
        assert!(!deps.contains(DIAGRAM_RULES));
    }

    #[test]
    fn unknown_kind_uses_overview() {
        let ws = Path::new("/w");
        let unknown = build_instruction(&request("a", "b", "security-audit", AnalysisMode::Local), Some(ws), GITHUB);
        let overview = build_instruction(&request("a", "b", "overview", AnalysisMode::Local), Some(ws), GITHUB);
        assert_eq!(unknown, overview);
    }

    #[test]
    fn local_mode_without_workspace_falls_back_to_remote() {
        let text = build_instruction(&request("acme", "widgets", "overview", AnalysisMode::Local), None, GITHUB);
        assert!(text.contains("https://github.com/acme/widgets"));
    }

    #[test]
    fn remote_templates_follow_configured_base() {
        let req = request("team", "tool", "overview", AnalysisMode::Remote);
        let text = build_instruction(&req, None, "https://git.example.org/");
        assert!(text.contains("https://git.example.org/team/tool"), "{text}");
        assert!(!text.contains("github.com/team/tool"));
    }
}
