//! Project loading
//!
//! Reads everything one audit needs into memory up front: the TMDL files,
//! the optional `project_config.json`, and the report's visual definitions.

use semguard_core::ProjectConfig;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory suffix of a semantic-model project
pub const SEMANTIC_MODEL_SUFFIX: &str = ".SemanticModel";

/// Directory suffix of a report project
pub const REPORT_SUFFIX: &str = ".Report";

/// Per-project override file
pub const PROJECT_CONFIG_FILE: &str = "project_config.json";

/// Directories never scanned for model files
const SKIPPED_DIRS: &[&str] = &[".internal", ".backups"];

/// Errors that make a whole project unreadable
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Project directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("No .tmdl files found under {0}")]
    NoModelFiles(PathBuf),
}

/// One model file, path relative to the project root with `/` separators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

/// Everything read from disk for one project
#[derive(Debug, Clone, Default)]
pub struct ProjectInput {
    pub name: String,
    pub files: Vec<SourceFile>,
    pub project_config: ProjectConfig,

    /// `visual.json` files, path relative to the report's parent directory
    pub visuals: Vec<SourceFile>,

    /// Extra text scanned for measure references
    pub external_references: Vec<String>,
}

impl ProjectInput {
    /// In-memory project, mainly for tests and embedding
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.files.push(SourceFile {
            path: path.into(),
            text: text.into(),
        });
        self
    }

    pub fn with_visual(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.visuals.push(SourceFile {
            path: path.into(),
            text: text.into(),
        });
        self
    }
}

/// Display name of a project directory (`Sales.SemanticModel` -> `Sales`)
pub fn project_name(dir: &Path) -> String {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string());
    name.strip_suffix(SEMANTIC_MODEL_SUFFIX)
        .map(str::to_string)
        .unwrap_or(name)
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && SKIPPED_DIRS.iter().any(|skip| entry.file_name() == *skip)
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn read(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read one project directory
pub fn load_project(dir: &Path) -> Result<ProjectInput, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::NotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
    {
        let entry = entry.map_err(|e| LoadError::Walk {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let is_tmdl = entry.path().extension().is_some_and(|ext| ext == "tmdl");
        if entry.file_type().is_file() && is_tmdl {
            files.push(SourceFile {
                path: relative_path(dir, entry.path()),
                text: read(entry.path())?,
            });
        }
    }

    if files.is_empty() {
        return Err(LoadError::NoModelFiles(dir.to_path_buf()));
    }

    let name = project_name(dir);
    let input = ProjectInput {
        project_config: load_project_config(dir),
        visuals: load_visuals(dir, &name),
        external_references: Vec::new(),
        name,
        files,
    };

    tracing::debug!(
        project = %input.name,
        files = input.files.len(),
        visuals = input.visuals.len(),
        "Loaded project"
    );
    Ok(input)
}

/// `project_config.json` from the project directory or its parent.
///
/// A broken file is logged and treated as empty.
fn load_project_config(dir: &Path) -> ProjectConfig {
    let candidates = std::iter::once(dir.to_path_buf())
        .chain(dir.parent().map(Path::to_path_buf))
        .map(|d| d.join(PROJECT_CONFIG_FILE));

    for path in candidates {
        if !path.is_file() {
            continue;
        }
        match ProjectConfig::from_file(&path) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable project config");
                return ProjectConfig::default();
            }
        }
    }

    ProjectConfig::default()
}

/// `visual.json` files of the sibling `<name>.Report` and of any
/// `*.Report` directory inside the project
fn load_visuals(dir: &Path, name: &str) -> Vec<SourceFile> {
    let mut report_dirs: Vec<PathBuf> = Vec::new();

    if let Some(parent) = dir.parent() {
        let sibling = parent.join(format!("{}{}", name, REPORT_SUFFIX));
        if sibling.is_dir() {
            report_dirs.push(sibling);
        }
    }

    if let Ok(entries) = std::fs::read_dir(dir) {
        let mut nested: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && p.to_string_lossy().ends_with(REPORT_SUFFIX))
            .collect();
        nested.sort();
        report_dirs.extend(nested);
    }

    let mut visuals = Vec::new();
    for report in report_dirs {
        let base = report.parent().unwrap_or(&report).to_path_buf();
        for entry in WalkDir::new(&report)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && entry.file_name() == "visual.json" {
                match read(entry.path()) {
                    Ok(text) => visuals.push(SourceFile {
                        path: relative_path(&base, entry.path()),
                        text,
                    }),
                    Err(e) => tracing::warn!(error = %e, "Skipping unreadable visual"),
                }
            }
        }
    }

    visuals
}

/// Find project directories under `root`.
///
/// `root` itself is a project when it is a `*.SemanticModel` directory or
/// no such directory exists below it.
pub fn discover_projects(root: &Path) -> Vec<PathBuf> {
    if root.to_string_lossy().ends_with(SEMANTIC_MODEL_SUFFIX) {
        return vec![root.to_path_buf()];
    }

    let mut projects: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(3)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_dir() && e.file_name().to_string_lossy().ends_with(SEMANTIC_MODEL_SUFFIX)
        })
        .map(|e| e.path().to_path_buf())
        .collect();

    if projects.is_empty() {
        projects.push(root.to_path_buf());
    }
    projects.sort();
    projects
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, text: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    #[test]
    fn loads_model_files_config_and_visuals() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("Sales.SemanticModel");
        write(&project.join("definition/model.tmdl"), "model Model\n");
        write(&project.join("definition/tables/Sales.tmdl"), "table Sales\n");
        write(&project.join(".internal/cache.tmdl"), "table Cache\n");
        write(&project.join("definition/notes.txt"), "ignored");
        write(
            &project.join(PROJECT_CONFIG_FILE),
            r#"{"overrides": {"allow_bidi": true}}"#,
        );
        write(
            &temp.path().join("Sales.Report/definition/pages/p1/visuals/v1/visual.json"),
            r#"{"name": "[Total Sales]"}"#,
        );

        let input = load_project(&project).unwrap();
        let paths: Vec<&str> = input.files.iter().map(|f| f.path.as_str()).collect();

        assert_eq!(input.name, "Sales");
        assert_eq!(paths, vec!["definition/model.tmdl", "definition/tables/Sales.tmdl"]);
        assert!(input.project_config.overrides["allow_bidi"].is_allowed());
        assert_eq!(
            input.visuals,
            vec![SourceFile {
                path: "Sales.Report/definition/pages/p1/visuals/v1/visual.json".to_string(),
                text: r#"{"name": "[Total Sales]"}"#.to_string(),
            }]
        );
        assert!(input.external_references.is_empty());
    }

    #[test]
    fn broken_project_config_is_ignored() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("model.tmdl"), "table T\n");
        write(&temp.path().join(PROJECT_CONFIG_FILE), "{ not json");

        let input = load_project(temp.path()).unwrap();
        assert!(input.project_config.overrides.is_empty());
    }

    #[test]
    fn missing_or_empty_projects_fail() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            load_project(&temp.path().join("missing")),
            Err(LoadError::NotFound(_))
        ));
        assert!(matches!(load_project(temp.path()), Err(LoadError::NoModelFiles(_))));
    }

    #[test]
    fn discovers_semantic_model_directories() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("b/Zeta.SemanticModel/model.tmdl"), "model Model\n");
        write(&temp.path().join("Alpha.SemanticModel/model.tmdl"), "model Model\n");
        write(&temp.path().join("Alpha.Report/report.json"), "{}");

        let names: Vec<String> = discover_projects(temp.path())
            .iter()
            .map(|p| project_name(p))
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn plain_directory_is_its_own_project() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("model.tmdl"), "model Model\n");
        assert_eq!(discover_projects(temp.path()), vec![temp.path().to_path_buf()]);
    }
}
