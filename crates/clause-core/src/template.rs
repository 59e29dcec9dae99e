//! Template loading
//!
//! A template is a bundle of contract logic plus its data model. It is read
//! either from a template directory or from an explicit list of files; the
//! actual reading is done by a [`Loader`] so tests and embedders can swap it.
//!
//! # Directory layout understood by [`FsLoader`]
//!
//! ```text
//! my-template/
//!   package.json        optional, supplies name and version
//!   logic/  (or lib/)   logic units, searched recursively
//!   model/  (or models/) model files (*.cto), searched recursively
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Extension of model definition files
pub const MODEL_EXTENSION: &str = "cto";

/// Default extension of logic units
pub const DEFAULT_LOGIC_EXTENSION: &str = "ergo";

const LOGIC_DIRS: [&str; 2] = ["logic", "lib"];
const MODEL_DIRS: [&str; 2] = ["model", "models"];

// ── Template source ───────────────────────────────────────

/// Where a template is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// A template directory
    Directory(PathBuf),
    /// An explicit list of logic and model files
    Files(Vec<PathBuf>),
}

impl TemplateSource {
    /// Pick the template source from command-line style arguments.
    ///
    /// A directory always wins. Files given alongside a directory are
    /// ignored, and that is logged since it is rarely what the caller meant.
    pub fn from_args(directory: Option<PathBuf>, files: Vec<PathBuf>) -> Self {
        match directory {
            Some(dir) => {
                if !files.is_empty() {
                    warn!(
                        "template directory {} given, ignoring {} input file(s)",
                        dir.display(),
                        files.len()
                    );
                }
                TemplateSource::Directory(dir)
            }
            None => TemplateSource::Files(files),
        }
    }
}

// ── Logic bundle ──────────────────────────────────────────

/// A named source text belonging to a template
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

/// Everything a loader found for one template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicBundle {
    pub name: Option<String>,
    pub version: Option<String>,
    pub logic: Vec<SourceFile>,
    pub models: Vec<SourceFile>,
    /// Non-fatal problems noticed while loading
    pub warnings: Vec<String>,
}

impl LogicBundle {
    pub fn logic_count(&self) -> usize {
        self.logic.len()
    }

    pub fn has_logic(&self) -> bool {
        !self.logic.is_empty()
    }

    /// SHA-256 over every logic unit and model file, in bundle order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for file in self.logic.iter().chain(self.models.iter()) {
            hasher.update(file.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(file.content.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Short label for log lines
    pub fn label(&self) -> String {
        match (&self.name, &self.version) {
            (Some(name), Some(version)) => format!("{}@{}", name, version),
            (Some(name), None) => name.clone(),
            _ => "<unnamed template>".to_string(),
        }
    }
}

// ── Loader ────────────────────────────────────────────────

/// Reads templates into logic bundles
#[async_trait]
pub trait Loader: Send + Sync {
    async fn from_directory(&self, path: &Path) -> Result<LogicBundle>;
    async fn from_files(&self, paths: &[PathBuf]) -> Result<LogicBundle>;
}

/// Load a template and check it carries at least one logic unit
///
/// # Errors
/// Whatever the loader returns, or `ValidationError` for a bundle with no
/// logic units (in either mode).
pub async fn load_template<L: Loader + ?Sized>(
    loader: &L,
    source: &TemplateSource,
) -> Result<LogicBundle> {
    let bundle = match source {
        TemplateSource::Directory(dir) => {
            info!("loading template from directory {}", dir.display());
            loader.from_directory(dir).await?
        }
        TemplateSource::Files(files) => {
            info!("loading template from {} file(s)", files.len());
            loader.from_files(files).await?
        }
    };

    if !bundle.has_logic() {
        return Err(Error::ValidationError("no input logic found".into()));
    }

    debug!(
        "loaded {}: {} logic unit(s), {} model file(s), fingerprint {}",
        bundle.label(),
        bundle.logic_count(),
        bundle.models.len(),
        bundle.fingerprint()
    );
    Ok(bundle)
}

// ── Filesystem loader ─────────────────────────────────────

/// Loader backed by the local filesystem
#[derive(Debug, Clone)]
pub struct FsLoader {
    logic_extensions: Vec<String>,
}

impl Default for FsLoader {
    fn default() -> Self {
        FsLoader {
            logic_extensions: vec![DEFAULT_LOGIC_EXTENSION.to_string()],
        }
    }
}

impl FsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of extensions treated as logic units
    pub fn with_logic_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.logic_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    fn is_logic(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.logic_extensions.iter().any(|l| l == ext))
            .unwrap_or(false)
    }

    fn is_model(path: &Path) -> bool {
        extension_of(path) == Some(MODEL_EXTENSION)
    }

    async fn read_package(dir: &Path, bundle: &mut LogicBundle) -> Result<()> {
        let path = dir.join("package.json");
        if !is_file(&path).await {
            return Ok(());
        }
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::io(&path, e))?;
        let package: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            Error::ParseError(format!("invalid JSON in {}: {}", path.display(), e))
        })?;
        bundle.name = package["name"].as_str().map(str::to_string);
        bundle.version = package["version"].as_str().map(str::to_string);
        Ok(())
    }

    async fn read_tree<F>(root: &Path, subdirs: &[&str], keep: F) -> Result<Vec<SourceFile>>
    where
        F: Fn(&Path) -> bool,
    {
        let mut paths = Vec::new();
        for sub in subdirs {
            let dir = root.join(sub);
            if is_dir(&dir).await {
                paths.extend(collect_files(&dir, &keep).await?);
            }
        }
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::io(&path, e))?;
            let name = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push(SourceFile { name, content });
        }
        Ok(files)
    }
}

#[async_trait]
impl Loader for FsLoader {
    async fn from_directory(&self, path: &Path) -> Result<LogicBundle> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::io(path, e))?;
        if !metadata.is_dir() {
            return Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
            ));
        }

        let mut bundle = LogicBundle::default();
        Self::read_package(path, &mut bundle).await?;
        bundle.logic = Self::read_tree(path, &LOGIC_DIRS, |p| self.is_logic(p)).await?;
        bundle.models = Self::read_tree(path, &MODEL_DIRS, Self::is_model).await?;
        Ok(bundle)
    }

    async fn from_files(&self, paths: &[PathBuf]) -> Result<LogicBundle> {
        let mut bundle = LogicBundle::default();
        for path in paths {
            let target = if self.is_logic(path) {
                &mut bundle.logic
            } else if Self::is_model(path) {
                &mut bundle.models
            } else {
                let msg = format!("ignoring {}: unrecognized file extension", path.display());
                warn!("{}", msg);
                bundle.warnings.push(msg);
                continue;
            };
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::io(path, e))?;
            target.push(SourceFile {
                name: path.display().to_string(),
                content,
            });
        }
        Ok(bundle)
    }
}

fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Walk `root` recursively (explicit stack), returning every file accepted by `keep`
async fn collect_files<F>(root: &Path, keep: &F) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::io(&dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(&dir, e))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| Error::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if keep(&path) {
                found.push(path);
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, text: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    fn sample_template() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("package.json"),
            r#"{"name": "late-delivery", "version": "0.2.1"}"#,
        );
        write(&root.join("logic/logic.ergo"), "contract LateDelivery {}");
        write(&root.join("logic/util/helpers.ergo"), "define function f() { 1 }");
        write(&root.join("logic/README.md"), "not logic");
        write(&root.join("model/model.cto"), "namespace org.example");
        dir
    }

    #[tokio::test]
    async fn test_load_directory() {
        let dir = sample_template();
        let bundle = FsLoader::new().from_directory(dir.path()).await.unwrap();
        assert_eq!(bundle.name.as_deref(), Some("late-delivery"));
        assert_eq!(bundle.version.as_deref(), Some("0.2.1"));
        let names: Vec<_> = bundle.logic.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["logic/logic.ergo", "logic/util/helpers.ergo"]);
        assert_eq!(bundle.models.len(), 1);
        assert_eq!(bundle.models[0].name, "model/model.cto");
        assert_eq!(bundle.label(), "late-delivery@0.2.1");
    }

    #[tokio::test]
    async fn test_load_directory_without_package_json() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("lib/main.ergo"), "contract C {}");
        let bundle = FsLoader::new().from_directory(dir.path()).await.unwrap();
        assert_eq!(bundle.name, None);
        assert_eq!(bundle.logic_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_package_json() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("package.json"), "{");
        let err = FsLoader::new().from_directory(dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::ParseError(_)), "got: {:?}", err);
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsLoader::new()
            .from_directory(&dir.path().join("absent"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IoError { .. }), "got: {:?}", err);
    }

    #[tokio::test]
    async fn test_load_files_classifies_by_extension() {
        let dir = sample_template();
        let files = vec![
            dir.path().join("model/model.cto"),
            dir.path().join("logic/logic.ergo"),
            dir.path().join("logic/README.md"),
        ];
        let bundle = FsLoader::new().from_files(&files).await.unwrap();
        assert_eq!(bundle.logic_count(), 1);
        assert_eq!(bundle.models.len(), 1);
        assert_eq!(bundle.warnings.len(), 1);
        assert!(bundle.warnings[0].contains("README.md"));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsLoader::new()
            .from_files(&[dir.path().join("gone.ergo")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IoError { .. }));
    }

    #[tokio::test]
    async fn test_custom_logic_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("logic/main.js"), "function f() {}");
        let loader = FsLoader::new().with_logic_extensions(["js"]);
        let bundle = loader.from_directory(dir.path()).await.unwrap();
        assert_eq!(bundle.logic_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_directory_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("model/model.cto"), "namespace org.example");
        let source = TemplateSource::Directory(dir.path().to_path_buf());
        let err = load_template(&FsLoader::new(), &source).await.unwrap_err();
        match err {
            Error::ValidationError(msg) => assert_eq!(msg, "no input logic found"),
            other => panic!("expected ValidationError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_file_list_fails_validation() {
        let source = TemplateSource::Files(vec![]);
        let err = load_template(&FsLoader::new(), &source).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_model_only_files_fail_validation() {
        let dir = sample_template();
        let source = TemplateSource::Files(vec![dir.path().join("model/model.cto")]);
        let err = load_template(&FsLoader::new(), &source).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn test_directory_wins_over_files() {
        let source = TemplateSource::from_args(
            Some(PathBuf::from("tpl")),
            vec![PathBuf::from("a.ergo")],
        );
        assert_eq!(source, TemplateSource::Directory(PathBuf::from("tpl")));
    }

    #[test]
    fn test_files_used_without_directory() {
        let source = TemplateSource::from_args(None, vec![PathBuf::from("a.ergo")]);
        assert_eq!(source, TemplateSource::Files(vec![PathBuf::from("a.ergo")]));
        assert_eq!(
            TemplateSource::from_args(None, vec![]),
            TemplateSource::Files(vec![])
        );
    }

    #[test]
    fn test_fingerprint_is_sha256_and_content_sensitive() {
        let mut bundle = LogicBundle {
            logic: vec![SourceFile {
                name: "logic.ergo".into(),
                content: "a".into(),
            }],
            ..Default::default()
        };
        let first = bundle.fingerprint();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(first, bundle.fingerprint());

        bundle.logic[0].content = "b".into();
        assert_ne!(first, bundle.fingerprint());
    }
}
