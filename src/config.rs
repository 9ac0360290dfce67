//! Service configuration
//!
//! Where the template service looks for template files.

use std::path::{Path, PathBuf};

/// Environment variable overriding the templates directory
pub const TEMPLATES_DIR_ENV: &str = "FLOWSIM_TEMPLATES_DIR";

/// File extensions scanned by default
pub const DEFAULT_EXTENSIONS: &[&str] = &["yaml", "yml"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub templates_dir: PathBuf,
    /// Extensions (without the dot) of files treated as templates
    pub extensions: Vec<String>,
}

impl ServiceConfig {
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Resolve the templates directory from the environment
    ///
    /// Path resolution order:
    /// 1. FLOWSIM_TEMPLATES_DIR environment variable (explicit override)
    /// 2. Relative "templates" path (works when running from workspace root)
    /// 3. CARGO_MANIFEST_DIR/templates (set by cargo during build/test)
    /// 4. Compile-time crate directory
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var(TEMPLATES_DIR_ENV) {
            return Self::new(dir);
        }

        if Path::new("templates").is_dir() {
            return Self::new("templates");
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let path = Path::new(&manifest_dir).join("templates");
            if path.is_dir() {
                return Self::new(path);
            }
        }

        let compile_time = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");
        if Path::new(compile_time).is_dir() {
            return Self::new(compile_time);
        }

        // Last resort - let the scan fail with a clear error
        Self::new("templates")
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `path` has one of the configured extensions
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
