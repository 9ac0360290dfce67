//! Template cache
//!
//! One map, keyed by template id, behind the service's single lock. Each
//! entry moves `HeaderOnly -> Strict` at most once per load:
//!
//! - **HeaderOnly**: the tolerant header parsed; the raw text may still
//!   need parameters before it is valid YAML
//! - **Strict**: the raw text also parsed and validated as it stands
//!
//! Loading reads and parses outside the lock; the lock is only taken to
//! insert or upgrade one entry, and the header entry always goes in before
//! the strict attempt for that file.
//!
//! One scan runs at a time. A reload bumps the cache generation, so a scan
//! started before it stops writing and is redone rather than leaving a
//! partial map marked as loaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};

use flowsim_templates::{
    parse_header, parse_template, validate_template, Template, TemplateError, TemplateHeader,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheState {
    HeaderOnly,
    Strict,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub header: TemplateHeader,
    /// Raw, unsubstituted text
    pub raw: String,
    /// File name or loader label, recorded in provenance
    pub source: String,
    /// Present once the raw text parsed strictly
    pub template: Option<Template>,
}

impl CacheEntry {
    pub fn state(&self) -> CacheState {
        if self.template.is_some() {
            CacheState::Strict
        } else {
            CacheState::HeaderOnly
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TemplateCache {
    pub(crate) entries: BTreeMap<String, CacheEntry>,
    loaded: bool,
    /// A scan is running; other callers wait on [`SharedCache::ready`]
    loading: bool,
    /// Bumped by every reload; a scan only writes while it still matches
    generation: u64,
}

/// The cache map, its lock, and the signal for scans finishing
#[derive(Debug, Default)]
pub(crate) struct SharedCache {
    state: Mutex<TemplateCache>,
    ready: Condvar,
}

/// Where cache contents come from
#[derive(Debug, Clone)]
pub(crate) enum TemplateOrigin {
    Directory(ServiceConfig),
    /// `(template id, raw text)` pairs from an external loader
    Sources(Vec<(String, String)>),
}

/// One template read from its origin, not yet cached
struct Loaded {
    /// Key forced by the origin; directories key by header id
    id: Option<String>,
    source: String,
    raw: String,
}

/// Whether a scan ran to the end for its generation
enum ScanOutcome {
    Complete { strict: usize, total: usize },
    Superseded,
}

/// Clears `loading` when a scan ends, unwinding included
struct ScanGuard<'a> {
    cache: &'a SharedCache,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.cache.lock().loading = false;
        self.cache.ready.notify_all();
    }
}

impl SharedCache {
    pub(crate) fn lock(&self) -> MutexGuard<'_, TemplateCache> {
        // Entries are only ever inserted whole, so a poisoned lock is still consistent
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop every entry; a scan still running for the old generation
    /// discards its work and the next access scans again
    pub(crate) fn clear(&self) {
        let mut guard = self.lock();
        guard.entries.clear();
        guard.loaded = false;
        guard.generation += 1;
    }

    /// The loaded cache, scanning `origin` first if needed
    ///
    /// Only one caller scans at a time; the others wait for it. The
    /// returned guard holds the lock, so the entries cannot be cleared
    /// while the caller reads them.
    pub(crate) fn loaded(
        &self,
        origin: &TemplateOrigin,
    ) -> Result<MutexGuard<'_, TemplateCache>, TemplateError> {
        loop {
            let generation = {
                let mut guard = self.lock();
                while guard.loading && !guard.loaded {
                    guard = self
                        .ready
                        .wait(guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                if guard.loaded {
                    return Ok(guard);
                }
                guard.loading = true;
                guard.generation
            };

            let scan = ScanGuard { cache: self };
            let outcome = self.scan(origin, generation)?;
            if let ScanOutcome::Complete { strict, total } = outcome {
                let mut guard = self.lock();
                if guard.generation == generation {
                    guard.loaded = true;
                    info!(
                        "Template cache loaded: {} templates ({} strict) from {} sources",
                        guard.entries.len(),
                        strict,
                        total
                    );
                }
            } else {
                debug!("Template scan superseded by a reload; scanning again");
            }
            drop(scan);
        }
    }

    /// Read `origin` and fill the map, writing only while `generation`
    /// is current
    fn scan(&self, origin: &TemplateOrigin, generation: u64) -> Result<ScanOutcome, TemplateError> {
        let files = match origin {
            TemplateOrigin::Directory(config) => read_directory(config)?,
            TemplateOrigin::Sources(sources) => sources
                .iter()
                .map(|(id, raw)| Loaded {
                    id: Some(id.clone()),
                    source: format!("template:{}", id),
                    raw: raw.clone(),
                })
                .collect(),
        };

        let mut strict = 0usize;
        let total = files.len();
        for file in files {
            let header = match parse_header(&file.raw) {
                Ok(header) => header,
                Err(e) => {
                    warn!("Skipping template {}: {}", file.source, e);
                    continue;
                }
            };
            let id = file.id.unwrap_or_else(|| header.id.clone());

            {
                let mut guard = self.lock();
                if guard.generation != generation {
                    return Ok(ScanOutcome::Superseded);
                }
                if let Some(existing) = guard.entries.get(&id) {
                    if existing.source != file.source {
                        warn!(
                            "Duplicate template id '{}' in {} (already loaded from {})",
                            id, file.source, existing.source
                        );
                        continue;
                    }
                }
                guard.entries.insert(
                    id.clone(),
                    CacheEntry {
                        header,
                        raw: file.raw.clone(),
                        source: file.source.clone(),
                        template: None,
                    },
                );
            }

            match parse_strict(&file.raw) {
                Ok(template) => {
                    let mut guard = self.lock();
                    if guard.generation != generation {
                        return Ok(ScanOutcome::Superseded);
                    }
                    if let Some(entry) = guard.entries.get_mut(&id) {
                        entry.template = Some(template);
                    }
                    strict += 1;
                    debug!("Loaded template '{}' from {}", id, file.source);
                }
                Err(e) => {
                    warn!(
                        "Template '{}' kept header-only until compiled with parameters: {}",
                        id, e
                    );
                }
            }
        }
        Ok(ScanOutcome::Complete { strict, total })
    }
}

fn parse_strict(raw: &str) -> Result<Template, TemplateError> {
    let template = parse_template(raw)?;
    validate_template(&template)?;
    Ok(template)
}

fn read_directory(config: &ServiceConfig) -> Result<Vec<Loaded>, TemplateError> {
    let dir = &config.templates_dir;
    let io_error = |source| TemplateError::Io {
        path: dir.clone(),
        source,
    };

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(io_error)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && config.accepts(path))
        .collect();
    paths.sort();

    info!("Loading templates from {} files in {:?}", paths.len(), dir);

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match std::fs::read_to_string(&path) {
            Ok(raw) => files.push(Loaded {
                id: None,
                source: file_label(&path),
                raw,
            }),
            Err(e) => warn!("Failed to read template file {:?}: {}", path, e),
        }
    }
    Ok(files)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
