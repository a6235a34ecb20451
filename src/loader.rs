// 🚚 Master loader - four reports in, one Dataset out
//
// Directory path:  find dir → read four files → content key → cache hit? → parse → cache write
// Upload path:     route each file by report code → parse → no cache involved
//
// Parsers are independent, so the order reports are parsed in does not matter.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::cache::{content_key, ParquetCache};
use crate::config::LoaderConfig;
use crate::entities::BranchRegistry;
use crate::error::LoadError;
use crate::parser::{detect_report, get_parser_with, ReportKind};
use crate::tables::{Dataset, DatasetBuilder};

/// Where report exports are looked for, relative to the base directory.
pub const DATA_DIR_CANDIDATES: [&str; 2] = ["Stories_data", "Archive/Stories_data"];

/// First candidate data directory that exists under `base`.
pub fn find_data_dir(base: &Path) -> Result<PathBuf> {
    let candidates: Vec<PathBuf> = DATA_DIR_CANDIDATES.iter().map(|c| base.join(c)).collect();

    match candidates.iter().find(|dir| dir.is_dir()) {
        Some(dir) => Ok(dir.clone()),
        None => Err(LoadError::DataDirNotFound { candidates }.into()),
    }
}

// ============================================================================
// LOADER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Loader {
    config: LoaderConfig,
    registry: BranchRegistry,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Loader {
            config,
            registry: BranchRegistry::new(),
        }
    }

    /// Swap the branch roster (tests, new branches)
    pub fn with_registry(mut self, registry: BranchRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &BranchRegistry {
        &self.registry
    }

    /// Configured data directory, or the first candidate under the cwd.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.config.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let cwd = env::current_dir().context("Failed to read current directory")?;
                find_data_dir(&cwd)
            }
        }
    }

    /// Load the default dataset from the configured data directory.
    pub fn load(&self) -> Result<Dataset> {
        let dir = self.data_dir()?;
        self.load_dir(&dir)
    }

    /// Load from `dir`, going through the Parquet cache when enabled.
    pub fn load_dir(&self, dir: &Path) -> Result<Dataset> {
        let reports = read_reports(dir)?;

        if !self.config.use_cache {
            return self.parse_reports(&reports);
        }

        let inputs: Vec<(ReportKind, &[u8])> =
            reports.iter().map(|(kind, bytes)| (*kind, bytes.as_slice())).collect();
        let key = content_key(&inputs);
        let cache = ParquetCache::new(&self.config.cache_dir);

        if let Some(dataset) = cache.try_read(&key) {
            info!(key = %key, "loaded cleaned tables from cache");
            log_row_counts(&dataset);
            return Ok(dataset);
        }

        let dataset = self.parse_reports(&reports)?;

        // A cache we cannot write only costs the next run a re-parse
        if let Err(e) = cache.write(&key, &dataset) {
            warn!(error = %format!("{:#}", e), "could not write cache");
        }

        Ok(dataset)
    }

    /// Parse `dir` without consulting or writing the cache.
    pub fn parse_dir(&self, dir: &Path) -> Result<Dataset> {
        let reports = read_reports(dir)?;
        self.parse_reports(&reports)
    }

    /// Parse uploaded `(file name, contents)` pairs.
    ///
    /// Each file is routed by the report code in its name. Names matching no
    /// report are skipped; a report uploaded twice keeps the later file. All
    /// four reports must be present.
    pub fn load_uploaded<R: Read>(
        &self,
        files: impl IntoIterator<Item = (String, R)>,
    ) -> Result<Dataset> {
        let mut builder = DatasetBuilder::new();
        let mut seen_any = false;

        for (file_name, mut reader) in files {
            seen_any = true;
            let kind = match detect_report(&file_name) {
                Ok(kind) => kind,
                Err(_) => {
                    warn!(file = %file_name, "upload matches no report code, skipping");
                    continue;
                }
            };
            if builder.has(kind) {
                warn!(file = %file_name, report = kind.name(), "report uploaded twice, keeping the later file");
            }

            let parser = get_parser_with(kind, &self.registry);
            let report = parser
                .parse_reader(&mut reader)
                .with_context(|| format!("Failed to parse upload: {}", file_name))?;
            info!(file = %file_name, report = kind.name(), rows = report.table.len(), "parsed upload");
            builder.insert(report.table, report.diagnostics);
        }

        if !seen_any {
            return Err(LoadError::NoUploads.into());
        }

        let dataset = builder.finish()?;
        log_row_counts(&dataset);
        Ok(dataset)
    }

    fn parse_reports(&self, reports: &[(ReportKind, Vec<u8>)]) -> Result<Dataset> {
        let mut builder = DatasetBuilder::new();

        for (kind, bytes) in reports {
            let parser = get_parser_with(*kind, &self.registry);
            let report = parser.parse_reader(&mut bytes.as_slice())?;
            debug!(
                report = kind.name(),
                lines = report.lines_read,
                rows = report.table.len(),
                "parsed report"
            );
            builder.insert(report.table, report.diagnostics);
        }

        let dataset = builder.finish()?;
        log_row_counts(&dataset);
        Ok(dataset)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

/// Read all four report files up front. The handles are closed before any
/// parsing starts.
fn read_reports(dir: &Path) -> Result<Vec<(ReportKind, Vec<u8>)>> {
    if !dir.is_dir() {
        return Err(LoadError::DataDirNotFound {
            candidates: vec![dir.to_path_buf()],
        }
        .into());
    }

    ReportKind::ALL
        .iter()
        .map(|kind| -> Result<(ReportKind, Vec<u8>)> {
            let path = dir.join(kind.file_name());
            if !path.is_file() {
                return Err(LoadError::ReportNotFound { kind: *kind, path }.into());
            }
            let bytes = fs::read(&path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            Ok((*kind, bytes))
        })
        .collect()
}

fn log_row_counts(dataset: &Dataset) {
    for (kind, rows) in dataset.row_counts() {
        info!(table = kind.table_name(), rows, "table ready");
    }
    if !dataset.diagnostics.is_empty() {
        warn!(count = dataset.diagnostics.len(), "parse diagnostics recorded");
    }
}

// ============================================================================
// CONVENIENCE ENTRY POINTS
// ============================================================================

/// Load `dir` with the default cache settings.
pub fn load(dir: &Path) -> Result<Dataset> {
    Loader::default().load_dir(dir)
}

/// Parse uploaded files with the default branch roster.
pub fn load_uploaded<R: Read>(files: impl IntoIterator<Item = (String, R)>) -> Result<Dataset> {
    Loader::default().load_uploaded(files)
}

// ============================================================================
// MEMOIZED DEFAULT DATASET
// ============================================================================

type InvalidationHook = Box<dyn Fn() -> bool + Send + Sync>;

/// Process-wide memo for the default dataset.
///
/// The first `get_or_load` runs the loader; later calls share the same
/// `Arc<Dataset>` until `invalidate` is called or the hook returns `true`.
/// Uploads never go through here.
pub struct DatasetCache {
    loader: Loader,
    slot: Mutex<Option<Arc<Dataset>>>,
    hook: Option<InvalidationHook>,
}

impl DatasetCache {
    pub fn new(loader: Loader) -> Self {
        DatasetCache {
            loader,
            slot: Mutex::new(None),
            hook: None,
        }
    }

    /// Hook consulted before every read; returning `true` drops the memo.
    pub fn with_invalidation_hook(mut self, hook: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn get_or_load(&self) -> Result<Arc<Dataset>> {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.hook.as_ref().map_or(false, |hook| hook()) {
            debug!("invalidation hook fired, dropping memoized dataset");
            *slot = None;
        }

        if let Some(dataset) = slot.as_ref() {
            return Ok(Arc::clone(dataset));
        }

        let dataset = Arc::new(self.loader.load()?);
        *slot = Some(Arc::clone(&dataset));
        Ok(dataset)
    }

    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

// ============================================================================
// TESTS
// ============================================================================
