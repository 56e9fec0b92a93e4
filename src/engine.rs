//! Triage engine
//!
//! Runs one request through the pipeline:
//! catalog → scanner → matcher → aggregator → `TriageResponse`.
//!
//! The engine itself only holds the default catalog, which is immutable and
//! shared by `Arc` between concurrent requests. All other state lives for
//! the duration of a single call.

use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::sync::Arc;
use tokio::io::AsyncBufRead;

use crate::aggregator::{MaxErrors, ResultAggregator, TriageResponse};
use crate::catalog::{CatalogSource, PatternCatalog};
use crate::config::Config;
use crate::error::TriageError;
use crate::matcher::{match_line, MatchOptions};
use crate::scanner::{AsyncLogScanner, LogScanner};

/// Lines between cooperative yields in the async pipeline
const YIELD_EVERY: usize = 1024;

/// Input of a single triage run
pub struct TriageRequest<R> {
    /// Log content
    pub log: R,

    /// Label echoed back in the response
    pub log_filename: String,

    /// Custom catalog; the engine's default is used when absent
    pub catalog: Option<CatalogSource>,

    /// Unvalidated result cap
    pub max_errors: Option<i64>,
}

impl<R> TriageRequest<R> {
    pub fn new(log: R, log_filename: impl Into<String>) -> Self {
        Self {
            log,
            log_filename: log_filename.into(),
            catalog: None,
            max_errors: None,
        }
    }

    pub fn with_catalog(mut self, catalog: CatalogSource) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_max_errors(mut self, max_errors: i64) -> Self {
        self.max_errors = Some(max_errors);
        self
    }
}

/// Result of checking a catalog without scanning a log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogValidation {
    pub valid: bool,
    pub mappings_count: usize,
    pub skipped_rows: usize,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Log triage matching engine
pub struct TriageEngine {
    default_catalog: Arc<PatternCatalog>,
    options: MatchOptions,
    progress_interval: usize,
}

impl TriageEngine {
    /// Create an engine around an already-loaded default catalog
    pub fn new(default_catalog: Arc<PatternCatalog>) -> Self {
        let options = default_catalog.options();
        Self {
            default_catalog,
            options,
            progress_interval: 10_000,
        }
    }

    /// Build an engine from configuration, loading its default catalog
    pub fn from_config(config: &Config) -> Result<Self, TriageError> {
        Self::from_config_with(config, None)
    }

    /// Build an engine around `custom` when given, so the configured default
    /// catalog is only loaded when it will actually be used
    pub fn from_config_with(
        config: &Config,
        custom: Option<&CatalogSource>,
    ) -> Result<Self, TriageError> {
        let catalog = match custom {
            Some(source) => PatternCatalog::load(source, config.match_options())?,
            None => config.load_default_catalog()?,
        };
        Ok(Self::new(Arc::new(catalog)).with_progress_interval(config.settings.progress_interval))
    }

    pub fn with_progress_interval(mut self, lines: usize) -> Self {
        self.progress_interval = lines.max(1);
        self
    }

    pub fn default_catalog(&self) -> &Arc<PatternCatalog> {
        &self.default_catalog
    }

    /// Validate parameters and resolve the catalog before touching the log
    fn prepare(
        &self,
        max_errors: Option<i64>,
        catalog: Option<&CatalogSource>,
    ) -> Result<(Option<MaxErrors>, Arc<PatternCatalog>), TriageError> {
        let max_errors = max_errors.map(MaxErrors::new).transpose()?;

        let catalog = match catalog {
            Some(source) => Arc::new(PatternCatalog::load(source, self.options)?),
            None => Arc::clone(&self.default_catalog),
        };

        Ok((max_errors, catalog))
    }

    fn report_progress(&self, lines: usize) {
        if lines % self.progress_interval == 0 {
            tracing::debug!("Processed {} lines...", lines);
        }
    }

    fn finish(
        aggregator: ResultAggregator,
        log_filename: String,
        catalog: &PatternCatalog,
        lines: usize,
    ) -> TriageResponse {
        let response = aggregator.finish(log_filename, catalog.len());
        tracing::info!(
            "Triage of '{}' complete: {} lines, {} errors found, {} displayed",
            response.log_filename,
            lines,
            response.total_errors,
            response.displayed_errors
        );
        response
    }

    /// Run a triage over a blocking reader
    pub fn triage<R: BufRead>(
        &self,
        request: TriageRequest<R>,
    ) -> Result<TriageResponse, TriageError> {
        let (max_errors, catalog) = self.prepare(request.max_errors, request.catalog.as_ref())?;

        tracing::info!(
            "Scanning '{}' against {} mappings from '{}'",
            request.log_filename,
            catalog.len(),
            catalog.name()
        );

        let mut aggregator = ResultAggregator::new(max_errors);
        let mut scanner = LogScanner::new(request.log);

        for line in &mut scanner {
            let line = line?;
            if let Some(record) = match_line(&line, &catalog) {
                aggregator.push(record);
            }
            self.report_progress(line.line_number);
        }

        Ok(Self::finish(
            aggregator,
            request.log_filename,
            &catalog,
            scanner.lines_read(),
        ))
    }

    /// Run a triage over a tokio reader
    ///
    /// Dropping the returned future stops reading and discards everything
    /// aggregated so far.
    pub async fn triage_async<R: AsyncBufRead + Unpin>(
        &self,
        request: TriageRequest<R>,
    ) -> Result<TriageResponse, TriageError> {
        let (max_errors, catalog) = self.prepare(request.max_errors, request.catalog.as_ref())?;

        tracing::info!(
            "Scanning '{}' against {} mappings from '{}'",
            request.log_filename,
            catalog.len(),
            catalog.name()
        );

        let mut aggregator = ResultAggregator::new(max_errors);
        let mut scanner = AsyncLogScanner::new(request.log);

        while let Some(line) = scanner.next_line().await? {
            if let Some(record) = match_line(&line, &catalog) {
                aggregator.push(record);
            }
            self.report_progress(line.line_number);

            if line.line_number % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        Ok(Self::finish(
            aggregator,
            request.log_filename,
            &catalog,
            scanner.lines_read(),
        ))
    }

    /// Check that a catalog loads and report how many mappings it holds
    pub fn validate_catalog(&self, source: &CatalogSource) -> CatalogValidation {
        validate_catalog(source, self.options)
    }
}

/// Check a catalog without needing an engine or its default catalog
pub fn validate_catalog(source: &CatalogSource, options: MatchOptions) -> CatalogValidation {
    match PatternCatalog::load(source, options) {
        Ok(catalog) => CatalogValidation {
            valid: true,
            mappings_count: catalog.len(),
            skipped_rows: catalog.report().skipped.len(),
            filename: source.name.clone(),
            error: None,
        },
        Err(e) => {
            tracing::warn!("Catalog '{}' failed validation: {}", source.name, e);
            CatalogValidation {
                valid: false,
                mappings_count: 0,
                skipped_rows: 0,
                filename: source.name.clone(),
                error: Some(e.to_string()),
            }
        }
    }
}
