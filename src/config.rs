//! Configuration types for table ingestion.
//!
//! All ingestion behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. One struct holds every knob so a config can
//! be cloned into blocking tasks, logged, and compared between runs.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ranked delimiter candidates tried by the sniffer.
///
/// `$` comes first and doubles as the fallback when no candidate is
/// consistent across the sample.
pub const DEFAULT_DELIMITERS: &[u8] = b"$;,\t|:";

/// Configuration for ingesting one upload.
///
/// # Example
/// ```rust
/// use tablesift::{IngestConfig, StagingNaming};
///
/// let config = IngestConfig::builder()
///     .staging_dir("/var/tmp/uploads")
///     .staging_naming(StagingNaming::Unique)
///     .converter_timeout_secs(Some(120))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory that receives staging files for the SAS readers. Created on
    /// demand. Default: `$TMPDIR/tablesift`.
    pub staging_dir: PathBuf,

    /// How staging files are named. Default: [`StagingNaming::Unique`].
    pub staging_naming: StagingNaming,

    /// Delimiters the sniffer tries, best first. Default: `$ ; , \t | :`.
    pub delimiter_candidates: Vec<u8>,

    /// Characters of decoded CSV content given to the sniffer. Default: 2048.
    pub sniff_sample_chars: usize,

    /// Executable used to turn CPORT libraries into transport files.
    /// Default: `stattransfer`.
    pub converter_program: String,

    /// Kill the converter after this many seconds. `None` waits forever.
    /// Default: 300.
    pub converter_timeout_secs: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            staging_dir: std::env::temp_dir().join("tablesift"),
            staging_naming: StagingNaming::default(),
            delimiter_candidates: DEFAULT_DELIMITERS.to_vec(),
            sniff_sample_chars: 2048,
            converter_program: "stattransfer".to_string(),
            converter_timeout_secs: Some(300),
        }
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = dir.into();
        self
    }

    pub fn staging_naming(mut self, naming: StagingNaming) -> Self {
        self.config.staging_naming = naming;
        self
    }

    pub fn delimiter_candidates(mut self, candidates: impl Into<Vec<u8>>) -> Self {
        self.config.delimiter_candidates = candidates.into();
        self
    }

    pub fn sniff_sample_chars(mut self, n: usize) -> Self {
        self.config.sniff_sample_chars = n;
        self
    }

    pub fn converter_program(mut self, program: impl Into<String>) -> Self {
        self.config.converter_program = program.into();
        self
    }

    pub fn converter_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.converter_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.delimiter_candidates.is_empty() {
            return Err(IngestError::InvalidConfig(
                "at least one delimiter candidate is required".into(),
            ));
        }
        if let Some(bad) = c
            .delimiter_candidates
            .iter()
            .find(|&&b| !b.is_ascii() || b == b'"' || b == b'\n' || b == b'\r')
        {
            return Err(IngestError::InvalidConfig(format!(
                "delimiter {:?} is not usable",
                *bad as char
            )));
        }
        if c.sniff_sample_chars == 0 {
            return Err(IngestError::InvalidConfig(
                "sniff sample must be at least 1 character".into(),
            ));
        }
        if c.converter_program.trim().is_empty() {
            return Err(IngestError::InvalidConfig(
                "converter program must not be empty".into(),
            ));
        }
        if c.converter_timeout_secs == Some(0) {
            return Err(IngestError::InvalidConfig(
                "converter timeout must be ≥ 1 second (or unset)".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Naming scheme for staging files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingNaming {
    /// `<uuid>_<filename>`: concurrent uploads of the same name never
    /// share a path. (default)
    #[default]
    Unique,
    /// The uploaded filename as-is; a UUID only when there is no name.
    /// Two concurrent uploads of the same name collide.
    FromFilename,
}
