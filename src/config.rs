//! Configuration types for statement extraction.
//!
//! Every knob lives in [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The library never reads the environment on
//! its own: the API key and page range are plain values passed in by the
//! caller, which keeps the pipeline testable without a live credential.

use crate::error::StatementError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Default Anthropic API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";

/// Configuration for a statement extraction.
///
/// # Example
/// ```rust
/// use edgequake_statement::{ExtractionConfig, PageSelection};
///
/// let config = ExtractionConfig::builder()
///     .api_key("sk-ant-...")
///     .pages(PageSelection::Trim { leading: 2, trailing: 2 })
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Anthropic API key. Used by the built-in Anthropic client when neither
    /// `provider` nor `provider_name` is set.
    pub api_key: Option<String>,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Named edgequake-llm provider ("openai", "gemini", "ollama", …).
    /// When set, the provider reads its own credentials.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over everything else.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Maximum tokens the model may generate. Default: 4000.
    ///
    /// A statement table is a single reply for the whole document, so this
    /// bounds the number of transactions that fit in one extraction.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.0 (transcription, not creativity).
    pub temperature: f32,

    /// System prompt override. If None, uses [`crate::prompts::SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Pages sent to the model. Default: all pages.
    pub pages: PageSelection,

    /// Longest rendered edge in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted statements.
    pub password: Option<String>,

    /// Directory (or full path) of the pdfium shared library. Falls back to
    /// the working directory and then the system library search path.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Base URL of the Anthropic Messages API. Default: [`DEFAULT_API_BASE_URL`].
    pub api_base_url: String,

    /// Timeout for the extraction request. Default: None (wait indefinitely).
    pub api_timeout_secs: Option<u64>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Fail with [`StatementError::TableNotFound`] instead of returning an
    /// empty record set when the reply has no header row. Default: false.
    pub require_table: bool,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            max_tokens: 4000,
            temperature: 0.0,
            system_prompt: None,
            pages: PageSelection::default(),
            max_rendered_pixels: 2000,
            password: None,
            pdfium_lib_path: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout_secs: None,
            download_timeout_secs: 120,
            require_table: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("pages", &self.pages)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("api_base_url", &self.api_base_url)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("require_table", &self.require_table)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 1.0);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn require_table(mut self, v: bool) -> Self {
        self.config.require_table = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, StatementError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(StatementError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(StatementError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if let Some(key) = &c.api_key {
            if key.trim().is_empty() {
                return Err(StatementError::InvalidConfig("api_key must not be blank".into()));
            }
        }
        if !(c.api_base_url.starts_with("http://") || c.api_base_url.starts_with("https://")) {
            return Err(StatementError::InvalidConfig(format!(
                "api_base_url must be an HTTP(S) URL, got '{}'",
                c.api_base_url
            )));
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(StatementError::InvalidConfig(format!(
                    "invalid page range {start}-{end}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of the statement are sent to the model.
///
/// Bank statements usually open with summary pages and close with legal
/// boilerplate; `Trim` expresses "from page 3 to the last-but-two" without
/// knowing the page count up front.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
    /// Skip `leading` pages at the start and `trailing` pages at the end.
    Trim { leading: usize, trailing: usize },
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
            PageSelection::Trim { leading, trailing } => {
                let end = total_pages.saturating_sub(*trailing);
                (*leading..end).collect()
            }
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::All => write!(f, "all pages"),
            PageSelection::Single(p) => write!(f, "page {p}"),
            PageSelection::Range(s, e) => write!(f, "pages {s}-{e}"),
            PageSelection::Set(pages) => {
                let list: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
                write!(f, "pages {}", list.join(","))
            }
            PageSelection::Trim { leading, trailing } => {
                write!(f, "all but the first {leading} and last {trailing} pages")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_single_shot_extraction() {
        let c = ExtractionConfig::default();
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.max_tokens, 4000);
        assert_eq!(c.temperature, 0.0);
        assert!(c.api_timeout_secs.is_none());
        assert!(!c.require_table);
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = ExtractionConfig::builder()
            .api_key("sk-ant-secret")
            .password("hunter2")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-ant-secret"));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn build_rejects_blank_key() {
        let err = ExtractionConfig::builder().api_key("   ").build().unwrap_err();
        assert!(matches!(err, StatementError::InvalidConfig(_)));
    }

    #[test]
    fn build_rejects_inverted_range() {
        let err = ExtractionConfig::builder()
            .pages(PageSelection::Range(6, 3))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("6-3"));
    }

    #[test]
    fn trim_selects_middle_pages() {
        // 8-page statement, skip 2 summary pages and 2 legal pages → pages 3..=6
        let sel = PageSelection::Trim {
            leading: 2,
            trailing: 2,
        };
        assert_eq!(sel.to_indices(8), vec![2, 3, 4, 5]);
    }

    #[test]
    fn trim_larger_than_document_is_empty() {
        let sel = PageSelection::Trim {
            leading: 3,
            trailing: 3,
        };
        assert!(sel.to_indices(4).is_empty());
    }

    #[test]
    fn range_and_set_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Range(3, 10).to_indices(4), vec![2, 3]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(5), vec![0, 2]);
        assert_eq!(PageSelection::Single(9).to_indices(4), Vec::<usize>::new());
    }
}
