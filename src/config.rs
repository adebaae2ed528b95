//! Configuration types for document conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Merging PDFs needs no configuration;
//! only the DOCX path (render retries, pacing, style map) and progress
//! reporting are tunable.

use crate::docx::StyleMap;
use crate::error::StitchError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Largest number of render attempts; the retry ladder has three entries.
pub const MAX_RENDER_ATTEMPTS: usize = 3;

/// Configuration for a conversion call.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_stitch::{ConversionConfig, Pacing};
///
/// let config = ConversionConfig::builder()
///     .max_render_attempts(2)
///     .pacing(Pacing::none())
///     .build()
///     .unwrap();
/// assert_eq!(config.max_render_attempts, 2);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Render attempts per DOCX file. Range: 1–3. Default: 3.
    ///
    /// Each attempt walks one step down the scale ladder (2.0, 1.5, 1.0).
    /// Lower scales need less memory in the rendering engine, so a document
    /// that fails at 2× often succeeds at 1×.
    pub max_render_attempts: usize,

    /// Delays inserted around rendering. Default: [`Pacing::default()`].
    pub pacing: Pacing,

    /// Upper bound on waiting for staged images to load, in ms. Default: 10 000.
    ///
    /// Images that neither load nor fail within this window are rendered
    /// as they are; the wait never fails the conversion.
    pub image_wait_timeout_ms: u64,

    /// Paragraph-style to HTML-element rules for the DOCX converter.
    pub style_map: StyleMap,

    /// Optional per-file progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_render_attempts: MAX_RENDER_ATTEMPTS,
            pacing: Pacing::default(),
            image_wait_timeout_ms: 10_000,
            style_map: StyleMap::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_render_attempts", &self.max_render_attempts)
            .field("pacing", &self.pacing)
            .field("image_wait_timeout_ms", &self.image_wait_timeout_ms)
            .field("style_map", &format_args!("<{} rules>", self.style_map.len()))
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn image_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.image_wait_timeout_ms)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    /// Number of render attempts; validated by [`build`](Self::build).
    pub fn max_render_attempts(mut self, n: usize) -> Self {
        self.config.max_render_attempts = n;
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.config.pacing = pacing;
        self
    }

    pub fn image_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.config.image_wait_timeout_ms = ms;
        self
    }

    pub fn style_map(mut self, map: StyleMap) -> Self {
        self.config.style_map = map;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, StitchError> {
        let c = &self.config;
        if c.max_render_attempts == 0 || c.max_render_attempts > MAX_RENDER_ATTEMPTS {
            return Err(StitchError::InvalidConfig(format!(
                "max_render_attempts must be 1–{}, got {}",
                MAX_RENDER_ATTEMPTS, c.max_render_attempts
            )));
        }
        Ok(self.config)
    }
}

// ── Pacing ───────────────────────────────────────────────────────────────

/// Delays the DOCX path inserts to let the layout engine catch up.
///
/// Attempt-dependent delays grow linearly: `base + step × attempt`.
/// [`Pacing::none()`] zeroes everything, which is what tests want.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Settle delay before touching the element, base part.
    pub settle_base_ms: u64,
    /// Settle delay growth per attempt.
    pub settle_step_ms: u64,
    /// Delay after forcing the element visible, base part.
    pub reveal_base_ms: u64,
    /// Reveal delay growth per attempt.
    pub reveal_step_ms: u64,
    /// Pause between two render attempts.
    pub retry_delay_ms: u64,
    /// Settle after staged images finished loading.
    pub image_settle_ms: u64,
    /// Settle after staging when the content has no images.
    pub no_image_settle_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle_base_ms: 300,
            settle_step_ms: 100,
            reveal_base_ms: 200,
            reveal_step_ms: 100,
            retry_delay_ms: 300,
            image_settle_ms: 300,
            no_image_settle_ms: 500,
        }
    }
}

impl Pacing {
    /// No delays at all.
    pub fn none() -> Self {
        Self {
            settle_base_ms: 0,
            settle_step_ms: 0,
            reveal_base_ms: 0,
            reveal_step_ms: 0,
            retry_delay_ms: 0,
            image_settle_ms: 0,
            no_image_settle_ms: 0,
        }
    }

    pub fn settle(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.settle_base_ms + self.settle_step_ms * attempt as u64)
    }

    pub fn reveal(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.reveal_base_ms + self.reveal_step_ms * attempt as u64)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn image_settle(&self, had_images: bool) -> Duration {
        if had_images {
            Duration::from_millis(self.image_settle_ms)
        } else {
            Duration::from_millis(self.no_image_settle_ms)
        }
    }
}

/// Sleep for `d`, skipping the timer entirely for zero durations.
pub(crate) async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}
