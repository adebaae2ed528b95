//! Stage: HTML rasterization with a scale ladder.
//!
//! Wraps [`RenderHost::render`] with the dance a staged, off-screen container
//! needs before it can be painted: bring it on screen, make it opaque, give
//! the layout engine time to settle, measure it, then paint. Whatever
//! happens, the container's inline style is put back the way it was.
//!
//! ## Retry ladder
//!
//! Rendering engines fail on large canvases, so each retry drops the scale:
//!
//! | attempt | scale | explicit size hints |
//! |---------|-------|---------------------|
//! | 0       | 2.0   | measured size, window = size + 40 |
//! | 1       | 1.5   | none |
//! | 2+      | 1.0   | none |

use crate::config::{pause, ConversionConfig, Pacing};
use crate::error::StitchError;
use crate::host::{ClonedTree, RenderHost, RenderOptions, StagedElement, StyleDecl};
use crate::stylesheet::TOP_Z_INDEX;
use image::RgbaImage;
use tracing::{debug, info, warn};

/// Inline style properties saved before rendering and restored afterwards.
pub const SNAPSHOT_PROPERTIES: [&str; 5] = ["transform", "z-index", "opacity", "visibility", "display"];

/// Extra window size given to the layout engine on the first attempt.
const WINDOW_MARGIN_PX: u32 = 40;

/// A raster produced by one render attempt, with the scale it was painted at.
///
/// Every downstream pixel → mm conversion must use `scale`.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub pixels: RgbaImage,
    pub scale: f64,
}

impl RasterImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// One rung of the retry ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderEntry {
    pub scale: f64,
    /// Pass the measured size and a window hint to the host.
    pub explicit_size: bool,
}

const LADDER: [LadderEntry; 3] = [
    LadderEntry {
        scale: 2.0,
        explicit_size: true,
    },
    LadderEntry {
        scale: 1.5,
        explicit_size: false,
    },
    LadderEntry {
        scale: 1.0,
        explicit_size: false,
    },
];

/// Ladder entry used by `attempt` (0-based); attempts past the end reuse the last.
pub fn ladder_entry(attempt: usize) -> LadderEntry {
    LADDER[attempt.min(LADDER.len() - 1)]
}

/// Clone hook: untransformed, static, opaque, visible, displayed; every
/// descendant visible and opaque.
pub fn force_visible_clone(tree: &mut dyn ClonedTree) {
    tree.set_container_style(&[
        StyleDecl::new("transform", "none"),
        StyleDecl::new("opacity", "1"),
        StyleDecl::new("visibility", "visible"),
        StyleDecl::new("display", "block"),
        StyleDecl::new("position", "static"),
    ]);
    tree.set_descendant_styles(&[
        StyleDecl::new("visibility", "visible"),
        StyleDecl::new("opacity", "1"),
    ]);
}

fn reveal_styles() -> [StyleDecl; 5] {
    [
        StyleDecl::new("transform", "translateX(0) translateY(0)"),
        StyleDecl::new("z-index", TOP_Z_INDEX),
        StyleDecl::new("opacity", "1"),
        StyleDecl::new("visibility", "visible"),
        StyleDecl::new("display", "block"),
    ]
}

fn failed(detail: impl Into<String>) -> StitchError {
    StitchError::Rasterization {
        attempts: 1,
        detail: detail.into(),
    }
}

fn failure_detail(err: StitchError) -> String {
    match err {
        StitchError::Rasterization { detail, .. } => detail,
        other => other.to_string(),
    }
}

/// Build the host options for `attempt` given the measured size.
pub fn render_options(attempt: usize, width: u32, height: u32) -> RenderOptions {
    let entry = ladder_entry(attempt);
    let (w, h, ww, wh) = if entry.explicit_size {
        (
            Some(width),
            Some(height),
            Some(width + WINDOW_MARGIN_PX),
            Some(height + WINDOW_MARGIN_PX),
        )
    } else {
        (None, None, None, None)
    };
    RenderOptions {
        scale: entry.scale,
        background: "#ffffff".to_string(),
        width: w,
        height: h,
        window_width: ww,
        window_height: wh,
        on_clone: Some(force_visible_clone),
    }
}

/// Run one render attempt against a staged element.
///
/// The element's inline `transform`, `z-index`, `opacity`, `visibility` and
/// `display` are restored before returning, on success and on failure.
pub async fn rasterize<H: RenderHost>(
    host: &mut H,
    element: &StagedElement,
    attempt: usize,
    pacing: &Pacing,
) -> Result<RasterImage, StitchError> {
    pause(pacing.settle(attempt)).await;

    let mut snapshot = Vec::with_capacity(SNAPSHOT_PROPERTIES.len());
    for prop in SNAPSHOT_PROPERTIES {
        let value = host
            .style(element, prop)
            .await
            .map_err(|e| failed(format!("reading '{prop}': {}", e.message())))?;
        snapshot.push(StyleDecl::new(prop, value));
    }

    let result = paint_revealed(host, element, attempt, pacing).await;

    if let Err(e) = host.set_style(element, &snapshot).await {
        warn!("Could not restore container style after render: {}", e);
    }
    result
}

async fn paint_revealed<H: RenderHost>(
    host: &mut H,
    element: &StagedElement,
    attempt: usize,
    pacing: &Pacing,
) -> Result<RasterImage, StitchError> {
    host.set_style(element, &reveal_styles())
        .await
        .map_err(|e| failed(e.message()))?;
    pause(pacing.reveal(attempt)).await;

    let metrics = host.measure(element).await.map_err(|e| failed(e.message()))?;
    let (width, height) = metrics.content_size();
    if width == 0 || height == 0 {
        return Err(failed(format!(
            "element has zero size ({width}×{height} px)"
        )));
    }

    let options = render_options(attempt, width, height);
    debug!(
        "Render attempt {}: {}×{} px at scale {}",
        attempt + 1,
        width,
        height,
        options.scale
    );

    let pixels = host
        .render(element, &options)
        .await
        .map_err(|e| failed(e.message()))?;
    if pixels.width() == 0 || pixels.height() == 0 {
        return Err(failed("host returned an empty raster"));
    }

    Ok(RasterImage {
        pixels,
        scale: options.scale,
    })
}

/// Rasterize with up to `config.max_render_attempts` attempts, walking down
/// the scale ladder. Only the last failure is reported.
pub async fn rasterize_with_retry<H: RenderHost>(
    host: &mut H,
    element: &StagedElement,
    config: &ConversionConfig,
) -> Result<RasterImage, StitchError> {
    let attempts = config.max_render_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            warn!(
                "Render retry {}/{} at scale {}",
                attempt,
                attempts - 1,
                ladder_entry(attempt).scale
            );
            pause(config.pacing.retry_delay()).await;
        }

        match rasterize(host, element, attempt, &config.pacing).await {
            Ok(raster) => {
                if attempt > 0 {
                    info!("Render succeeded on attempt {}", attempt + 1);
                }
                return Ok(raster);
            }
            Err(e) => {
                let detail = failure_detail(e);
                warn!("Render attempt {} failed: {}", attempt + 1, detail);
                last_err = Some(detail);
            }
        }
    }

    Err(StitchError::Rasterization {
        attempts,
        detail: last_err.unwrap_or_else(|| "no render attempt was made".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::{
        ElementMetrics, ImageLoadReport, StageRequest, StyleRecorder,
    };
    use image::Rgba;
    use std::collections::HashMap;

    struct ScriptedHost {
        styles: HashMap<String, String>,
        metrics: ElementMetrics,
        fail_renders: usize,
        options: Vec<RenderOptions>,
    }

    impl ScriptedHost {
        fn new(width: u32, height: u32) -> Self {
            let mut styles = HashMap::new();
            styles.insert("transform".into(), "translateX(-10000px)".into());
            styles.insert("opacity".into(), "1".into());
            Self {
                styles,
                metrics: ElementMetrics {
                    scroll_width: width,
                    scroll_height: height,
                    offset_width: width,
                    offset_height: height,
                    text_len: 10,
                    image_count: 0,
                },
                fail_renders: 0,
                options: Vec::new(),
            }
        }
    }

    impl RenderHost for ScriptedHost {
        async fn stage(&mut self, _: &StageRequest<'_>) -> Result<StagedElement, HostError> {
            Ok(StagedElement::new(1))
        }

        async fn style(&mut self, _: &StagedElement, p: &str) -> Result<String, HostError> {
            Ok(self.styles.get(p).cloned().unwrap_or_default())
        }

        async fn set_style(&mut self, _: &StagedElement, decls: &[StyleDecl]) -> Result<(), HostError> {
            for d in decls {
                if d.value.is_empty() {
                    self.styles.remove(&d.property);
                } else {
                    self.styles.insert(d.property.clone(), d.value.clone());
                }
            }
            Ok(())
        }

        async fn measure(&mut self, _: &StagedElement) -> Result<ElementMetrics, HostError> {
            Ok(self.metrics)
        }

        async fn wait_for_images(&mut self, _: &StagedElement) -> Result<ImageLoadReport, HostError> {
            Ok(ImageLoadReport::default())
        }

        async fn render(&mut self, _: &StagedElement, o: &RenderOptions) -> Result<RgbaImage, HostError> {
            self.options.push(o.clone());
            assert_eq!(self.styles.get("transform").map(String::as_str), Some("translateX(0) translateY(0)"));
            if self.fail_renders > 0 {
                self.fail_renders -= 1;
                return Err(HostError::new("canvas too large"));
            }
            let w = (self.metrics.scroll_width as f64 * o.scale) as u32;
            let h = (self.metrics.scroll_height as f64 * o.scale) as u32;
            Ok(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
        }

        async fn unstage(&mut self, _: StagedElement) -> Result<(), HostError> {
            Ok(())
        }
    }

    #[test]
    fn ladder_is_clamped() {
        assert_eq!(ladder_entry(0).scale, 2.0);
        assert!(ladder_entry(0).explicit_size);
        assert_eq!(ladder_entry(1).scale, 1.5);
        assert_eq!(ladder_entry(2).scale, 1.0);
        assert_eq!(ladder_entry(7).scale, 1.0);
    }

    #[test]
    fn first_attempt_passes_size_hints() {
        let o = render_options(0, 683, 400);
        assert_eq!((o.width, o.height), (Some(683), Some(400)));
        assert_eq!((o.window_width, o.window_height), (Some(723), Some(440)));
        let o = render_options(1, 683, 400);
        assert_eq!(o.width, None);
        assert_eq!(o.window_width, None);
    }

    #[test]
    fn clone_hook_forces_visibility() {
        let mut rec = StyleRecorder::default();
        force_visible_clone(&mut rec);
        assert!(rec.container.contains(&StyleDecl::new("position", "static")));
        assert!(rec.container.contains(&StyleDecl::new("transform", "none")));
        assert!(rec.descendants.contains(&StyleDecl::new("opacity", "1")));
    }

    #[tokio::test]
    async fn snapshot_restored_after_success() {
        let mut host = ScriptedHost::new(683, 300);
        let el = StagedElement::new(1);
        let raster = rasterize(&mut host, &el, 0, &Pacing::none()).await.unwrap();
        assert_eq!(raster.scale, 2.0);
        assert_eq!((raster.width(), raster.height()), (1366, 600));
        assert_eq!(host.styles.get("transform").map(String::as_str), Some("translateX(-10000px)"));
        assert!(!host.styles.contains_key("display"));
        assert!(!host.styles.contains_key("z-index"));
    }

    #[tokio::test]
    async fn snapshot_restored_after_failure() {
        let mut host = ScriptedHost::new(683, 300);
        host.fail_renders = 1;
        let el = StagedElement::new(1);
        let err = rasterize(&mut host, &el, 0, &Pacing::none()).await.unwrap_err();
        assert!(matches!(err, StitchError::Rasterization { .. }));
        assert_eq!(host.styles.get("transform").map(String::as_str), Some("translateX(-10000px)"));
    }

    #[tokio::test]
    async fn zero_size_fails_without_rendering() {
        let mut host = ScriptedHost::new(0, 0);
        let el = StagedElement::new(1);
        let err = rasterize(&mut host, &el, 0, &Pacing::none()).await.unwrap_err();
        assert!(err.to_string().contains("zero size"), "got: {err}");
        assert!(host.options.is_empty());
    }

    #[tokio::test]
    async fn retry_walks_down_the_ladder() {
        let mut host = ScriptedHost::new(683, 300);
        host.fail_renders = 1;
        let config = ConversionConfig::builder().pacing(Pacing::none()).build().unwrap();
        let el = StagedElement::new(1);
        let raster = rasterize_with_retry(&mut host, &el, &config).await.unwrap();
        assert_eq!(raster.scale, 1.5);
        let scales: Vec<f64> = host.options.iter().map(|o| o.scale).collect();
        assert_eq!(scales, vec![2.0, 1.5]);
    }

    #[tokio::test]
    async fn retry_reports_last_failure() {
        let mut host = ScriptedHost::new(683, 300);
        host.fail_renders = 5;
        let config = ConversionConfig::builder()
            .pacing(Pacing::none())
            .max_render_attempts(2)
            .build()
            .unwrap();
        let el = StagedElement::new(1);
        let err = rasterize_with_retry(&mut host, &el, &config).await.unwrap_err();
        match err {
            StitchError::Rasterization { attempts, detail } => {
                assert_eq!(attempts, 2);
                assert!(detail.contains("canvas too large"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(host.options.len(), 2);
    }
}
