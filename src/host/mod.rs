//! HTML rasterization capability.
//!
//! The DOCX path needs something that can lay out HTML and paint it into
//! pixels. That something sits behind the [`RenderHost`] trait: the pipeline
//! stages a container element, pokes at its inline style, measures it, and
//! asks for a raster. Hosts are used exclusively (`&mut self`) for the whole
//! lifetime of a staged element, and the element handle is consumed by
//! [`RenderHost::unstage`] so it cannot be used afterwards.
//!
//! Two hosts ship with the crate:
//!
//! * [`NoRenderHost`] — fails every call. Used when no rendering engine is
//!   available; images and PDFs still convert.
//! * `ChromeHost` (feature `headless`) — drives headless Chrome.

use crate::error::HostError;
use image::RgbaImage;

#[cfg(feature = "headless")]
mod chrome;

#[cfg(feature = "headless")]
pub use chrome::ChromeHost;

/// Opaque handle to an element staged by a [`RenderHost`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StagedElement {
    id: u64,
}

impl StagedElement {
    /// Hosts mint handles with their own identifiers.
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// One CSS declaration. An empty value removes the property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleDecl {
    pub property: String,
    pub value: String,
}

impl StyleDecl {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }

    /// Render as `property: value`.
    pub fn to_css(&self) -> String {
        format!("{}: {}", self.property, self.value)
    }
}

/// Render a declaration list as an inline `style` attribute value.
pub fn css_text(decls: &[StyleDecl]) -> String {
    decls
        .iter()
        .filter(|d| !d.value.is_empty())
        .map(StyleDecl::to_css)
        .collect::<Vec<_>>()
        .join("; ")
}

/// What to put into the host's document.
#[derive(Debug, Clone, Copy)]
pub struct StageRequest<'a> {
    /// Inner HTML of the container.
    pub html: &'a str,
    /// Stylesheet installed alongside the container, removed with it.
    pub stylesheet: &'a str,
    /// Class given to the container; the stylesheet is scoped to it.
    pub container_class: &'a str,
    /// Inline style of the container.
    pub container_style: &'a [StyleDecl],
}

/// Layout measurements of a staged element, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementMetrics {
    pub scroll_width: u32,
    pub scroll_height: u32,
    pub offset_width: u32,
    pub offset_height: u32,
    /// Length of the trimmed text content.
    pub text_len: usize,
    /// Number of descendant `img` elements.
    pub image_count: usize,
}

impl ElementMetrics {
    /// Scroll size, falling back to offset size per axis when zero.
    pub fn content_size(&self) -> (u32, u32) {
        let w = if self.scroll_width > 0 {
            self.scroll_width
        } else {
            self.offset_width
        };
        let h = if self.scroll_height > 0 {
            self.scroll_height
        } else {
            self.offset_height
        };
        (w, h)
    }
}

/// Outcome of waiting for descendant images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageLoadReport {
    pub total: usize,
    pub loaded: usize,
    pub failed: usize,
}

/// The render-time copy of a staged element.
///
/// Hosts that render from a cloned tree hand the clone to
/// [`RenderOptions::on_clone`] before painting; the hook may only restyle it.
pub trait ClonedTree {
    /// Apply declarations to the cloned container itself.
    fn set_container_style(&mut self, decls: &[StyleDecl]);
    /// Apply declarations to every descendant of the cloned container.
    fn set_descendant_styles(&mut self, decls: &[StyleDecl]);
}

/// A [`ClonedTree`] that only records what the hook asked for.
///
/// Hosts that paint the live tree run the hook against a recorder and apply
/// the recorded declarations themselves.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StyleRecorder {
    pub container: Vec<StyleDecl>,
    pub descendants: Vec<StyleDecl>,
}

impl ClonedTree for StyleRecorder {
    fn set_container_style(&mut self, decls: &[StyleDecl]) {
        self.container.extend_from_slice(decls);
    }

    fn set_descendant_styles(&mut self, decls: &[StyleDecl]) {
        self.descendants.extend_from_slice(decls);
    }
}

/// Hook run on the cloned tree before painting.
pub type CloneHook = fn(&mut dyn ClonedTree);

/// Parameters of one [`RenderHost::render`] call.
#[derive(Clone)]
pub struct RenderOptions {
    /// Device pixels per CSS pixel.
    pub scale: f64,
    /// Background colour painted under the element, CSS syntax.
    pub background: String,
    /// Explicit capture width in CSS pixels.
    pub width: Option<u32>,
    /// Explicit capture height in CSS pixels.
    pub height: Option<u32>,
    /// Layout viewport width hint.
    pub window_width: Option<u32>,
    /// Layout viewport height hint.
    pub window_height: Option<u32>,
    pub on_clone: Option<CloneHook>,
}

impl std::fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOptions")
            .field("scale", &self.scale)
            .field("background", &self.background)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("window_width", &self.window_width)
            .field("window_height", &self.window_height)
            .field("on_clone", &self.on_clone.map(|_| "<fn>"))
            .finish()
    }
}

impl RenderOptions {
    /// Run the clone hook, if any, against `tree`.
    pub fn apply_clone_hook(&self, tree: &mut dyn ClonedTree) {
        if let Some(hook) = self.on_clone {
            hook(tree);
        }
    }
}

/// A layout engine able to stage HTML and paint it.
///
/// Style reads return the element's inline value, or an empty string when
/// the property is unset.
#[allow(async_fn_in_trait)]
pub trait RenderHost {
    /// Insert a container holding `request.html` plus its stylesheet.
    async fn stage(&mut self, request: &StageRequest<'_>) -> Result<StagedElement, HostError>;

    /// Read one inline style property.
    async fn style(&mut self, element: &StagedElement, property: &str)
        -> Result<String, HostError>;

    /// Set inline style properties; empty values remove them.
    async fn set_style(
        &mut self,
        element: &StagedElement,
        decls: &[StyleDecl],
    ) -> Result<(), HostError>;

    async fn measure(&mut self, element: &StagedElement) -> Result<ElementMetrics, HostError>;

    /// Resolve once every descendant image has loaded or failed.
    ///
    /// Callers bound this with a timeout; hosts need not.
    async fn wait_for_images(
        &mut self,
        element: &StagedElement,
    ) -> Result<ImageLoadReport, HostError>;

    /// Paint the element into an RGBA raster.
    async fn render(
        &mut self,
        element: &StagedElement,
        options: &RenderOptions,
    ) -> Result<RgbaImage, HostError>;

    /// Remove the container and its stylesheet.
    async fn unstage(&mut self, element: StagedElement) -> Result<(), HostError>;
}

/// A host without a rendering engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRenderHost;

impl NoRenderHost {
    fn unavailable() -> HostError {
        HostError::new(
            "no HTML rendering engine is available; \
rebuild with `--features headless` to convert DOCX files",
        )
    }
}

impl RenderHost for NoRenderHost {
    async fn stage(&mut self, _request: &StageRequest<'_>) -> Result<StagedElement, HostError> {
        Err(Self::unavailable())
    }

    async fn style(&mut self, _: &StagedElement, _: &str) -> Result<String, HostError> {
        Err(Self::unavailable())
    }

    async fn set_style(&mut self, _: &StagedElement, _: &[StyleDecl]) -> Result<(), HostError> {
        Err(Self::unavailable())
    }

    async fn measure(&mut self, _: &StagedElement) -> Result<ElementMetrics, HostError> {
        Err(Self::unavailable())
    }

    async fn wait_for_images(&mut self, _: &StagedElement) -> Result<ImageLoadReport, HostError> {
        Err(Self::unavailable())
    }

    async fn render(&mut self, _: &StagedElement, _: &RenderOptions) -> Result<RgbaImage, HostError> {
        Err(Self::unavailable())
    }

    async fn unstage(&mut self, _: StagedElement) -> Result<(), HostError> {
        Err(Self::unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_size_falls_back_per_axis() {
        let m = ElementMetrics {
            scroll_width: 0,
            scroll_height: 900,
            offset_width: 683,
            offset_height: 880,
            ..Default::default()
        };
        assert_eq!(m.content_size(), (683, 900));
    }

    #[test]
    fn css_text_skips_removals() {
        let decls = [
            StyleDecl::new("opacity", "1"),
            StyleDecl::new("transform", ""),
            StyleDecl::new("z-index", "999999"),
        ];
        assert_eq!(css_text(&decls), "opacity: 1; z-index: 999999");
    }

    #[test]
    fn recorder_collects_hook_output() {
        fn hook(tree: &mut dyn ClonedTree) {
            tree.set_container_style(&[StyleDecl::new("position", "static")]);
            tree.set_descendant_styles(&[StyleDecl::new("visibility", "visible")]);
        }
        let opts = RenderOptions {
            scale: 1.0,
            background: "#ffffff".into(),
            width: None,
            height: None,
            window_width: None,
            window_height: None,
            on_clone: Some(hook),
        };
        let mut rec = StyleRecorder::default();
        opts.apply_clone_hook(&mut rec);
        assert_eq!(rec.container, vec![StyleDecl::new("position", "static")]);
        assert_eq!(rec.descendants.len(), 1);
    }

    #[tokio::test]
    async fn no_render_host_refuses() {
        let mut host = NoRenderHost;
        let req = StageRequest {
            html: "<p>x</p>",
            stylesheet: "",
            container_class: "c",
            container_style: &[],
        };
        let err = host.stage(&req).await.unwrap_err();
        assert!(err.message().contains("headless"));
    }
}
