//! Headless Chrome render host.
//!
//! Staged elements live in a single `about:blank` page. Every element and
//! its stylesheet carry a numeric data attribute so later calls can find
//! them again. Chrome screenshots the live tree rather than a clone, so the
//! clone hook's declarations are applied to the live element for the
//! duration of the capture and rolled back afterwards.

use super::{
    css_text, ElementMetrics, ImageLoadReport, RenderHost, RenderOptions, StageRequest,
    StagedElement, StyleDecl, StyleRecorder,
};
use crate::error::HostError;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    ClearDeviceMetricsOverrideParams, SetDeviceMetricsOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use image::RgbaImage;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const ELEMENT_ATTR: &str = "data-pdf-stitch-id";
const STYLE_ATTR: &str = "data-pdf-stitch-style";
const CLONE_STYLE_ATTR: &str = "data-pdf-stitch-clone";

fn host_err(context: &str, err: impl std::fmt::Display) -> HostError {
    HostError::new(format!("{context}: {err}"))
}

/// JSON-encode a string so it can be spliced into a script as a literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn element_js(id: u64) -> String {
    format!("document.querySelector('[{ELEMENT_ATTR}=\"{id}\"]')")
}

#[derive(Deserialize)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// A [`RenderHost`] backed by a headless Chrome process.
pub struct ChromeHost {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    next_id: u64,
}

impl ChromeHost {
    /// Launch headless Chrome and open a blank page.
    pub async fn launch() -> Result<Self, HostError> {
        let config = BrowserConfig::builder()
            .args([
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--no-sandbox",
                "--no-first-run",
                "--disable-extensions",
                "--hide-scrollbars",
            ])
            .build()
            .map_err(|e| host_err("browser config", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| host_err("failed to launch Chrome", e))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| host_err("failed to open page", e))?;

        debug!("Headless Chrome ready");
        Ok(Self {
            browser,
            page,
            handler,
            next_id: 1,
        })
    }

    /// Shut the browser down.
    pub async fn close(mut self) -> Result<(), HostError> {
        self.browser
            .close()
            .await
            .map_err(|e| host_err("failed to close Chrome", e))?;
        self.handler.abort();
        Ok(())
    }

    async fn eval<T: DeserializeOwned>(&self, js: String) -> Result<T, HostError> {
        let params = EvaluateParams::builder()
            .expression(js)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| host_err("script params", e))?;
        self.page
            .evaluate_expression(params)
            .await
            .map_err(|e| host_err("script failed", e))?
            .into_value()
            .map_err(|e| host_err("unexpected script result", e))
    }

    async fn apply_decls(&self, id: u64, decls: &[StyleDecl]) -> Result<(), HostError> {
        let mut js = format!("(() => {{ const el = {}; if (!el) return false;", element_js(id));
        for d in decls {
            if d.value.is_empty() {
                js.push_str(&format!(" el.style.removeProperty({});", js_str(&d.property)));
            } else {
                js.push_str(&format!(
                    " el.style.setProperty({}, {});",
                    js_str(&d.property),
                    js_str(&d.value)
                ));
            }
        }
        js.push_str(" return true; })()");
        let found: bool = self.eval(js).await?;
        if found {
            Ok(())
        } else {
            Err(HostError::new(format!("staged element {id} is gone")))
        }
    }

    async fn capture(&self, id: u64, options: &RenderOptions) -> Result<RgbaImage, HostError> {
        let rect: Rect = self
            .eval(format!(
                "(() => {{ const r = {}.getBoundingClientRect(); \
return {{ x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height }}; }})()",
                element_js(id)
            ))
            .await?;

        let width = options.width.map(f64::from).unwrap_or(rect.width);
        let height = options.height.map(f64::from).unwrap_or(rect.height);

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(Viewport {
                x: rect.x,
                y: rect.y,
                width,
                height,
                scale: options.scale,
            })
            .capture_beyond_viewport(true)
            .build();

        let png = self
            .page
            .screenshot(params)
            .await
            .map_err(|e| host_err("screenshot failed", e))?;
        image::load_from_memory(&png)
            .map(|img| img.to_rgba8())
            .map_err(|e| host_err("screenshot decode", e))
    }
}

impl Drop for ChromeHost {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

impl RenderHost for ChromeHost {
    async fn stage(&mut self, request: &StageRequest<'_>) -> Result<StagedElement, HostError> {
        let id = self.next_id;
        self.next_id += 1;

        let js = format!(
            "(() => {{ \
const style = document.createElement('style'); \
style.setAttribute('{STYLE_ATTR}', '{id}'); \
style.textContent = {css}; \
document.head.appendChild(style); \
const el = document.createElement('div'); \
el.className = {class}; \
el.setAttribute('{ELEMENT_ATTR}', '{id}'); \
el.setAttribute('aria-hidden', 'true'); \
el.style.cssText = {style}; \
el.innerHTML = {html}; \
document.body.appendChild(el); \
return true; }})()",
            css = js_str(request.stylesheet),
            class = js_str(request.container_class),
            style = js_str(&css_text(request.container_style)),
            html = js_str(request.html),
        );
        let _: bool = self.eval(js).await?;
        debug!("Staged element {}", id);
        Ok(StagedElement::new(id))
    }

    async fn style(&mut self, element: &StagedElement, property: &str) -> Result<String, HostError> {
        self.eval(format!(
            "(() => {{ const el = {}; return el ? el.style.getPropertyValue({}) : ''; }})()",
            element_js(element.id()),
            js_str(property)
        ))
        .await
    }

    async fn set_style(&mut self, element: &StagedElement, decls: &[StyleDecl]) -> Result<(), HostError> {
        self.apply_decls(element.id(), decls).await
    }

    async fn measure(&mut self, element: &StagedElement) -> Result<ElementMetrics, HostError> {
        #[derive(Deserialize)]
        struct Raw {
            sw: u32,
            sh: u32,
            ow: u32,
            oh: u32,
            text: usize,
            images: usize,
        }
        let raw: Raw = self
            .eval(format!(
                "(() => {{ const el = {}; \
return {{ sw: el.scrollWidth, sh: el.scrollHeight, ow: el.offsetWidth, oh: el.offsetHeight, \
text: (el.textContent || '').trim().length, images: el.querySelectorAll('img').length }}; }})()",
                element_js(element.id())
            ))
            .await?;
        Ok(ElementMetrics {
            scroll_width: raw.sw,
            scroll_height: raw.sh,
            offset_width: raw.ow,
            offset_height: raw.oh,
            text_len: raw.text,
            image_count: raw.images,
        })
    }

    async fn wait_for_images(&mut self, element: &StagedElement) -> Result<ImageLoadReport, HostError> {
        #[derive(Deserialize)]
        struct Raw {
            total: usize,
            loaded: usize,
            failed: usize,
        }
        let raw: Raw = self
            .eval(format!(
                "(async () => {{ const imgs = Array.from({}.querySelectorAll('img')); \
let loaded = 0, failed = 0; \
await Promise.all(imgs.map(img => {{ \
  if (img.complete) {{ if (img.naturalWidth > 0) loaded++; else failed++; return null; }} \
  return new Promise(resolve => {{ \
    img.addEventListener('load', () => {{ loaded++; resolve(); }}, {{ once: true }}); \
    img.addEventListener('error', () => {{ failed++; resolve(); }}, {{ once: true }}); \
  }}); \
}})); \
return {{ total: imgs.length, loaded, failed }}; }})()",
                element_js(element.id())
            ))
            .await?;
        Ok(ImageLoadReport {
            total: raw.total,
            loaded: raw.loaded,
            failed: raw.failed,
        })
    }

    async fn render(&mut self, element: &StagedElement, options: &RenderOptions) -> Result<RgbaImage, HostError> {
        let id = element.id();

        let mut recorder = StyleRecorder::default();
        options.apply_clone_hook(&mut recorder);
        recorder
            .container
            .push(StyleDecl::new("background-color", options.background.clone()));

        let saved: String = self
            .eval(format!("{}.style.cssText", element_js(id)))
            .await?;
        self.apply_decls(id, &recorder.container).await?;
        if !recorder.descendants.is_empty() {
            let rules: Vec<String> = recorder
                .descendants
                .iter()
                .map(|d| format!("{} !important", d.to_css()))
                .collect();
            let css = format!("[{ELEMENT_ATTR}=\"{id}\"] * {{ {} }}", rules.join("; "));
            let _: bool = self
                .eval(format!(
                    "(() => {{ const s = document.createElement('style'); \
s.setAttribute('{CLONE_STYLE_ATTR}', '{id}'); s.textContent = {}; \
document.head.appendChild(s); return true; }})()",
                    js_str(&css)
                ))
                .await?;
        }

        if let (Some(w), Some(h)) = (options.window_width, options.window_height) {
            self.page
                .execute(SetDeviceMetricsOverrideParams::new(w as i64, h as i64, 1.0, false))
                .await
                .map_err(|e| host_err("window resize", e))?;
        }

        let result = self.capture(id, options).await;

        if options.window_width.is_some() {
            if let Err(e) = self.page.execute(ClearDeviceMetricsOverrideParams::default()).await {
                warn!("Could not reset window size: {}", e);
            }
        }
        let restore = format!(
            "(() => {{ const el = {}; if (el) el.style.cssText = {}; \
document.querySelectorAll('[{CLONE_STYLE_ATTR}=\"{id}\"]').forEach(s => s.remove()); return true; }})()",
            element_js(id),
            js_str(&saved)
        );
        if let Err(e) = self.eval::<bool>(restore).await {
            warn!("Could not restore element {} after capture: {}", id, e);
        }

        result
    }

    async fn unstage(&mut self, element: StagedElement) -> Result<(), HostError> {
        let id = element.id();
        let _: bool = self
            .eval(format!(
                "(() => {{ \
document.querySelectorAll('[{ELEMENT_ATTR}=\"{id}\"], [{STYLE_ATTR}=\"{id}\"], [{CLONE_STYLE_ATTR}=\"{id}\"]').forEach(n => n.remove()); \
return true; }})()"
            ))
            .await?;
        debug!("Unstaged element {}", id);
        Ok(())
    }
}
