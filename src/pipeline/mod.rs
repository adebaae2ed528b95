//! Pipeline stages for document-to-PDF conversion.
//!
//! Each submodule implements exactly one transformation step and is tested
//! on its own. Only [`rasterize`] talks to a render host; everything
//! downstream of it works on plain pixel buffers.
//!
//! ## Data Flow
//!
//! ```text
//! DOCX:  html ──▶ rasterize ──▶ verify ──▶ slice ──▶ assemble
//!               (render host)  (pixels)  (A4 chunks)  (lopdf)
//!
//! Image: encode ──▶ assemble
//! PDF:   assemble (page copy)
//! ```
//!
//! 1. [`input`]     — read a path and detect its kind (CLI side)
//! 2. [`rasterize`] — retry ladder and visibility toggling around the host
//! 3. [`verify`]    — tiered scan for non-background pixels
//! 4. [`slice`]     — cut a tall raster into page-height chunks
//! 5. [`encode`]    — decode source images and build image XObjects
//! 6. [`assemble`]  — the output document: raster pages, image pages, page copy

pub mod assemble;
pub mod encode;
pub mod input;
pub mod rasterize;
pub mod slice;
pub mod verify;
