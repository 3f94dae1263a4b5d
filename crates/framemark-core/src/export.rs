//! Frame export.
//!
//! Exporters receive a private copy of the visible document, so an export
//! in flight never observes later edits.

use crate::error::{EngineError, EngineResult};
use crate::geometry::generate_matrix;
use crate::shapes::{Element, ElementKind, SerializableColor};
use kurbo::Size;
use std::future::Future;
use std::pin::Pin;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// What an exporter gets to work with.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    /// Rendered elements in paint order.
    pub elements: Vec<Element>,
    pub target: Size,
    pub native: Size,
}

/// Encoded export output.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFrame {
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// An off-screen encoder for snapshots.
pub trait FrameExporter {
    fn export<'a>(&'a self, frame: &'a FrameSnapshot) -> BoxFuture<'a, EngineResult<ExportedFrame>>;
}

/// Encodes the detection matrix as an RGBA PNG, one pixel per cell, with
/// a fixed color per element kind.
#[derive(Debug, Clone)]
pub struct MatrixPngExporter {
    pub background: SerializableColor,
    /// Indexed by kind code minus one.
    pub palette: [SerializableColor; 5],
}

impl Default for MatrixPngExporter {
    fn default() -> Self {
        Self {
            background: SerializableColor::transparent(),
            palette: [
                SerializableColor::new(255, 255, 255, 255),
                SerializableColor::new(0, 200, 83, 255),
                SerializableColor::new(41, 121, 255, 255),
                SerializableColor::new(255, 171, 0, 255),
                SerializableColor::new(213, 0, 249, 255),
            ],
        }
    }
}

impl MatrixPngExporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn color_for(&self, code: u8) -> SerializableColor {
        match code {
            0 => self.background,
            c => self
                .palette
                .get(usize::from(c) - 1)
                .copied()
                .unwrap_or(self.background),
        }
    }

    /// Color used for an element kind.
    pub fn kind_color(&self, kind: ElementKind) -> SerializableColor {
        self.color_for(kind.code())
    }

    fn encode(&self, frame: &FrameSnapshot) -> EngineResult<ExportedFrame> {
        let matrix = generate_matrix(&frame.elements, frame.target);
        if matrix.width == 0 || matrix.height == 0 {
            return Err(EngineError::Export("frame has no pixels".to_string()));
        }
        let width = u32::try_from(matrix.width).map_err(|e| EngineError::Export(e.to_string()))?;
        let height = u32::try_from(matrix.height).map_err(|e| EngineError::Export(e.to_string()))?;

        let mut rgba = Vec::with_capacity(matrix.width * matrix.height * 4);
        for code in matrix.matrix.iter().flatten() {
            let c = self.color_for(*code);
            rgba.extend_from_slice(&[c.r, c.g, c.b, c.a]);
        }

        let mut png_data = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_data, width, height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|e| EngineError::Export(format!("Failed to write PNG header: {}", e)))?;
            writer
                .write_image_data(&rgba)
                .map_err(|e| EngineError::Export(format!("Failed to write PNG data: {}", e)))?;
        }

        log::info!("PNG export complete: {} bytes", png_data.len());
        Ok(ExportedFrame {
            width,
            height,
            mime_type: "image/png",
            bytes: png_data,
        })
    }
}

impl FrameExporter for MatrixPngExporter {
    fn export<'a>(&'a self, frame: &'a FrameSnapshot) -> BoxFuture<'a, EngineResult<ExportedFrame>> {
        Box::pin(async move { self.encode(frame) })
    }
}
