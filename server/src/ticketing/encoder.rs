//! Renders ticket payloads as QR codes.
//!
//! This is a pure format transform: the payload is not validated here.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{GrayImage, ImageFormat, Luma};
use qrcode::render::svg;
use qrcode::{Color, EcLevel, QrCode};
use thiserror::Error;

use super::payload::{PayloadError, TicketPayload};

const DARK: Luma<u8> = Luma([0]);
const LIGHT: Luma<u8> = Luma([255]);

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("failed to build QR symbol: {0}")]
    Symbol(qrcode::types::QrError),

    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
}

/// Non-semantic rendering knobs. None of them change what a scanner reads.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Pixels per QR module.
    pub module_scale: u32,
    /// Light border around the symbol, in modules.
    pub quiet_zone: u32,
    /// SVG colors. Rasters are always black on white.
    pub dark_color: String,
    pub light_color: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            module_scale: 8,
            quiet_zone: 4,
            dark_color: "#000000".to_string(),
            light_color: "#ffffff".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TicketEncoder {
    options: RenderOptions,
}

impl TicketEncoder {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    fn symbol(&self, payload: &TicketPayload) -> Result<QrCode, EncodeError> {
        let wire = payload.to_wire()?;
        QrCode::with_error_correction_level(wire.as_bytes(), EcLevel::M)
            .map_err(EncodeError::Symbol)
    }

    /// Grayscale raster of the payload's QR code.
    pub fn encode(&self, payload: &TicketPayload) -> Result<GrayImage, EncodeError> {
        let code = self.symbol(payload)?;
        let modules = code.width() as u32;
        let colors = code.to_colors();
        let scale = self.options.module_scale.max(1);
        let quiet = self.options.quiet_zone;
        let side = (modules + 2 * quiet) * scale;

        Ok(GrayImage::from_fn(side, side, |x, y| {
            let (mx, my) = (x / scale, y / scale);
            if mx < quiet || my < quiet || mx >= quiet + modules || my >= quiet + modules {
                return LIGHT;
            }
            let index = ((my - quiet) * modules + (mx - quiet)) as usize;
            match colors[index] {
                Color::Dark => DARK,
                Color::Light => LIGHT,
            }
        }))
    }

    pub fn to_png(&self, payload: &TicketPayload) -> Result<Vec<u8>, EncodeError> {
        let image = self.encode(payload)?;
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    /// `data:image/png;base64,...`, embeddable directly in HTML or e-mail.
    pub fn to_data_uri(&self, payload: &TicketPayload) -> Result<String, EncodeError> {
        let png = self.to_png(payload)?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
    }

    pub fn to_svg(&self, payload: &TicketPayload) -> Result<String, EncodeError> {
        let code = self.symbol(payload)?;
        let scale = self.options.module_scale.max(1);
        Ok(code
            .render::<svg::Color<'_>>()
            .quiet_zone(self.options.quiet_zone > 0)
            .module_dimensions(scale, scale)
            .dark_color(svg::Color(&self.options.dark_color))
            .light_color(svg::Color(&self.options.light_color))
            .build())
    }
}
