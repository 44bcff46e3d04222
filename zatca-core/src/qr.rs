//! Phase One (simplified invoice) QR codes.
//!
//! The payload is a base64 TLV string with five tags: seller name, VAT
//! number, timestamp, total with VAT, VAT total. Rendering turns it into an
//! SVG document or a base64 PNG.
use base64ct::{Base64, Encoding};
use chrono::{DateTime, NaiveDateTime, Utc};
use image::{ImageFormat, Rgb, RgbImage};
use qrcode::{Color, QrCode};
use std::{fmt::Write, io::Cursor};
use thiserror::Error;
use zatca_derive::Validate;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const MAX_ENCODED_LEN: usize = 700;
const FINDER_SIZE: usize = 7;

#[derive(Debug, Error)]
pub enum QrCodeError {
    #[error("invalid QR field: {message}")]
    Validation { message: String },
    #[error("TLV field {tag} exceeds 255 bytes (len={len})")]
    ValueTooLong { tag: u8, len: usize },
    #[error("QR code payload exceeds 700 characters once base64 encoded (len={len})")]
    EncodedTooLong { len: usize },
    #[error("QR rendering failed: {0}")]
    Render(String),
    #[error("QR payload cannot be decoded: {0}")]
    Decode(String),
}

impl From<String> for QrCodeError {
    fn from(message: String) -> Self {
        QrCodeError::Validation { message }
    }
}

pub type QrResult<T> = std::result::Result<T, QrCodeError>;

/// The five Phase One fields. Every value is mandatory. The timestamp is
/// kept at whole-second precision, the resolution of the encoded payload.
///
/// # Examples
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use zatca_core::qr::PhaseOneQr;
///
/// let qr = PhaseOneQr::new(
///     "Acme".into(),
///     "123456789123456".into(),
///     Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap(),
///     "115.00".into(),
///     "15.00".into(),
/// )?;
/// let payload = qr.to_base64()?;
/// assert_eq!(PhaseOneQr::decode(&payload)?, qr);
/// # Ok::<(), zatca_core::qr::QrCodeError>(())
/// ```
#[derive(Validate, Debug, Clone, PartialEq, Eq)]
#[validate_error(QrCodeError)]
pub struct PhaseOneQr {
    #[validate(non_empty)]
    seller_name: String,
    #[validate(is_vat_number)]
    vat_number: String,
    #[validate(whole_seconds)]
    timestamp: DateTime<Utc>,
    #[validate(is_amount)]
    total_with_vat: String,
    #[validate(is_amount)]
    vat_total: String,
}

impl PhaseOneQr {
    pub fn seller_name(&self) -> &str {
        &self.seller_name
    }

    pub fn vat_number(&self) -> &str {
        &self.vat_number
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn total_with_vat(&self) -> &str {
        &self.total_with_vat
    }

    pub fn vat_total(&self) -> &str {
        &self.vat_total
    }

    /// TLV payload, base64 encoded.
    pub fn to_base64(&self) -> QrResult<String> {
        let mut tlv = TlvBuilder::new();
        tlv.push_str(1, &self.seller_name)?;
        tlv.push_str(2, &self.vat_number)?;
        tlv.push_str(3, &self.timestamp.format(TIMESTAMP_FORMAT).to_string())?;
        tlv.push_str(4, &self.total_with_vat)?;
        tlv.push_str(5, &self.vat_total)?;
        tlv.finish()
    }

    /// Parse a base64 TLV payload back into its fields.
    pub fn decode(payload: &str) -> QrResult<Self> {
        let raw = Base64::decode_vec(payload.trim())
            .map_err(|e| QrCodeError::Decode(format!("base64: {e}")))?;
        let mut fields: [Option<String>; 5] = Default::default();
        for (tag, value) in decode_tlv(&raw)? {
            let slot = match tag {
                1..=5 => &mut fields[usize::from(tag) - 1],
                other => return Err(QrCodeError::Decode(format!("unexpected tag {other}"))),
            };
            if slot.is_some() {
                return Err(QrCodeError::Decode(format!("duplicate tag {tag}")));
            }
            let text = String::from_utf8(value)
                .map_err(|e| QrCodeError::Decode(format!("tag {tag}: {e}")))?;
            *slot = Some(text);
        }
        let [seller, vat, timestamp, total, vat_total] = fields;
        let missing = |tag: u8| QrCodeError::Decode(format!("missing tag {tag}"));
        let timestamp = timestamp.ok_or_else(|| missing(3))?;
        let timestamp = NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT)
            .map_err(|e| QrCodeError::Decode(format!("timestamp '{timestamp}': {e}")))?
            .and_utc();
        PhaseOneQr::new(
            seller.ok_or_else(|| missing(1))?,
            vat.ok_or_else(|| missing(2))?,
            timestamp,
            total.ok_or_else(|| missing(4))?,
            vat_total.ok_or_else(|| missing(5))?,
        )
    }

    pub fn render_svg(&self, options: &QrRenderOptions) -> QrResult<String> {
        Matrix::encode(&self.to_base64()?)?.to_svg(options)
    }

    /// PNG image, base64 encoded for embedding in documents.
    pub fn render_png_base64(&self, options: &QrRenderOptions) -> QrResult<String> {
        let png = Matrix::encode(&self.to_base64()?)?.to_png(options)?;
        Ok(Base64::encode_string(&png))
    }
}

/// Split raw TLV bytes into `(tag, value)` entries.
pub fn decode_tlv(bytes: &[u8]) -> QrResult<Vec<(u8, Vec<u8>)>> {
    let mut entries = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        let (tag, len) = match bytes.get(idx..idx + 2) {
            Some([tag, len]) => (*tag, usize::from(*len)),
            _ => return Err(QrCodeError::Decode(format!("truncated header at {idx}"))),
        };
        let start = idx + 2;
        let end = start + len;
        let value = bytes
            .get(start..end)
            .ok_or_else(|| QrCodeError::Decode(format!("tag {tag} value truncated")))?;
        entries.push((tag, value.to_vec()));
        idx = end;
    }
    Ok(entries)
}

struct TlvBuilder {
    bytes: Vec<u8>,
}

impl TlvBuilder {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn push_str(&mut self, tag: u8, value: &str) -> QrResult<()> {
        self.push_bytes(tag, value.as_bytes())
    }

    fn push_bytes(&mut self, tag: u8, value: &[u8]) -> QrResult<()> {
        let len = u8::try_from(value.len()).map_err(|_| QrCodeError::ValueTooLong {
            tag,
            len: value.len(),
        })?;
        self.bytes.push(tag);
        self.bytes.push(len);
        self.bytes.extend_from_slice(value);
        Ok(())
    }

    fn finish(self) -> QrResult<String> {
        let encoded = Base64::encode_string(&self.bytes);
        if encoded.len() > MAX_ENCODED_LEN {
            return Err(QrCodeError::EncodedTooLong { len: encoded.len() });
        }
        Ok(encoded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor(pub u8, pub u8, pub u8);

impl RgbColor {
    pub const BLACK: RgbColor = RgbColor(0, 0, 0);
    pub const WHITE: RgbColor = RgbColor(255, 255, 255);

    fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleShape {
    #[default]
    Square,
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EyeStyle {
    #[default]
    Square,
    Circle,
}

/// Rendering options. `size` is the image side in pixels, `margin` the quiet
/// zone in modules. `module_ratio` scales dot modules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QrRenderOptions {
    pub foreground: RgbColor,
    pub background: RgbColor,
    pub size: u32,
    pub margin: u32,
    pub module_shape: ModuleShape,
    pub module_ratio: f64,
    pub eye_style: EyeStyle,
}

impl Default for QrRenderOptions {
    fn default() -> Self {
        Self {
            foreground: RgbColor::BLACK,
            background: RgbColor::WHITE,
            size: 100,
            margin: 0,
            module_shape: ModuleShape::Square,
            module_ratio: 0.9,
            eye_style: EyeStyle::Square,
        }
    }
}

struct Matrix {
    width: usize,
    colors: Vec<Color>,
}

impl Matrix {
    fn encode(payload: &str) -> QrResult<Self> {
        let code = QrCode::new(payload.as_bytes()).map_err(|e| QrCodeError::Render(e.to_string()))?;
        Ok(Self {
            width: code.width(),
            colors: code.to_colors(),
        })
    }

    fn is_dark(&self, x: usize, y: usize) -> bool {
        self.colors[y * self.width + x] == Color::Dark
    }

    /// Top-left corners of the three finder patterns.
    fn eyes(&self) -> [(usize, usize); 3] {
        let far = self.width - FINDER_SIZE;
        [(0, 0), (far, 0), (0, far)]
    }

    fn eye_at(&self, x: usize, y: usize) -> Option<(usize, usize)> {
        self.eyes().into_iter().find(|&(ex, ey)| {
            (ex..ex + FINDER_SIZE).contains(&x) && (ey..ey + FINDER_SIZE).contains(&y)
        })
    }

    fn to_svg(&self, options: &QrRenderOptions) -> QrResult<String> {
        let margin = options.margin as f64;
        let extent = self.width as f64 + 2.0 * margin;
        let fg = options.foreground.hex();
        let mut svg = String::new();
        let fmt_err = |e: std::fmt::Error| QrCodeError::Render(e.to_string());

        write!(
            svg,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" version="1.1" width="{size}" height="{size}" viewBox="0 0 {extent} {extent}">
<rect x="0" y="0" width="{extent}" height="{extent}" fill="{bg}"/>
"#,
            size = options.size,
            bg = options.background.hex(),
        )
        .map_err(fmt_err)?;

        let ratio = options.module_ratio.clamp(0.1, 1.0);
        for y in 0..self.width {
            for x in 0..self.width {
                if !self.is_dark(x, y) || self.eye_at(x, y).is_some() {
                    continue;
                }
                let (px, py) = (x as f64 + margin, y as f64 + margin);
                let written = match options.module_shape {
                    ModuleShape::Square => writeln!(
                        svg,
                        r#"<rect x="{px}" y="{py}" width="1" height="1" fill="{fg}"/>"#
                    ),
                    ModuleShape::Dot => writeln!(
                        svg,
                        r#"<circle cx="{}" cy="{}" r="{}" fill="{fg}"/>"#,
                        px + 0.5,
                        py + 0.5,
                        ratio / 2.0
                    ),
                };
                written.map_err(fmt_err)?;
            }
        }

        for (ex, ey) in self.eyes() {
            let (ox, oy) = (ex as f64 + margin, ey as f64 + margin);
            let written = match options.eye_style {
                EyeStyle::Square => writeln!(
                    svg,
                    r#"<path fill-rule="evenodd" d="M{ox} {oy}h7v7h-7zM{ix} {iy}h5v5h-5z" fill="{fg}"/>
<rect x="{cx}" y="{cy}" width="3" height="3" fill="{fg}"/>"#,
                    ix = ox + 1.0,
                    iy = oy + 1.0,
                    cx = ox + 2.0,
                    cy = oy + 2.0,
                ),
                EyeStyle::Circle => writeln!(
                    svg,
                    r#"<circle cx="{cx}" cy="{cy}" r="3" fill="none" stroke="{fg}" stroke-width="1"/>
<circle cx="{cx}" cy="{cy}" r="1.5" fill="{fg}"/>"#,
                    cx = ox + 3.5,
                    cy = oy + 3.5,
                ),
            };
            written.map_err(fmt_err)?;
        }

        svg.push_str("</svg>\n");
        Ok(svg)
    }

    /// Whether the point `(mx, my)`, in module coordinates, is painted.
    fn shade(&self, mx: f64, my: f64, options: &QrRenderOptions) -> bool {
        let (x, y) = (mx.floor() as usize, my.floor() as usize);
        if let Some((ex, ey)) = self.eye_at(x, y) {
            return match options.eye_style {
                EyeStyle::Square => self.is_dark(x, y),
                EyeStyle::Circle => {
                    let d = (mx - (ex as f64 + 3.5)).hypot(my - (ey as f64 + 3.5));
                    (2.5..=3.5).contains(&d) || d <= 1.5
                }
            };
        }
        if !self.is_dark(x, y) {
            return false;
        }
        match options.module_shape {
            ModuleShape::Square => true,
            ModuleShape::Dot => {
                let ratio = options.module_ratio.clamp(0.1, 1.0);
                (mx.fract() - 0.5).hypot(my.fract() - 0.5) <= ratio / 2.0
            }
        }
    }

    fn to_png(&self, options: &QrRenderOptions) -> QrResult<Vec<u8>> {
        if options.size == 0 {
            return Err(QrCodeError::Render("image size must be positive".into()));
        }
        let margin = options.margin as f64;
        let extent = self.width as f64 + 2.0 * margin;
        let scale = extent / options.size as f64;
        let RgbColor(fr, fg, fb) = options.foreground;
        let RgbColor(br, bg, bb) = options.background;

        let image = RgbImage::from_fn(options.size, options.size, |px, py| {
            let mx = (px as f64 + 0.5) * scale - margin;
            let my = (py as f64 + 0.5) * scale - margin;
            let inside = (0.0..self.width as f64).contains(&mx) && (0.0..self.width as f64).contains(&my);
            if inside && self.shade(mx, my, options) {
                Rgb([fr, fg, fb])
            } else {
                Rgb([br, bg, bb])
            }
        });

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| QrCodeError::Render(e.to_string()))?;
        Ok(png)
    }
}
