//! One-page A4 artwork sheet.

use printpdf::image_crate::{DynamicImage, GenericImageView, RgbImage};
use printpdf::{BuiltinFont, Image, ImageTransform, Mm, PdfDocument};

use crate::models::Artwork;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 10.0;
const IMAGE_X: f32 = 10.0;
const IMAGE_W: f32 = 100.0;
const IMAGE_TOP_FIRST: f32 = 8.0;
const IMAGE_TOP_AFTER_TEXT: f32 = 58.0;
/// Text start when the image sits above it.
const TEXT_TOP_AFTER_IMAGE: f32 = 90.0;
const LINE_STEP: f32 = 13.0;
const FONT_SIZE: f32 = 12.0;
const DPI: f32 = 300.0;
const WRAP_AT: usize = 90;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("pdf rendering failed: {0}")]
    Render(String),
    #[error("image could not be embedded: {0}")]
    Image(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Image at the top, text below.
    ImageFirst,
    /// Text first, image below it.
    TextFirst,
}

impl TryFrom<u8> for Layout {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Layout::ImageFirst),
            1 => Ok(Layout::TextFirst),
            other => Err(other),
        }
    }
}

/// Greedy word wrap.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn text_lines(artwork: &Artwork) -> Vec<String> {
    let fields = [
        Some(artwork.record.name.as_str()),
        artwork.author.as_deref(),
        artwork.year.as_deref(),
        artwork.info.as_deref(),
    ];
    fields
        .into_iter()
        .flat_map(|f| wrap(f.unwrap_or_default(), WRAP_AT))
        .collect()
}

/// Decodes with the crate's own `image` build (every upload format) and hands
/// printpdf plain RGB8 pixels; embedded images carry no alpha channel.
fn decode(bytes: &[u8]) -> Result<DynamicImage, PdfError> {
    let rgb = image::load_from_memory(bytes)
        .map_err(|e| PdfError::Image(e.to_string()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    let pixels = RgbImage::from_raw(width, height, rgb.into_raw())
        .ok_or_else(|| PdfError::Image("pixel buffer does not match dimensions".into()))?;
    Ok(DynamicImage::ImageRgb8(pixels))
}

/// Renders name, author, year and info plus the optional image. Blocking.
pub fn render_artwork_sheet(artwork: &Artwork, layout: Layout, image: Option<&[u8]>) -> Result<Vec<u8>, PdfError> {
    let image = image.map(decode).transpose()?;
    let lines = text_lines(artwork);

    let (doc, page, layer) = PdfDocument::new(artwork.record.name.as_str(), Mm(PAGE_W), Mm(PAGE_H), "sheet");
    let layer = doc.get_page(page).get_layer(layer);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| PdfError::Render(e.to_string()))?;

    let image_height = image
        .as_ref()
        .map(|img| IMAGE_W * img.height() as f32 / img.width().max(1) as f32)
        .unwrap_or(0.0);
    let text_height = lines.len() as f32 * LINE_STEP;

    let (image_top, text_top) = match (layout, image.is_some()) {
        (_, false) => (0.0, MARGIN),
        (Layout::ImageFirst, true) => (
            IMAGE_TOP_FIRST,
            TEXT_TOP_AFTER_IMAGE.max(IMAGE_TOP_FIRST + image_height + 4.0),
        ),
        (Layout::TextFirst, true) => (IMAGE_TOP_AFTER_TEXT.max(MARGIN + text_height + 3.0), MARGIN),
    };

    for (i, line) in lines.iter().enumerate() {
        // baseline sits 7mm into each 10mm cell
        let top = text_top + i as f32 * LINE_STEP + 7.0;
        if !line.is_empty() {
            layer.use_text(line.as_str(), FONT_SIZE, Mm(MARGIN), Mm(PAGE_H - top), &font);
        }
    }

    if let Some(img) = image {
        let natural_w = img.width() as f32 * 25.4 / DPI;
        let scale = IMAGE_W / natural_w.max(f32::EPSILON);
        Image::from_dynamic_image(&img).add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(IMAGE_X)),
                translate_y: Some(Mm(PAGE_H - image_top - image_height)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(DPI),
                ..Default::default()
            },
        );
    }

    doc.save_to_bytes().map_err(|e| PdfError::Render(e.to_string()))
}
