//! Card-style thumbnails for outgoing posts.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ab_glyph::{FontArc, PxScale};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use sp_core::{Error, QueuedArticle, Result, ThumbnailRenderer};
use sp_scrapers::Fetch;

pub const CARD_WIDTH: u32 = 1200;
pub const CARD_HEIGHT: u32 = 675;
pub const JPEG_QUALITY: u8 = 90;
pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(20);

/// DejaVu Sans, used when no font file is configured.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

pub const CARD_HEADING: &str = "AI SUCCESS CASE";
pub const TITLE_MAX_CHARS: usize = 80;
const TITLE_LINE_CHARS: usize = 38;

const BACKGROUND: Rgb<u8> = Rgb([20, 24, 33]);
const FRAME: Rgb<u8> = Rgb([90, 130, 220]);
const ACCENT: Rgb<u8> = Rgb([160, 190, 255]);
const TITLE_COLOR: Rgb<u8> = Rgb([240, 245, 255]);
const TOPIC_COLOR: Rgb<u8> = Rgb([180, 220, 255]);
const FRAME_INSET: u32 = 40;
const FRAME_WIDTH: u32 = 4;
const TEXT_LEFT: i32 = 80;
/// Brightness kept from a photo under the card overlay, in percent.
const PHOTO_DIM_PERCENT: u16 = 57;

/// Renders a 1200x675 JPEG card with a heading, the article title and its
/// topic. Article imagery is only used when images are allowed; a failed
/// download falls back to the plain card.
pub struct CardRenderer {
    fetcher: Arc<dyn Fetch>,
    font: Option<FontArc>,
}

impl CardRenderer {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|e| tracing::warn!("bundled card font unusable, cards will carry no text: {}", e))
            .ok();
        Self { fetcher, font }
    }

    /// Swaps the bundled font for a TrueType/OpenType file, e.g. one with
    /// CJK coverage.
    pub fn with_font_file(mut self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Config(format!("failed to read card font {}: {}", path.display(), e)))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| Error::Config(format!("invalid card font {}: {}", path.display(), e)))?;
        self.font = Some(font);
        Ok(self)
    }

    fn draw_text(&self, card: &mut RgbImage, article: &QueuedArticle) {
        let Some(font) = &self.font else {
            return;
        };
        draw_text_mut(card, ACCENT, TEXT_LEFT, 140, PxScale::from(44.0), font, CARD_HEADING);

        let mut y = 250;
        for line in title_lines(&article.title) {
            draw_text_mut(card, TITLE_COLOR, TEXT_LEFT, y, PxScale::from(52.0), font, &line);
            y += 62;
        }
        let topic = format!("Topic: {}", article.topic);
        draw_text_mut(card, TOPIC_COLOR, TEXT_LEFT, y + 38, PxScale::from(36.0), font, &topic);
    }

    async fn backdrop(&self, article: &QueuedArticle, allow_image: bool) -> RgbImage {
        let plain = RgbImage::from_pixel(CARD_WIDTH, CARD_HEIGHT, BACKGROUND);
        let Some(url) = article.image_url.as_deref().filter(|_| allow_image) else {
            return plain;
        };

        let photo = match self.fetcher.fetch(url, IMAGE_TIMEOUT).await {
            Ok(bytes) => image::load_from_memory(&bytes),
            Err(e) => {
                tracing::debug!(url, "image download failed: {}", e);
                return plain;
            }
        };
        match photo {
            Ok(photo) => {
                let mut photo = photo
                    .resize_exact(CARD_WIDTH, CARD_HEIGHT, FilterType::Triangle)
                    .to_rgb8();
                dim(&mut photo);
                photo
            }
            Err(e) => {
                tracing::debug!(url, "image decode failed: {}", e);
                plain
            }
        }
    }
}

#[async_trait]
impl ThumbnailRenderer for CardRenderer {
    async fn render(&self, article: &QueuedArticle, allow_image: bool, out_path: &Path) -> Result<PathBuf> {
        let mut card = self.backdrop(article, allow_image).await;
        draw_frame(&mut card);
        draw_accent(&mut card);
        self.draw_text(&mut card, article);

        if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(out_path)?);
        card.write_with_encoder(JpegEncoder::new_with_quality(writer, JPEG_QUALITY))
            .map_err(|e| Error::Publish(format!("failed to encode {}: {}", out_path.display(), e)))?;

        tracing::debug!(path = %out_path.display(), "thumbnail written");
        Ok(out_path.to_path_buf())
    }
}

fn dim(image: &mut RgbImage) {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (u16::from(*channel) * PHOTO_DIM_PERCENT / 100) as u8;
        }
    }
}

fn fill_rect(image: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    for y in y0..y1.min(image.height()) {
        for x in x0..x1.min(image.width()) {
            image.put_pixel(x, y, color);
        }
    }
}

/// Outline inset from the card edges.
fn draw_frame(image: &mut RgbImage) {
    let (left, top) = (FRAME_INSET, FRAME_INSET);
    let (right, bottom) = (CARD_WIDTH - FRAME_INSET, CARD_HEIGHT - FRAME_INSET);
    fill_rect(image, left, top, right, top + FRAME_WIDTH, FRAME);
    fill_rect(image, left, bottom - FRAME_WIDTH, right, bottom, FRAME);
    fill_rect(image, left, top, left + FRAME_WIDTH, bottom, FRAME);
    fill_rect(image, right - FRAME_WIDTH, top, right, bottom, FRAME);
}

/// Rule under the heading.
fn draw_accent(image: &mut RgbImage) {
    fill_rect(image, 80, 204, 380, 210, ACCENT);
}

/// The first 80 characters of the title, wrapped on spaces. Runs without
/// spaces (CJK titles) are cut at the line width.
pub fn title_lines(title: &str) -> Vec<String> {
    let title: String = title.split_whitespace().collect::<Vec<_>>().join(" ");
    let title: String = title.chars().take(TITLE_MAX_CHARS).collect();

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in title.split(' ') {
        let word_len = word.chars().count();
        let current_len = current.chars().count();
        if current_len > 0 && current_len + 1 + word_len <= TITLE_LINE_CHARS {
            current.push(' ');
            current.push_str(word);
            continue;
        }
        if current_len > 0 {
            lines.push(std::mem::take(&mut current));
        }
        let chars: Vec<char> = word.chars().collect();
        let mut pieces = chars.chunks(TITLE_LINE_CHARS).map(|c| c.iter().collect::<String>()).peekable();
        while let Some(piece) = pieces.next() {
            if pieces.peek().is_some() {
                lines.push(piece);
            } else {
                current = piece;
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
