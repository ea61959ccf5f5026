//! Quote cards for the guessing game.

use ab_glyph::{FontArc, PxScale};
use anyhow::Context as _;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::io::Cursor;

/// Background colours the guessing game picks from.
pub const PALETTE: [&str; 6] = [
    "#7289da", "#ed5555", "#43b581", "#f04747", "#faa61a", "#a3a3a3",
];

const IMAGE_WIDTH: u32 = 800;
const PADDING: u32 = 50;
const TEXT_PADDING: u32 = 30;
const LINE_SPACING: u32 = 15;
const FONT_SIZE: u32 = 24;
const CORNER_RADIUS: u32 = 20;
const WRAP_WIDTH: usize = 60;
const CARD_COLOR: Rgb<u8> = Rgb([0x1e, 0x21, 0x24]);
const TEXT_COLOR: Rgb<u8> = Rgb([0xff, 0xff, 0xff]);

pub struct QuoteRenderer {
    bold: FontArc,
    regular: FontArc,
}

impl QuoteRenderer {
    pub fn new(bold: FontArc, regular: FontArc) -> Self {
        Self { bold, regular }
    }

    pub fn load(bold_path: &str, regular_path: &str) -> anyhow::Result<Self> {
        Ok(Self::new(load_font(bold_path)?, load_font(regular_path)?))
    }

    /// Renders `quote` on a dark card over `background`, signed with the
    /// author or `?` while it is still a secret. Returns PNG bytes.
    pub fn render(
        &self,
        quote: &str,
        author: Option<&str>,
        background: Rgb<u8>,
    ) -> anyhow::Result<Vec<u8>> {
        let lines = wrap_lines(quote, WRAP_WIDTH);
        let card_height = card_height(lines.len());
        let mut image = RgbImage::from_pixel(IMAGE_WIDTH, card_height + PADDING * 2, background);

        let (x0, y0) = (PADDING, PADDING);
        let x1 = IMAGE_WIDTH - PADDING;
        fill_rounded_rect(&mut image, x0, y0, x1 - x0, card_height, CORNER_RADIUS, CARD_COLOR);

        let scale = PxScale::from(FONT_SIZE as f32);
        let mut y = y0 + TEXT_PADDING;
        for line in &lines {
            draw_text_mut(
                &mut image,
                TEXT_COLOR,
                (x0 + TEXT_PADDING) as i32,
                y as i32,
                scale,
                &self.bold,
                line,
            );
            y += FONT_SIZE + LINE_SPACING;
        }

        let signature = format!("- {}", author.unwrap_or("?"));
        let (width, _) = text_size(scale, &self.regular, &signature);
        let author_x = (x1 - TEXT_PADDING).saturating_sub(width).max(x0 + TEXT_PADDING);
        draw_text_mut(
            &mut image,
            TEXT_COLOR,
            author_x as i32,
            y as i32,
            scale,
            &self.regular,
            &signature,
        );

        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("Failed to encode quote card")?;
        Ok(bytes)
    }
}

fn load_font(path: &str) -> anyhow::Result<FontArc> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read font {}", path))?;
    FontArc::try_from_vec(data).with_context(|| format!("Invalid font file {}", path))
}

/// Parses `#rrggbb`.
pub fn parse_hex_color(raw: &str) -> anyhow::Result<Rgb<u8>> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        anyhow::bail!("'{}' is not a #rrggbb colour", raw);
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .with_context(|| format!("'{}' is not a #rrggbb colour", raw))
    };
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Greedy word wrap, one output line per visual line. Words longer than
/// `width` are split.
pub fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(width) {
                let needed = if current_len == 0 {
                    chunk.len()
                } else {
                    current_len + 1 + chunk.len()
                };
                if needed > width {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(chunk);
                current_len += chunk.len();
            }
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Height of the dark card for `line_count` quote lines plus the author line.
fn card_height(line_count: usize) -> u32 {
    let n = line_count.max(1) as u32;
    let text_height = n * FONT_SIZE + (n - 1) * LINE_SPACING;
    let author_height = FONT_SIZE + LINE_SPACING + 10;
    text_height + author_height + TEXT_PADDING * 2
}

fn fill_rounded_rect(
    image: &mut RgbImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    radius: u32,
    color: Rgb<u8>,
) {
    let r = radius.min(width / 2).min(height / 2);
    let (x, y, w, h, r) = (x as i32, y as i32, width, height, r as i32);

    draw_filled_rect_mut(image, Rect::at(x + r, y).of_size(w - 2 * r as u32, h), color);
    draw_filled_rect_mut(image, Rect::at(x, y + r).of_size(w, h - 2 * r as u32), color);

    let (right, bottom) = (x + w as i32 - 1 - r, y + h as i32 - 1 - r);
    for (cx, cy) in [(x + r, y + r), (right, y + r), (x + r, bottom), (right, bottom)] {
        draw_filled_circle_mut(image, (cx, cy), r, color);
    }
}
