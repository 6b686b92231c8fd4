use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::sync::OnceLock;
use tracing::warn;

use super::mel::{hz_to_mel, Spectrogram};

const TOP_MARGIN: u32 = 22;
const BOTTOM_MARGIN: u32 = 40;
const LEFT_MARGIN: u32 = 58;
const RIGHT_MARGIN: u32 = 6;
const COLORBAR_WIDTH: u32 = 20;
const COLORBAR_GAP: u32 = 12;
/// Room right of the colorbar for "-80 dB"
const COLORBAR_LABELS: u32 = 54;
const TICK_LEN: u32 = 4;
const LABEL_PX: f32 = 13.0;
/// Colorbar tick spacing in dB
const TICK_DB: f32 = 10.0;
/// Frequencies labelled on the mel axis
const HZ_TICKS: [f64; 7] = [0.0, 512.0, 1024.0, 2048.0, 4096.0, 8192.0, 16384.0];
const TIME_STEPS: [f64; 9] = [0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];
const MAX_TIME_TICKS: f64 = 8.0;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const FRAME: Rgb<u8> = Rgb([0, 0, 0]);

static FONT_DATA: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Anchor points of a magma-like perceptual colormap
const MAGMA: [(f32, [u8; 3]); 9] = [
    (0.0, [0, 0, 4]),
    (0.125, [28, 16, 68]),
    (0.25, [79, 18, 123]),
    (0.375, [129, 37, 129]),
    (0.5, [181, 54, 122]),
    (0.625, [229, 80, 100]),
    (0.75, [251, 135, 97]),
    (0.875, [254, 194, 135]),
    (1.0, [252, 253, 191]),
];

/// Physical extent of the plotted data, used for axis labels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axes {
    /// Length of the analysed signal in seconds
    pub duration_secs: f64,
    /// Frequency of the top mel band edge (Nyquist)
    pub fmax_hz: f64,
}

/// Pixel rectangles of the plot and the colorbar; `x1`/`y1` are exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub plot_x0: u32,
    pub plot_x1: u32,
    pub plot_y0: u32,
    pub plot_y1: u32,
    pub bar_x0: u32,
    pub bar_x1: u32,
}

impl Layout {
    /// Fit the plot into `width` x `height`, growing tiny canvases
    pub fn new(width: u32, height: u32) -> Self {
        let fixed_w = LEFT_MARGIN + COLORBAR_GAP + COLORBAR_WIDTH + COLORBAR_LABELS + RIGHT_MARGIN;
        let fixed_h = TOP_MARGIN + BOTTOM_MARGIN;
        let width = width.max(fixed_w + 16);
        let height = height.max(fixed_h + 16);

        let plot_x1 = width - RIGHT_MARGIN - COLORBAR_LABELS - COLORBAR_WIDTH - COLORBAR_GAP;
        let bar_x0 = plot_x1 + COLORBAR_GAP;

        Self {
            width,
            height,
            plot_x0: LEFT_MARGIN,
            plot_x1,
            plot_y0: TOP_MARGIN,
            plot_y1: height - BOTTOM_MARGIN,
            bar_x0,
            bar_x1: bar_x0 + COLORBAR_WIDTH,
        }
    }

    pub fn plot_width(&self) -> u32 {
        self.plot_x1 - self.plot_x0
    }

    pub fn plot_height(&self) -> u32 {
        self.plot_y1 - self.plot_y0
    }
}

fn font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(FONT_DATA) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("Failed to load label font, rendering without labels: {}", e);
            None
        }
    })
    .as_ref()
}

/// Map `t` in [0, 1] to a color; out-of-range values are clamped
pub fn colormap(t: f32) -> Rgb<u8> {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

    for pair in MAGMA.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            let f = (t - t0) / (t1 - t0);
            let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * f).round() as u8;
            return Rgb([lerp(c0[0], c1[0]), lerp(c0[1], c1[1]), lerp(c0[2], c1[2])]);
        }
    }
    Rgb(MAGMA[MAGMA.len() - 1].1)
}

/// Colorbar label, e.g. `+0 dB`, `-40 dB`
pub fn db_label(db: f32) -> String {
    // Avoid "-0 dB" from a rounded negative zero
    let db = if db.round() == 0.0 { 0.0 } else { db };
    format!("{:+.0} dB", db)
}

/// Smallest step from a fixed ladder giving at most eight ticks
pub fn time_step(duration_secs: f64) -> f64 {
    TIME_STEPS
        .iter()
        .copied()
        .find(|step| duration_secs / step <= MAX_TIME_TICKS)
        .unwrap_or(TIME_STEPS[TIME_STEPS.len() - 1] * (duration_secs / 60.0 / MAX_TIME_TICKS).ceil())
}

fn time_label(secs: f64, step: f64) -> String {
    if step < 1.0 {
        format!("{:.1}", secs)
    } else {
        format!("{:.0}", secs)
    }
}

/// Draw a dB spectrogram as a heatmap (time left to right, low mel bands at
/// the bottom) with a labelled time axis, a Hz axis on mel spacing, and a
/// colorbar on the right spanning `min_db..max_db`.
pub fn render_heatmap(
    db: &Spectrogram,
    min_db: f32,
    max_db: f32,
    axes: &Axes,
    width: u32,
    height: u32,
) -> RgbImage {
    let layout = Layout::new(width, height);
    let mut img = RgbImage::from_pixel(layout.width, layout.height, BACKGROUND);

    let span = (max_db - min_db).max(f32::EPSILON);
    let normalize = |v: f32| (v - min_db) / span;

    let plot_w = layout.plot_width();
    let plot_h = layout.plot_height();

    if db.n_frames > 0 && db.n_mels > 0 {
        for px in 0..plot_w {
            let frame = (px as usize * db.n_frames / plot_w as usize).min(db.n_frames - 1);
            for py in 0..plot_h {
                // py = 0 is the top row, i.e. the highest mel band
                let row_from_bottom = plot_h - 1 - py;
                let mel = (row_from_bottom as usize * db.n_mels / plot_h as usize).min(db.n_mels - 1);
                img.put_pixel(
                    layout.plot_x0 + px,
                    layout.plot_y0 + py,
                    colormap(normalize(db.get(mel, frame))),
                );
            }
        }
    }
    draw_border(&mut img, layout.plot_x0, layout.plot_y0, layout.plot_x1, layout.plot_y1);

    for py in 0..plot_h {
        let t = (plot_h - 1 - py) as f32 / (plot_h - 1).max(1) as f32;
        let color = colormap(t);
        for x in layout.bar_x0..layout.bar_x1 {
            img.put_pixel(x, layout.plot_y0 + py, color);
        }
    }
    draw_border(&mut img, layout.bar_x0, layout.plot_y0, layout.bar_x1, layout.plot_y1);

    let font = font();

    // Colorbar ticks every TICK_DB, counted down from max_db
    let mut tick = max_db;
    while tick >= min_db {
        let y = y_for_fraction(&layout, normalize(tick));
        for x in layout.bar_x1..layout.bar_x1 + TICK_LEN {
            img.put_pixel(x, y, FRAME);
        }
        if let Some(font) = font {
            let text = db_label(tick);
            let (_, h) = text_size(PxScale::from(LABEL_PX), font, &text);
            let x = layout.bar_x1 + TICK_LEN + 2;
            draw_text_mut(&mut img, FRAME, x as i32, y as i32 - h as i32 / 2, LABEL_PX, font, &text);
        }
        tick -= TICK_DB;
    }

    // Frequency axis: Hz values placed on the mel scale
    let mel_max = hz_to_mel(axes.fmax_hz.max(1.0));
    for hz in HZ_TICKS.iter().copied().filter(|&hz| hz <= axes.fmax_hz) {
        let y = y_for_fraction(&layout, (hz_to_mel(hz) / mel_max) as f32);
        for x in layout.plot_x0 - TICK_LEN..layout.plot_x0 {
            img.put_pixel(x, y, FRAME);
        }
        if let Some(font) = font {
            let text = format!("{}", hz as u32);
            let (w, h) = text_size(PxScale::from(LABEL_PX), font, &text);
            let x = layout.plot_x0 as i32 - TICK_LEN as i32 - 3 - w as i32;
            draw_text_mut(&mut img, FRAME, x, y as i32 - h as i32 / 2, LABEL_PX, font, &text);
        }
    }

    // Time axis
    if axes.duration_secs > 0.0 {
        let step = time_step(axes.duration_secs);
        let mut k = 0u32;
        loop {
            let secs = k as f64 * step;
            if secs > axes.duration_secs + 1e-9 {
                break;
            }
            let frac = secs / axes.duration_secs;
            let x = layout.plot_x0 + ((plot_w - 1) as f64 * frac).round() as u32;
            for y in layout.plot_y1..layout.plot_y1 + TICK_LEN {
                img.put_pixel(x, y, FRAME);
            }
            if let Some(font) = font {
                let text = time_label(secs, step);
                let (w, _) = text_size(PxScale::from(LABEL_PX), font, &text);
                let y = (layout.plot_y1 + TICK_LEN + 2) as i32;
                draw_text_mut(&mut img, FRAME, x as i32 - w as i32 / 2, y, LABEL_PX, font, &text);
            }
            k += 1;
        }
    }

    if let Some(font) = font {
        let title = "Time (s)";
        let (w, h) = text_size(PxScale::from(LABEL_PX), font, title);
        let x = layout.plot_x0 + plot_w / 2 - w / 2;
        let y = layout.height - 2 - h;
        draw_text_mut(&mut img, FRAME, x as i32, y as i32, LABEL_PX, font, title);

        let (w, _) = text_size(PxScale::from(LABEL_PX), font, "Hz");
        let x = layout.plot_x0 - TICK_LEN - 3 - w;
        draw_text_mut(&mut img, FRAME, x as i32, 3, LABEL_PX, font, "Hz");
    }

    img
}

/// Row for a value at fraction `t` of the plot height, 0 at the bottom edge
fn y_for_fraction(layout: &Layout, t: f32) -> u32 {
    let t = t.clamp(0.0, 1.0);
    layout.plot_y1 - 1 - ((layout.plot_height() - 1) as f32 * t).round() as u32
}

fn draw_border(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) {
    for x in x0..x1 {
        img.put_pixel(x, y0, FRAME);
        img.put_pixel(x, y1 - 1, FRAME);
    }
    for y in y0..y1 {
        img.put_pixel(x0, y, FRAME);
        img.put_pixel(x1 - 1, y, FRAME);
    }
}
