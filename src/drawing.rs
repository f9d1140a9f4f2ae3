extern crate ab_glyph;
extern crate chrono;
extern crate image;
extern crate imageproc;

use anyhow::Context;

use crate::aggregate;
use crate::dashboard;
use crate::result;

pub const DEFAULT_FONT: &str = "/usr/share/fonts/truetype/roboto/hinted/RobotoCondensed-Regular.ttf";
pub const DEFAULT_BOLD_FONT: &str = "/usr/share/fonts/truetype/roboto/hinted/RobotoCondensed-Bold.ttf";

pub struct Styles {
    // Text is skipped when no font could be loaded.
    pub font: Option<ab_glyph::FontVec>,
    pub font_bold: Option<ab_glyph::FontVec>,

    pub color_black: image::Rgb<u8>,
    pub color_dark_gray: image::Rgb<u8>,
    pub color_light_gray: image::Rgb<u8>,
    pub color_white: image::Rgb<u8>,
    pub color_e_bikes: image::Rgb<u8>,
    pub color_standard_bikes: image::Rgb<u8>,
}

pub const IMAGE_WIDTH: u32 = 1200;
pub const IMAGE_HEIGHT: u32 = 800;

const KPI_TOP: i32 = 70;
const KPI_HEIGHT: u32 = 80;
const KPI_WIDTH: u32 = 370;
const KPI_GAP: i32 = 25;
const MARGIN: i32 = 20;

const CHART_TOP: i32 = 200;
const CHART_HEIGHT: u32 = 200;
const CHART_WIDTH: u32 = 570;

const HEAT_LEFT: i32 = 70;
const HEAT_TOP: i32 = 470;
const CELL_WIDTH: u32 = 11;
const CELL_HEIGHT: u32 = 38;
const LEGEND_LEFT: i32 = 1145;
const LEGEND_WIDTH: u32 = 20;

// Roughly viridis, dark for empty and yellow for full.
const HEAT_STOPS: [[u8; 3]; 5] = [
    [68, 1, 84],
    [59, 82, 139],
    [33, 145, 140],
    [94, 201, 98],
    [253, 231, 37],
];

impl Styles {
    pub fn new(font_path: Option<&str>) -> result::BikeDashResult<Styles> {
        let (font, font_bold) = match font_path {
            Some(path) => (Some(load_font(path)?), Some(load_font(path)?)),
            None => (load_default_font(DEFAULT_FONT), load_default_font(DEFAULT_BOLD_FONT)),
        };

        return Ok(Styles{
            font: font,
            font_bold: font_bold,
            color_black: image::Rgb([0, 0, 0]),
            color_dark_gray: image::Rgb([128, 128, 128]),
            color_light_gray: image::Rgb([235, 235, 235]),
            color_white: image::Rgb([255, 255, 255]),
            color_e_bikes: image::Rgb([31, 119, 180]),
            color_standard_bikes: image::Rgb([255, 127, 14]),
        });
    }
}

fn load_font(path: &str) -> result::BikeDashResult<ab_glyph::FontVec> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("while reading font {}", path))?;
    let font = ab_glyph::FontVec::try_from_vec(bytes)
        .with_context(|| format!("while parsing font {}", path))?;
    return Ok(font);
}

fn load_default_font(path: &str) -> Option<ab_glyph::FontVec> {
    match load_font(path) {
        Ok(font) => return Some(font),
        Err(err) => {
            warn!("No font, labels will be skipped: {}", err);
            return None;
        },
    }
}

pub fn generate_image(view: &dashboard::StationView, styles: &Styles) -> result::BikeDashResult<image::RgbImage> {
    let mut imgbuf = image::RgbImage::from_pixel(IMAGE_WIDTH, IMAGE_HEIGHT, styles.color_white);

    draw_text(&mut imgbuf, styles.color_black, MARGIN, 10, 40.0, styles.font_bold.as_ref(), &view.station.name);

    if let Some(ref latest) = view.latest {
        draw_kpis(&mut imgbuf, styles, latest);
    }

    draw_line_chart(
        &mut imgbuf, styles, MARGIN, "E-Bikes Over Time",
        &view.occupancy.e_bikes, styles.color_e_bikes, view.timezone);
    draw_line_chart(
        &mut imgbuf, styles, MARGIN * 2 + CHART_WIDTH as i32, "Standard Bikes Over Time",
        &view.occupancy.standard_bikes, styles.color_standard_bikes, view.timezone);

    draw_heatmap(&mut imgbuf, styles, &view.occupancy.heatmap);

    return Ok(imgbuf);
}

pub fn encode_png(imgbuf: &image::RgbImage) -> result::BikeDashResult<Vec<u8>> {
    let mut bytes = vec![];
    imgbuf.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    return Ok(bytes);
}

fn draw_kpis(imgbuf: &mut image::RgbImage, styles: &Styles, latest: &crate::store::Reading) {
    let kpis = [
        ("E-Bikes", latest.e_bikes),
        ("Standard Bikes", latest.standard_bikes),
        ("Empty Docks", latest.empty_slots),
    ];

    for (i, (label, value)) in kpis.iter().enumerate() {
        let x = MARGIN + i as i32 * (KPI_WIDTH as i32 + KPI_GAP);
        imageproc::drawing::draw_filled_rect_mut(
            imgbuf,
            imageproc::rect::Rect::at(x, KPI_TOP).of_size(KPI_WIDTH, KPI_HEIGHT),
            styles.color_light_gray);

        draw_text(imgbuf, styles.color_dark_gray, x + 10, KPI_TOP + 5, 22.0, styles.font.as_ref(), label);
        draw_text(imgbuf, styles.color_black, x + 10, KPI_TOP + 28, 44.0, styles.font_bold.as_ref(), &value.to_string());
    }
}

fn draw_line_chart(imgbuf: &mut image::RgbImage, styles: &Styles, left: i32, title: &str,
                   series: &[aggregate::TimePoint], color: image::Rgb<u8>, tz: chrono_tz::Tz) {
    draw_text(imgbuf, styles.color_black, left, CHART_TOP - 30, 24.0, styles.font_bold.as_ref(), title);

    imageproc::drawing::draw_hollow_rect_mut(
        imgbuf,
        imageproc::rect::Rect::at(left, CHART_TOP).of_size(CHART_WIDTH, CHART_HEIGHT),
        styles.color_dark_gray);

    let (first, last) = match (series.first(), series.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => return,
    };

    let max_value = std::cmp::max(1, series.iter().map(|p| p.1).max().unwrap_or(0)) as f32;
    let span_seconds = (last - first).num_seconds() as f32;

    let to_xy = |point: &aggregate::TimePoint| -> (f32, f32) {
        let frac_x = if span_seconds > 0.0 {
            (point.0 - first).num_seconds() as f32 / span_seconds
        } else {
            0.5
        };
        let frac_y = point.1 as f32 / max_value;
        return (
            left as f32 + frac_x * (CHART_WIDTH - 1) as f32,
            (CHART_TOP + CHART_HEIGHT as i32 - 1) as f32 - frac_y * (CHART_HEIGHT - 1) as f32,
        );
    };

    let mut previous = to_xy(&series[0]);
    for point in series.iter().skip(1) {
        let next = to_xy(point);
        imageproc::drawing::draw_line_segment_mut(imgbuf, previous, next, color);
        previous = next;
    }
    if series.len() == 1 {
        imageproc::drawing::draw_filled_circle_mut(
            imgbuf, (previous.0 as i32, previous.1 as i32), 3, color);
    }

    let label_y = CHART_TOP + CHART_HEIGHT as i32 + 4;
    draw_text(imgbuf, styles.color_dark_gray, left + 4, CHART_TOP + 4, 16.0, styles.font.as_ref(),
              &format!("{}", max_value as u32));
    draw_text(imgbuf, styles.color_dark_gray, left, label_y, 16.0, styles.font.as_ref(),
              &first.with_timezone(&tz).format("%d %b %H:%M").to_string());
    draw_text(imgbuf, styles.color_dark_gray, left + CHART_WIDTH as i32 - 85, label_y, 16.0, styles.font.as_ref(),
              &last.with_timezone(&tz).format("%d %b %H:%M").to_string());
}

fn draw_heatmap(imgbuf: &mut image::RgbImage, styles: &Styles, grid: &aggregate::HeatmapGrid) {
    let max_value = grid.max_value();

    draw_text(imgbuf, styles.color_black, MARGIN, HEAT_TOP - 50, 24.0, styles.font_bold.as_ref(),
              "Average Bikes by Day and Time");

    // Monday on top.
    for (row, (day, values)) in grid.day_labels().iter().zip(grid.rows().iter()).enumerate() {
        let y = HEAT_TOP + row as i32 * CELL_HEIGHT as i32;
        let short_day: String = day.chars().take(3).collect();
        draw_text(imgbuf, styles.color_black, MARGIN, y + 10, 18.0, styles.font.as_ref(), &short_day);

        for (slot, value) in values.iter().enumerate() {
            imageproc::drawing::draw_filled_rect_mut(
                imgbuf,
                imageproc::rect::Rect::at(
                    /* x= */ HEAT_LEFT + slot as i32 * CELL_WIDTH as i32,
                    /* y= */ y)
                    .of_size(CELL_WIDTH, CELL_HEIGHT),
                heat_color(*value, max_value));
        }
    }

    let labels_y = HEAT_TOP + aggregate::DAYS_PER_WEEK as i32 * CELL_HEIGHT as i32 + 4;
    for (slot, label) in grid.time_labels().iter().enumerate().step_by(8) {
        draw_text(imgbuf, styles.color_dark_gray, HEAT_LEFT + slot as i32 * CELL_WIDTH as i32, labels_y,
                  14.0, styles.font.as_ref(), label);
    }

    draw_legend(imgbuf, styles, max_value);
}

fn draw_legend(imgbuf: &mut image::RgbImage, styles: &Styles, max_value: f64) {
    let height = aggregate::DAYS_PER_WEEK as u32 * CELL_HEIGHT;

    for i in 0..height {
        let frac = 1.0 - i as f64 / (height - 1) as f64;
        imageproc::drawing::draw_filled_rect_mut(
            imgbuf,
            imageproc::rect::Rect::at(LEGEND_LEFT, HEAT_TOP + i as i32).of_size(LEGEND_WIDTH, 1),
            heat_color(frac, 1.0));
    }

    draw_text(imgbuf, styles.color_dark_gray, LEGEND_LEFT, HEAT_TOP - 20, 14.0, styles.font.as_ref(),
              &format!("{:.1}", max_value));
    draw_text(imgbuf, styles.color_dark_gray, LEGEND_LEFT, HEAT_TOP + height as i32 + 4, 14.0, styles.font.as_ref(),
              "0");
}

// Linear scale from 0 to `max_value`.
pub fn heat_color(value: f64, max_value: f64) -> image::Rgb<u8> {
    let frac = if max_value > 0.0 && value.is_finite() {
        (value / max_value).max(0.0).min(1.0)
    } else {
        0.0
    };

    let position = frac * (HEAT_STOPS.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = std::cmp::min(lower + 1, HEAT_STOPS.len() - 1);
    let t = position - lower as f64;

    let mut rgb = [0u8; 3];
    for c in 0..3 {
        let a = HEAT_STOPS[lower][c] as f64;
        let b = HEAT_STOPS[upper][c] as f64;
        rgb[c] = (a + (b - a) * t).round() as u8;
    }
    return image::Rgb(rgb);
}

fn draw_text(imgbuf: &mut image::RgbImage, color: image::Rgb<u8>, x: i32, y: i32, size: f32,
             font: Option<&ab_glyph::FontVec>, text: &str) {
    if let Some(font) = font {
        imageproc::drawing::draw_text_mut(imgbuf, color, x, y, ab_glyph::PxScale::from(size), font, text);
    }
}
