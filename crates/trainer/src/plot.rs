use anyhow::{bail, Context, Result};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgb, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::metrics::EpochHistory;

pub const ACCURACY_FIGURE: &str = "accuracy.png";
pub const LOSS_FIGURE: &str = "loss.png";

const TRAIN_COLOR: [u8; 3] = [31, 119, 180];
const TEST_COLOR: [u8; 3] = [255, 127, 14];
const AXIS_COLOR: [u8; 3] = [40, 40, 40];
const GRID_COLOR: [u8; 3] = [225, 225, 225];
const BACKGROUND: [u8; 3] = [255, 255, 255];

/// One curve of a chart, values indexed by epoch.
#[derive(Debug, Clone, Copy)]
pub struct Series<'a> {
    pub name: &'a str,
    pub values: &'a [f64],
    pub color: [u8; 3],
}

/// A rendered figure and the caption that goes with it in the run report.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub file_name: &'static str,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub legend: Vec<(String, [u8; 3])>,
}

/// Fixed-size line chart with a light grid and one legend swatch per series.
#[derive(Debug, Clone, Copy)]
pub struct LineChart {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
}

impl Default for LineChart {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            margin: 48,
        }
    }
}

impl LineChart {
    pub fn render(&self, series: &[Series<'_>]) -> Result<RgbImage> {
        if self.width <= 2 * self.margin || self.height <= 2 * self.margin {
            bail!("chart {}x{} leaves no room inside a {} pixel margin", self.width, self.height, self.margin);
        }

        let mut img = RgbImage::from_pixel(self.width, self.height, Rgb(BACKGROUND));
        let (left, top) = (self.margin as i64, self.margin as i64);
        let (right, bottom) = (
            (self.width - self.margin) as i64,
            (self.height - self.margin) as i64,
        );

        for i in 0..=4 {
            let y = top + (bottom - top) * i / 4;
            draw_line(&mut img, (left, y), (right, y), GRID_COLOR);
        }
        draw_line(&mut img, (left, bottom), (right, bottom), AXIS_COLOR);
        draw_line(&mut img, (left, top), (left, bottom), AXIS_COLOR);

        let points = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
        let (lo, hi) = value_range(series);
        let x_of = |i: usize| -> i64 {
            if points <= 1 {
                (left + right) / 2
            } else {
                left + (right - left) * i as i64 / (points as i64 - 1)
            }
        };
        let y_of = |v: f64| -> i64 {
            let t = (v - lo) / (hi - lo);
            bottom - ((bottom - top) as f64 * t).round() as i64
        };

        for s in series {
            let coords: Vec<(i64, i64)> = s
                .values
                .iter()
                .enumerate()
                .map(|(i, &v)| (x_of(i), y_of(v)))
                .collect();
            for pair in coords.windows(2) {
                draw_line(&mut img, pair[0], pair[1], s.color);
            }
            for &point in &coords {
                fill_square(&mut img, point, 2, s.color);
            }
        }

        for (i, s) in series.iter().enumerate() {
            let x = right - 12 - 20 * i as i64;
            fill_square(&mut img, (x, top - 20), 5, s.color);
        }

        Ok(img)
    }
}

fn value_range(series: &[Series<'_>]) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in series.iter().flat_map(|s| s.values.iter().copied()) {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        let pad = if lo == 0.0 { 0.5 } else { lo.abs() * 0.1 };
        return (lo - pad, hi + pad);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: [u8; 3]) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, Rgb(color));
    }
}

fn fill_square(img: &mut RgbImage, (cx, cy): (i64, i64), half: i64, color: [u8; 3]) {
    for y in cy - half..=cy + half {
        for x in cx - half..=cx + half {
            put(img, x, y, color);
        }
    }
}

// Bresenham
fn draw_line(img: &mut RgbImage, (x0, y0): (i64, i64), (x1, y1): (i64, i64), color: [u8; 3]) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let (mut x, mut y, mut err) = (x0, y0, dx + dy);
    loop {
        put(img, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

pub fn save_png(path: &Path, img: &RgbImage) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    PngEncoder::new(BufWriter::new(file))
        .write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
        .with_context(|| format!("failed to encode {}", path.display()))
}

/// Renders train/test accuracy and loss curves into `dir`.
pub fn plot_history(dir: &Path, title: &str, history: &EpochHistory) -> Result<Vec<Figure>> {
    let chart = LineChart::default();
    let panels = [
        (ACCURACY_FIGURE, "accuracy", &history.train_accuracies, &history.test_accuracies),
        (LOSS_FIGURE, "loss", &history.train_losses, &history.test_losses),
    ];

    let mut figures = Vec::with_capacity(panels.len());
    for (file_name, y_label, train, test) in panels {
        let series = [
            Series {
                name: "train",
                values: train,
                color: TRAIN_COLOR,
            },
            Series {
                name: "test",
                values: test,
                color: TEST_COLOR,
            },
        ];
        save_png(&dir.join(file_name), &chart.render(&series)?)?;

        figures.push(Figure {
            file_name,
            title: title.to_string(),
            x_label: "epoch".to_string(),
            y_label: y_label.to_string(),
            legend: series
                .iter()
                .map(|s| (s.name.to_string(), s.color))
                .collect(),
        });
    }
    Ok(figures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_are_drawn_in_their_colors() {
        let chart = LineChart {
            width: 120,
            height: 100,
            margin: 20,
        };
        let img = chart
            .render(&[Series {
                name: "train",
                values: &[0.1, 0.5, 0.9],
                color: TRAIN_COLOR,
            }])
            .unwrap();

        assert_eq!(img.dimensions(), (120, 100));
        let colored = img.pixels().filter(|p| p.0 == TRAIN_COLOR).count();
        assert!(colored > 20);
        assert_eq!(img.get_pixel(0, 0).0, BACKGROUND);
    }

    #[test]
    fn flat_and_empty_series_do_not_panic() {
        let chart = LineChart::default();
        chart
            .render(&[Series {
                name: "flat",
                values: &[0.0, 0.0],
                color: TEST_COLOR,
            }])
            .unwrap();
        chart.render(&[]).unwrap();
        chart
            .render(&[Series {
                name: "single",
                values: &[0.3],
                color: TEST_COLOR,
            }])
            .unwrap();
    }

    #[test]
    fn too_small_chart_is_rejected() {
        let chart = LineChart {
            width: 30,
            height: 30,
            margin: 20,
        };
        assert!(chart.render(&[]).is_err());
    }

    #[test]
    fn history_plots_write_two_pngs() {
        let dir = std::env::temp_dir().join(format!("plot_history_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let history = EpochHistory {
            train_accuracies: vec![0.5, 0.7],
            train_losses: vec![0.02, 0.01],
            test_accuracies: vec![0.4, 0.6],
            test_losses: vec![0.03, 0.02],
            learning_rates: vec![1e-3, 1e-3],
            seconds: vec![1.0, 1.0],
        };

        let figures = plot_history(&dir, "tripadvisor", &history).unwrap();
        let accuracy_png = std::fs::read(dir.join(ACCURACY_FIGURE)).unwrap();
        let loss_exists = dir.join(LOSS_FIGURE).exists();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(figures.len(), 2);
        assert_eq!(figures[0].x_label, "epoch");
        assert_eq!(figures[1].title, "tripadvisor");
        assert_eq!(&accuracy_png[..4], b"\x89PNG");
        assert!(loss_exists);
    }
}
