//! svg charts: survival curves with confidence bands and a hazard-ratio
//! forest plot. plain svg text, one file per chart.

use std::fs;

use crate::{
    analysis::{GroupComparison, RetentionAnalysis},
    config::OutputPaths,
    error::{Result, SurvivalError},
    kaplan_meier::KaplanMeier,
    model::{p_clause, CoxSummary},
};

pub const KM_OVERALL: &str = "km_overall.svg";
pub const KM_BY_SUBSCRIPTION: &str = "km_by_subscription.svg";
pub const KM_BY_ACTIVITY: &str = "km_by_activity.svg";
pub const COX_HAZARD_RATIOS: &str = "cox_hazard_ratios.svg";

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const TOP: f64 = 50.0;
const RIGHT: f64 = 30.0;
const BOTTOM: f64 = 60.0;
const KM_LEFT: f64 = 70.0;
const FOREST_LEFT: f64 = 220.0;

const PALETTE: [&str; 2] = ["#1f77b4", "#d62728"];
const GRID: &str = "#dddddd";

/// maps data coordinates onto the plot area
struct Frame {
    left: f64,
    x_min: f64,
    x_max: f64,
    log_x: bool,
}

impl Frame {
    fn plot_width(&self) -> f64 {
        WIDTH - self.left - RIGHT
    }

    fn plot_height() -> f64 {
        HEIGHT - TOP - BOTTOM
    }

    fn x(&self, value: f64) -> f64 {
        let (v, lo, hi) = if self.log_x {
            (value.ln(), self.x_min.ln(), self.x_max.ln())
        } else {
            (value, self.x_min, self.x_max)
        };
        self.left + (v - lo) / (hi - lo) * self.plot_width()
    }

    /// survival axis, 1 at the top
    fn y(survival: f64) -> f64 {
        TOP + (1.0 - survival) * Self::plot_height()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn open_svg(title: &str) -> String {
    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" font-family=\"sans-serif\">\n",
        w = WIDTH,
        h = HEIGHT
    );
    svg.push_str(&format!(
        "<rect width=\"{}\" height=\"{}\" fill=\"white\"/>\n",
        WIDTH, HEIGHT
    ));
    svg.push_str(&format!(
        "<text x=\"{}\" y=\"28\" text-anchor=\"middle\" font-size=\"16\" font-weight=\"bold\">{}</text>\n",
        WIDTH / 2.0,
        escape(title)
    ));
    svg
}

/// 1, 2 or 5 times a power of ten, giving at most ~8 ticks
fn tick_step(span: f64) -> f64 {
    let raw = span / 8.0;
    let magnitude = 10f64.powf(raw.log10().floor());
    [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|&step| step >= raw)
        .unwrap_or(10.0 * magnitude)
}

/// multiples of `step` from 0 up to `x_max`, computed (not accumulated) so
/// labels stay clean
fn x_ticks(x_max: f64, step: f64) -> Vec<f64> {
    let count = (x_max / step + 1e-9).floor() as usize;
    (0..=count).map(|k| k as f64 * step).collect()
}

fn path_data(points: &[(f64, f64)]) -> String {
    points
        .iter()
        .enumerate()
        .map(|(i, (x, y))| format!("{}{:.2},{:.2}", if i == 0 { "M" } else { "L" }, x, y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn survival_axes(svg: &mut String, frame: &Frame, x_label: &str) {
    let bottom = TOP + Frame::plot_height();
    let right = WIDTH - RIGHT;

    for i in 0..=5 {
        let s = i as f64 / 5.0;
        let y = Frame::y(s);
        svg.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\"/>\n",
            frame.left, y, right, y, GRID
        ));
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"end\" font-size=\"11\">{:.1}</text>\n",
            frame.left - 6.0,
            y + 4.0,
            s
        ));
    }

    let step = tick_step(frame.x_max - frame.x_min);
    for tick in x_ticks(frame.x_max, step) {
        let x = frame.x(tick);
        svg.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\"/>\n",
            x, TOP, x, bottom, GRID
        ));
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-size=\"11\">{}</text>\n",
            x,
            bottom + 16.0,
            tick_label(tick)
        ));
    }

    svg.push_str(&format!(
        "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"none\" stroke=\"black\"/>\n",
        frame.left,
        TOP,
        frame.plot_width(),
        Frame::plot_height()
    ));
    svg.push_str(&format!(
        "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-size=\"13\">{}</text>\n",
        frame.left + frame.plot_width() / 2.0,
        HEIGHT - 15.0,
        escape(x_label)
    ));
    svg.push_str(&format!(
        "<text x=\"18\" y=\"{:.2}\" text-anchor=\"middle\" font-size=\"13\" transform=\"rotate(-90 18 {:.2})\">Survival probability (retention)</text>\n",
        TOP + Frame::plot_height() / 2.0,
        TOP + Frame::plot_height() / 2.0
    ));
}

/// step curve plus its shaded confidence band
fn survival_curve(svg: &mut String, frame: &Frame, km: &KaplanMeier, color: &str) {
    let curve = km.curve();

    let mut band: Vec<(f64, f64)> = curve
        .iter()
        .map(|p| (frame.x(p.time), Frame::y(p.upper)))
        .collect();
    band.extend(curve.iter().rev().map(|p| (frame.x(p.time), Frame::y(p.lower))));
    svg.push_str(&format!(
        "<path d=\"{} Z\" fill=\"{}\" fill-opacity=\"0.2\" stroke=\"none\"/>\n",
        path_data(&band),
        color
    ));

    let line: Vec<(f64, f64)> = curve
        .iter()
        .map(|p| (frame.x(p.time), Frame::y(p.survival)))
        .collect();
    svg.push_str(&format!(
        "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\"/>\n",
        path_data(&line),
        color
    ));
}

fn legend(svg: &mut String, entries: &[(String, &str)]) {
    let x = WIDTH - RIGHT - 200.0;
    for (i, (label, color)) in entries.iter().enumerate() {
        let y = TOP + 18.0 + i as f64 * 20.0;
        svg.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"3\"/>\n",
            x,
            y - 4.0,
            x + 24.0,
            y - 4.0,
            color
        ));
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"12\">{}</text>\n",
            x + 30.0,
            y,
            escape(label)
        ));
    }
}

fn km_frame(curves: &[&KaplanMeier]) -> Frame {
    let x_max = curves
        .iter()
        .map(|km| km.max_time())
        .fold(0.0, f64::max)
        .max(1.0);
    Frame { left: KM_LEFT, x_min: 0.0, x_max, log_x: false }
}

/// overall retention with its band and the 50% reference line
pub fn render_km_overall(km: &KaplanMeier) -> String {
    let frame = km_frame(&[km]);
    let mut svg = open_svg("Kaplan-Meier Survival Curve: Overall User Retention");
    survival_axes(&mut svg, &frame, "Days since signup");
    survival_curve(&mut svg, &frame, km, PALETTE[0]);

    let half = Frame::y(0.5);
    svg.push_str(&format!(
        "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"gray\" stroke-dasharray=\"6,4\"/>\n",
        frame.left,
        half,
        WIDTH - RIGHT,
        half
    ));

    let mut entries = vec![(format!("{} (n = {})", km.label(), km.n_samples()), PALETTE[0])];
    if let Some(median) = km.median() {
        let x = frame.x(median);
        svg.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"gray\" stroke-dasharray=\"6,4\"/>\n",
            x,
            half,
            x,
            TOP + Frame::plot_height()
        ));
        entries.push((format!("median = {:.1} days", median), "gray"));
    } else {
        entries.push(("median not reached".to_string(), "gray"));
    }
    legend(&mut svg, &entries);

    svg.push_str("</svg>\n");
    svg
}

/// two curves on one chart, log-rank p in the title
pub fn render_km_comparison(comparison: &GroupComparison, title: &str) -> String {
    let frame = km_frame(&[&comparison.a, &comparison.b]);
    let full_title = format!("{} (log-rank {})", title, p_clause(comparison.test.p_value));
    let mut svg = open_svg(&full_title);
    survival_axes(&mut svg, &frame, "Days since signup");

    let mut entries = Vec::with_capacity(2);
    for (km, color) in [&comparison.a, &comparison.b].into_iter().zip(PALETTE) {
        survival_curve(&mut svg, &frame, km, color);
        entries.push((format!("{} (n = {})", km.label(), km.n_samples()), color));
    }
    legend(&mut svg, &entries);

    svg.push_str("</svg>\n");
    svg
}

/// hazard ratios with confidence intervals on a log axis, reference at 1
pub fn render_hazard_ratios(summary: &CoxSummary) -> Result<String> {
    if summary.rows.is_empty() {
        return Err(SurvivalError::invalid_survival_data("no coefficients to plot"));
    }
    for row in &summary.rows {
        let bounds = [row.hr_lower, row.hazard_ratio, row.hr_upper];
        if bounds.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(SurvivalError::numerical_error(format!(
                "hazard ratio interval for '{}' can't be drawn on a log axis",
                row.name
            )));
        }
    }

    let lo = summary.rows.iter().map(|r| r.hr_lower).fold(1.0, f64::min) / 1.25;
    let hi = summary.rows.iter().map(|r| r.hr_upper).fold(1.0, f64::max) * 1.25;
    let frame = Frame { left: FOREST_LEFT, x_min: lo, x_max: hi, log_x: true };

    let pct = summary.confidence_level * 100.0;
    let mut svg = open_svg(&format!("Cox Proportional Hazards: Hazard Ratios ({:.0}% CI)", pct));

    let bottom = TOP + Frame::plot_height();
    let row_gap = Frame::plot_height() / summary.rows.len() as f64;

    // decade ticks at 1, 2, 5 x 10^k
    let mut decade = 10f64.powf(lo.log10().floor());
    while decade <= hi {
        for m in [1.0, 2.0, 5.0] {
            let tick = m * decade;
            if tick < lo || tick > hi {
                continue;
            }
            let x = frame.x(tick);
            svg.push_str(&format!(
                "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\"/>\n",
                x, TOP, x, bottom, GRID
            ));
            svg.push_str(&format!(
                "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-size=\"11\">{}</text>\n",
                x,
                bottom + 16.0,
                tick_label(tick)
            ));
        }
        decade *= 10.0;
    }

    let one = frame.x(1.0);
    svg.push_str(&format!(
        "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-dasharray=\"6,4\"/>\n",
        one, TOP, one, bottom, PALETTE[1]
    ));

    for (i, row) in summary.rows.iter().enumerate() {
        let y = TOP + row_gap * (i as f64 + 0.5);
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"end\" font-size=\"12\">{}</text>\n",
            frame.left - 10.0,
            y + 4.0,
            escape(&row.name)
        ));
        svg.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"black\" stroke-width=\"2\"/>\n",
            frame.x(row.hr_lower),
            y,
            frame.x(row.hr_upper),
            y
        ));
        svg.push_str(&format!(
            "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"5\" fill=\"{}\"/>\n",
            frame.x(row.hazard_ratio),
            y,
            PALETTE[0]
        ));
    }

    svg.push_str(&format!(
        "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"none\" stroke=\"black\"/>\n",
        frame.left,
        TOP,
        frame.plot_width(),
        Frame::plot_height()
    ));
    svg.push_str(&format!(
        "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-size=\"13\">Hazard ratio (log scale)</text>\n",
        frame.left + frame.plot_width() / 2.0,
        HEIGHT - 15.0
    ));

    svg.push_str("</svg>\n");
    Ok(svg)
}

fn tick_label(value: f64) -> String {
    // trim the float noise from 3 * 0.2 and friends
    let text = format!("{:.4}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// write all four charts into the plots directory
pub fn write_all(analysis: &RetentionAnalysis, paths: &OutputPaths) -> Result<()> {
    fs::write(paths.plot(KM_OVERALL), render_km_overall(&analysis.overall))?;
    fs::write(
        paths.plot(KM_BY_SUBSCRIPTION),
        render_km_comparison(&analysis.by_subscription, "Survival by Subscription Tier"),
    )?;
    fs::write(
        paths.plot(KM_BY_ACTIVITY),
        render_km_comparison(&analysis.by_activity, "Survival by Activity Level"),
    )?;
    fs::write(paths.plot(COX_HAZARD_RATIOS), render_hazard_ratios(&analysis.cox)?)?;

    log::info!("wrote 4 charts to {}", paths.plots_dir().display());
    Ok(())
}
