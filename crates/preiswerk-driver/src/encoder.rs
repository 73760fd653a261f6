// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TSPL command generation for price stickers.
//
// Pure functions only: a label request plus printer settings in, a sequence
// of textual printer commands out. The transport appends CRLF and handles
// all device I/O.

use preiswerk_core::error::Result;
use preiswerk_core::types::{LabelRequest, PrinterSettings};
use rust_decimal::{Decimal, RoundingStrategy};

/// Currency symbol printed in front of the price.
const CURRENCY_SYMBOL: &str = "$";

/// TSPL built-in font for the item name, with its cell width in dots.
const ITEM_FONT: &str = "3";
const ITEM_CHAR_WIDTH_DOTS: u32 = 16;

/// Smaller font for the supplier line.
const SUPPLIER_FONT: &str = "2";

/// Font and scale for the price, the most prominent element.
const PRICE_FONT: &str = "4";
const PRICE_SCALE: u32 = 2;

/// Vertical distance between stacked text lines, in millimetres.
const LINE_PITCH_MM: f64 = 8.0;

/// Top margin before the first text line, in millimetres.
const TOP_MARGIN_MM: f64 = 3.0;

/// Convert millimetres to printer dots at the given resolution.
pub fn mm_to_dots(mm: f64, dpi: u32) -> u32 {
    (mm / 25.4 * f64::from(dpi)).round() as u32
}

/// Exact inverse of [`mm_to_dots`] modulo rounding.
pub fn dots_to_mm(dots: u32, dpi: u32) -> f64 {
    f64::from(dots) * 25.4 / f64::from(dpi)
}

/// Greedy word wrap against an estimated line width of
/// `chars * font_size` dots.
///
/// A single word that alone exceeds the width is truncated to
/// `max_width_dots / font_size` characters. That loses characters, but a
/// price sticker has no second page to flow onto.
pub fn wrap_text(text: &str, max_width_dots: u32, font_size: u32) -> Vec<String> {
    let max_chars = (max_width_dots / font_size.max(1)).max(1) as usize;
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let candidate_len = if line.is_empty() {
            word.chars().count()
        } else {
            line.chars().count() + 1 + word.chars().count()
        };

        if candidate_len as u32 * font_size <= max_width_dots {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        } else {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if word.chars().count() > max_chars {
                line = word.chars().take(max_chars).collect();
            } else {
                line = word.to_string();
            }
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Format a unit price with the currency symbol, fixed to two decimals with
/// half-up rounding. A missing amount renders as zero.
pub fn format_price(amount: Option<Decimal>, symbol: &str) -> String {
    let value = amount
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{symbol}{value:.2}")
}

/// TSPL strings cannot contain double quotes; swap them for apostrophes.
fn sanitize(text: &str) -> String {
    text.replace('"', "'")
}

/// Render one label request into the printer's command sequence.
///
/// Emits, in order: page size, gap, orientation, density/speed, clear
/// buffer, stacked item-name lines, supplier line, price line, and the
/// print-count command. Rejects malformed input before producing anything.
pub fn render(request: &LabelRequest, settings: &PrinterSettings) -> Result<Vec<String>> {
    request.validate()?;
    settings.validate()?;

    let dpi = settings.dpi;
    let width_dots = mm_to_dots(f64::from(settings.paper_width_mm), dpi);
    let center_x = width_dots / 2;
    let line_pitch = mm_to_dots(LINE_PITCH_MM, dpi);

    let mut commands = vec![
        format!(
            "SIZE {} mm, {} mm",
            settings.paper_width_mm, settings.paper_height_mm
        ),
        "GAP 3 mm, 0 mm".to_string(),
        "DIRECTION 0".to_string(),
        format!("DENSITY {}", settings.density),
        format!("SPEED {}", settings.speed),
        "CLS".to_string(),
    ];

    let mut y = mm_to_dots(TOP_MARGIN_MM, dpi);

    for line in wrap_text(&request.item, width_dots, ITEM_CHAR_WIDTH_DOTS) {
        commands.push(format!(
            "TEXT {center_x},{y},\"{ITEM_FONT}\",0,1,1,\"{}\"",
            sanitize(&line)
        ));
        y += line_pitch;
    }

    commands.push(format!(
        "TEXT {center_x},{y},\"{SUPPLIER_FONT}\",0,1,1,\"{}\"",
        sanitize(&request.supplier)
    ));
    y += line_pitch;

    let price = format_price(request.price, CURRENCY_SYMBOL);
    commands.push(format!(
        "TEXT {center_x},{y},\"{PRICE_FONT}\",0,{PRICE_SCALE},{PRICE_SCALE},\"{price}\""
    ));

    commands.push(format!("PRINT {}", request.copies));

    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use preiswerk_core::error::DriverError;
    use preiswerk_core::types::LabelRequest;

    fn sample_request() -> LabelRequest {
        LabelRequest {
            item: "Test Item".into(),
            supplier: "Test Supplier".into(),
            price: Some(Decimal::new(2_550, 2)),
            copies: 1,
        }
    }

    fn sample_settings() -> PrinterSettings {
        PrinterSettings {
            paper_width_mm: 50,
            paper_height_mm: 30,
            dpi: 203,
            ..PrinterSettings::default()
        }
    }

    #[test]
    fn mm_dots_round_trip() {
        for dpi in [100, 203, 300, 600] {
            for dots in [0u32, 1, 7, 50, 399, 4_800] {
                let back = mm_to_dots(dots_to_mm(dots, dpi), dpi);
                assert!(
                    back.abs_diff(dots) <= 1,
                    "dots {dots} @ {dpi} dpi came back as {back}"
                );
            }
        }
    }

    #[test]
    fn wrapped_lines_fit_the_width() {
        let lines = wrap_text("fresh organic whole milk one litre", 160, 16);
        for line in &lines {
            assert!(
                line.chars().count() as u32 * 16 <= 160,
                "line {line:?} exceeds width"
            );
        }
        // Nothing lost for normal words.
        assert_eq!(lines.join(" "), "fresh organic whole milk one litre");
    }

    #[test]
    fn oversized_word_is_truncated() {
        let lines = wrap_text("pneumonoultramicroscopic", 80, 16);
        assert_eq!(lines, vec!["pneum".to_string()]);
    }

    #[test]
    fn price_rounds_half_up() {
        assert_eq!(format_price(Some(Decimal::new(2_555, 3)), "$"), "$2.56");
        assert_eq!(format_price(Some(Decimal::new(2_554, 3)), "$"), "$2.55");
        assert_eq!(format_price(Some(Decimal::new(3, 0)), "€"), "€3.00");
    }

    #[test]
    fn missing_price_renders_as_zero() {
        assert_eq!(format_price(None, "$"), "$0.00");
    }

    #[test]
    fn render_produces_expected_sequence() {
        let commands = render(&sample_request(), &sample_settings()).expect("render");

        assert_eq!(commands[0], "SIZE 50 mm, 30 mm");
        assert_eq!(commands[1], "GAP 3 mm, 0 mm");
        assert_eq!(commands[2], "DIRECTION 0");
        assert_eq!(commands[3], "DENSITY 8");
        assert_eq!(commands[4], "SPEED 3");
        assert_eq!(commands[5], "CLS");
        assert_eq!(commands.last().unwrap(), "PRINT 1");

        let price_line = commands
            .iter()
            .find(|c| c.contains("25.50"))
            .expect("price text command");
        assert!(price_line.starts_with("TEXT "));
    }

    #[test]
    fn render_centers_on_half_paper_width() {
        let commands = render(&sample_request(), &sample_settings()).expect("render");
        // 50 mm at 203 dpi is 400 dots, so text anchors at x = 200.
        assert!(commands.iter().any(|c| c.starts_with("TEXT 200,")));
    }

    #[test]
    fn render_rejects_malformed_input_before_any_command() {
        let mut bad = sample_request();
        bad.item.clear();
        assert!(matches!(
            render(&bad, &sample_settings()),
            Err(DriverError::InvalidRequest(_))
        ));

        let mut bad_settings = sample_settings();
        bad_settings.dpi = 50;
        assert!(render(&sample_request(), &bad_settings).is_err());
    }

    #[test]
    fn quotes_in_text_are_sanitized() {
        let mut req = sample_request();
        req.item = "5\" nails".into();
        let commands = render(&req, &sample_settings()).expect("render");
        let item_line = commands.iter().find(|c| c.contains("nails")).unwrap();
        assert!(item_line.contains("5' nails"));
    }
}
