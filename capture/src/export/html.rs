use chrono::{DateTime, Utc};

use super::keys::caption_time;

/// A slide ready for the document: PNG already base64-encoded.
pub struct RenderedSlide {
    pub sequence_number: u32,
    pub captured_at_ms: i64,
    pub png_base64: String,
}

const STYLE: &str = r#"
        body { margin: 0; padding: 20px; font-family: Arial, sans-serif; }
        .header { text-align: center; margin-bottom: 30px; border-bottom: 2px solid #333; padding-bottom: 10px; }
        .slide { page-break-after: always; margin-bottom: 40px; text-align: center; }
        .slide:last-child { page-break-after: avoid; }
        .slide img { max-width: 100%; height: auto; border: 1px solid #ccc; box-shadow: 0 2px 8px rgba(0,0,0,0.1); }
        .slide-number { margin-top: 10px; font-size: 14px; color: #666; }
        .slide-time { font-size: 12px; color: #999; }
        @media print {
            .slide { page-break-after: always; }
            .slide:last-child { page-break-after: avoid; }
        }
"#;

/// Render a self-contained, printable HTML document. One slide per page.
pub fn render(title: &str, slides: &[RenderedSlide], exported_at: DateTime<Utc>) -> String {
    let title = escape(title);
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"utf-8\">\n    <title>{title}</title>\n    <style>{STYLE}    </style>\n</head>\n<body>\n    <div class=\"header\">\n        <h1>{title}</h1>\n        <p>Captured on {date} | Total Slides: {total}</p>\n    </div>\n",
        date = exported_at.format("%Y-%m-%d"),
        total = slides.len(),
    );

    for slide in slides {
        html.push_str(&format!(
            "    <div class=\"slide\">\n        <img src=\"data:image/png;base64,{data}\" alt=\"Slide {n}\">\n        <div class=\"slide-number\">Slide {n}</div>\n        <div class=\"slide-time\">{time}</div>\n    </div>\n",
            data = slide.png_base64,
            n = slide.sequence_number,
            time = caption_time(slide.captured_at_ms),
        ));
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
