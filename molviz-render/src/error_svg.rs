//! Stand-in artifact shown when a rendering cannot be produced.

pub const ERROR_SVG_WIDTH: u32 = 250;
pub const ERROR_SVG_HEIGHT: u32 = 185;

/// A fixed-size SVG document carrying `message` as one line of text.
///
/// Always renderable: the message is XML-escaped and control characters other
/// than tab are dropped.
pub fn error_artifact(message: &str) -> Vec<u8> {
    format!(
        concat!(
            "<?xml version=\"1.0\" ?>\n",
            "<svg height=\"{h}\" version=\"1.0\" width=\"{w}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
            "\t<g stroke=\"#000\" stroke-width=\"1.0\">\n",
            "\t\t<text font-family=\"Arial\" font-size=\"16\" stroke=\"rgb(0, 0, 0)\" x=\"0.0\" y=\"16.0\">\n",
            "\t\t\t{text}\n",
            "\t\t</text>\n",
            "\t</g>\n",
            "</svg>\n",
        ),
        h = ERROR_SVG_HEIGHT,
        w = ERROR_SVG_WIDTH,
        text = escape_text(message),
    )
    .into_bytes()
}

fn escape_text(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for ch in message.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' | '\r' => out.push(' '),
            c if c.is_control() && c != '\t' => {}
            c => out.push(c),
        }
    }
    out
}
