//! Pixel-art souvenir SVG - validation and the deterministic fallback.

/// Accept a model-produced SVG only when it looks structurally sound: an
/// `<svg>` root, a matching close tag, and no markup before the root.
pub fn is_valid_svg(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    let body = match trimmed.strip_prefix("<?xml") {
        Some(rest) => match rest.find("?>") {
            Some(end) => rest[end + 2..].trim_start(),
            None => return false,
        },
        None => trimmed,
    };

    let Some(open) = body.find("<svg") else {
        return false;
    };
    if open != 0 {
        return false;
    }
    let Some(close) = body.rfind("</svg>") else {
        return false;
    };
    close > open && body[close + "</svg>".len()..].trim().is_empty()
}

const GRID: usize = 8;
const CELL: usize = 12;
const PALETTE: [&str; 6] = [
    "#2d6a4f", "#40916c", "#74c69d", "#b7e4c7", "#e9c46a", "#264653",
];

/// Deterministic fallback artwork: an 8x8 pixel grid seeded by the
/// completion facts, with the title and XP lettered underneath. Same inputs,
/// same bytes.
pub fn fallback_svg(title: &str, location: Option<&str>, total_xp: i64, date: &str) -> String {
    let seed = fnv1a(&format!("{title}|{}|{total_xp}|{date}", location.unwrap_or("")));

    let width = GRID * CELL;
    let height = GRID * CELL + 34;
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    svg.push_str(&format!(
        r##"<rect width="{width}" height="{height}" fill="#f8f5ef"/>"##
    ));

    for row in 0..GRID {
        for col in 0..GRID {
            // Mirror the left half for a badge-like symmetry.
            let mirrored_col = if col >= GRID / 2 { GRID - 1 - col } else { col };
            let cell_hash = fnv1a(&format!("{seed}:{row}:{mirrored_col}"));
            let color = PALETTE[cell_hash as usize % PALETTE.len()];
            svg.push_str(&format!(
                r#"<rect x="{x}" y="{y}" width="{CELL}" height="{CELL}" fill="{color}"/>"#,
                x = col * CELL,
                y = row * CELL,
            ));
        }
    }

    svg.push_str(&format!(
        r##"<text x="{x}" y="{y}" font-family="monospace" font-size="9" text-anchor="middle" fill="#264653">{title}</text>"##,
        x = width / 2,
        y = GRID * CELL + 14,
        title = escape_xml(title),
    ));
    svg.push_str(&format!(
        r##"<text x="{x}" y="{y}" font-family="monospace" font-size="8" text-anchor="middle" fill="#577590">{xp} XP · {date}</text>"##,
        x = width / 2,
        y = GRID * CELL + 27,
        xp = total_xp,
        date = escape_xml(date),
    ));
    svg.push_str("</svg>");
    svg
}

fn fnv1a(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_plain_svg_document() {
        assert!(is_valid_svg("<svg xmlns=\"http://www.w3.org/2000/svg\"><rect/></svg>"));
        assert!(is_valid_svg(
            "<?xml version=\"1.0\"?>\n<svg><circle/></svg>"
        ));
    }

    #[test]
    fn rejects_prose_and_fragments() {
        assert!(!is_valid_svg("Here is your SVG!"));
        assert!(!is_valid_svg("<div><svg></svg></div>"));
        assert!(!is_valid_svg("<svg><rect/>"));
        assert!(!is_valid_svg("<svg></svg> trailing words"));
    }

    #[test]
    fn fallback_is_deterministic() {
        let a = fallback_svg("Ridge Loop", Some("Harz"), 210, "2024-05-01");
        let b = fallback_svg("Ridge Loop", Some("Harz"), 210, "2024-05-01");
        assert_eq!(a, b);
    }

    #[test]
    fn fallback_varies_with_inputs() {
        let a = fallback_svg("Ridge Loop", Some("Harz"), 210, "2024-05-01");
        let b = fallback_svg("River Walk", Some("Harz"), 210, "2024-05-01");
        assert_ne!(a, b);
    }

    #[test]
    fn fallback_passes_its_own_validation() {
        let svg = fallback_svg("Ridge Loop", None, 150, "2024-05-01");
        assert!(is_valid_svg(&svg));
        assert!(svg.contains("150 XP"));
        assert!(svg.contains("Ridge Loop"));
    }

    #[test]
    fn titles_are_xml_escaped() {
        let svg = fallback_svg("Hügel & Tal <Tour>", None, 90, "2024-05-01");
        assert!(svg.contains("Hügel &amp; Tal &lt;Tour&gt;"));
    }
}
