/// Lower-case and fold German umlauts so free-text job descriptions compare
/// equal regardless of how they were typed.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars().flat_map(char::to_lowercase) {
        match ch {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'ß' => out.push_str("ss"),
            '-' | '_' => out.push(' '),
            other => out.push(other),
        }
    }
    out.trim().to_string()
}
