use unicode_width::UnicodeWidthStr;

/// Suffix a string with enough spaces to span `width` terminal columns
pub fn right_pad(s: &str, width: usize) -> String {
    let current = s.width();
    if current >= width {
        return s.to_string();
    }
    format!("{}{}", s, " ".repeat(width - current))
}

/// `"<id>:"` prefixes padded so that messages line up
pub fn aligned_prefixes<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let longest = ids.iter().map(|id| id.as_ref().width()).max().unwrap_or(0);

    ids.iter()
        .map(|id| right_pad(&format!("{}:", id.as_ref()), longest + 1))
        .collect()
}
