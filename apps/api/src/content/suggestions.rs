/// Upper bound on bullets returned by the work-suggestions route.
pub const MAX_SUGGESTIONS: usize = 5;

/// Splits model output into clean bullet lines.
///
/// Strips list markers ("-", "*", "•", "1.", "2)") and wrapping quotes, drops
/// blank lines, and keeps at most `max` entries.
pub fn split_suggestions(text: &str, max: usize) -> Vec<String> {
    text.lines()
        .map(strip_list_marker)
        .map(|line| line.trim_matches(|c: char| c == '"' || c == '\''))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    if let Some(rest) = line
        .strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('•'))
    {
        return rest.trim_start();
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim_start();
        }
    }
    line
}
