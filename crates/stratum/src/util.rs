//! message helpers shared by error types

/// Maximum number of characters of a template shown in an error message
pub const MAX_TEMPLATE_DISPLAY_LENGTH: usize = 200;

/// Prepare arbitrary (user supplied) text for a single-line error message
///
/// Truncates to `max_chars` characters (appending `...`) and escapes line breaks.
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let mut truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        truncated.push_str("...");
    }

    truncated.replace('\r', "\\r").replace('\n', "\\n")
}

/// Render a template for display in error messages
pub fn display_template(template: &str) -> String {
    truncate_for_display(template, MAX_TEMPLATE_DISPLAY_LENGTH)
}

/// Join items the way a sentence would: `a, b and c`
///
/// Items are sorted and deduplicated first so the output is deterministic.
pub fn natural_list(items: &[String]) -> String {
    let mut items = items.to_vec();
    items.sort();
    items.dedup();

    match items.as_slice() {
        [] => String::new(),
        [single] => single.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}
