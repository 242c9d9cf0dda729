//! Display formatting for assistant messages.
//!
//! Two renderings exist:
//!
//! - [`render_plain`] for every mid-stream update: the raw buffer is escaped
//!   and only line breaks are converted.
//! - [`format_message`] once per response, at completion: line breaks plus
//!   strong, emphasis, and inline-code spans.
//!
//! Both escape the raw text first, so assistant output is never interpreted
//! as markup except through the spans this module produces itself.

use std::sync::LazyLock;

use regex::Regex;

/// Line-break convention of the presentation surface.
pub const LINE_BREAK: &str = "<br>";

static STRONG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid strong pattern"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("valid emphasis pattern"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`(.*?)`").expect("valid inline code pattern"));

/// Escape characters that would otherwise be read as markup.
pub fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

/// Render an in-progress buffer: escaped text with line breaks converted.
pub fn render_plain(raw: &str) -> String {
    escape_text(raw).replace('\n', LINE_BREAK)
}

/// Final formatting of a completed response.
///
/// Must be applied to the full accumulated text exactly once. Applying it
/// per chunk would miss delimiters that span chunk boundaries, and applying
/// it twice would re-escape the markup it produced.
pub fn format_message(raw: &str) -> String {
    let text = render_plain(raw);
    let text = STRONG.replace_all(&text, "<strong>$1</strong>");
    let text = EMPHASIS.replace_all(&text, "<em>$1</em>");
    INLINE_CODE.replace_all(&text, "<code>$1</code>").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_format_spans() {
        assert_eq!(format_message("**bold**"), "<strong>bold</strong>");
        assert_eq!(format_message("*soft*"), "<em>soft</em>");
        assert_eq!(format_message("run `ls -la`"), "run <code>ls -la</code>");
        assert_eq!(
            format_message("a **b** and *c* then `d`"),
            "a <strong>b</strong> and <em>c</em> then <code>d</code>"
        );
    }

    #[test]
    fn test_format_is_non_greedy() {
        assert_eq!(
            format_message("**a** x **b**"),
            "<strong>a</strong> x <strong>b</strong>"
        );
        assert_eq!(format_message("`a` `b`"), "<code>a</code> <code>b</code>");
    }

    #[test]
    fn test_unmatched_delimiters_stay_literal() {
        assert_eq!(format_message("2 * 3 = 6"), "2 * 3 = 6");
        assert_eq!(format_message("a ` b"), "a ` b");
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(format_message("one\ntwo"), "one<br>two");
        assert_eq!(render_plain("one\n\ntwo"), "one<br><br>two");
    }

    #[test]
    fn test_raw_markup_is_escaped() {
        assert_eq!(
            render_plain("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"
        );
        assert_eq!(
            format_message("**<b>**"),
            "<strong>&lt;b&gt;</strong>"
        );
    }

    #[test]
    fn test_render_plain_leaves_delimiters_alone() {
        assert_eq!(render_plain("**wo"), "**wo");
    }

    #[test]
    fn test_idempotent_without_delimiters() {
        for text in ["", "plain words", "Hello world 123", "中文内容"] {
            let once = format_message(text);
            assert_eq!(format_message(&once), once, "input: {text:?}");
        }
    }

    proptest! {
        #[test]
        fn property_format_is_idempotent_on_plain_text(text in "[^*`&<>\"'\\n]{0,64}") {
            let once = format_message(&text);
            prop_assert_eq!(format_message(&once), once);
        }

        #[test]
        fn property_render_plain_never_emits_raw_markup(text in any::<String>()) {
            let rendered = render_plain(&text);
            let without_breaks = rendered.replace(LINE_BREAK, "");
            prop_assert!(!without_breaks.contains('<'));
            prop_assert!(!without_breaks.contains('>'));
        }
    }
}
