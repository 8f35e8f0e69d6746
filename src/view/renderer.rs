//! Content renderers: turn accumulated source text into markup.
//!
//! [`ContentRenderer`] is the seam. [`PlainRenderer`] is a deliberately
//! small implementation covering paragraphs, headings, fenced code and
//! math, enough to drive the pipeline end to end. Unterminated fences and
//! math spans render as if closed, so a half-streamed document still has a
//! stable shape.

use crate::cache::{CacheManager, Partition};
use crate::dom::escape_text;
use crate::reconcile::hash;

/// Which render path produced the output. Each path caches into its own
/// partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderStrategy {
    /// Render on the caller's turn.
    #[default]
    Sync,
    /// Render in a worker; output is cached separately.
    Async,
}

impl RenderStrategy {
    /// Partition holding whole-document output of this strategy.
    pub const fn partition(self) -> Partition {
        match self {
            Self::Sync => Partition::SyncRender,
            Self::Async => Partition::AsyncRender,
        }
    }
}

/// Source-to-markup renderer.
pub trait ContentRenderer {
    /// Render `source`, consulting and populating `caches` as needed.
    fn render(
        &mut self,
        source: &str,
        strategy: RenderStrategy,
        caches: &mut CacheManager,
    ) -> String;
}

impl<R: ContentRenderer + ?Sized> ContentRenderer for &mut R {
    fn render(
        &mut self,
        source: &str,
        strategy: RenderStrategy,
        caches: &mut CacheManager,
    ) -> String {
        (**self).render(source, strategy, caches)
    }
}

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "class", "const", "continue", "def", "else", "enum", "false",
    "fn", "for", "function", "if", "impl", "import", "in", "let", "loop", "match", "mod", "mut",
    "pub", "return", "self", "static", "struct", "trait", "true", "type", "use", "var", "where",
    "while",
];

/// Minimal block/inline renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRenderer;

impl PlainRenderer {
    /// Create a renderer.
    pub const fn new() -> Self {
        Self
    }
}

impl ContentRenderer for PlainRenderer {
    fn render(
        &mut self,
        source: &str,
        strategy: RenderStrategy,
        caches: &mut CacheManager,
    ) -> String {
        let partition = strategy.partition();
        let key = hash(source).to_string();
        if let Some(hit) = caches.get(partition, &key) {
            return hit.to_owned();
        }
        let markup = render_document(source, caches);
        caches.set(partition, key, markup.clone(), None);
        markup
    }
}

fn render_document(source: &str, caches: &mut CacheManager) -> String {
    let mut out = String::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut lines = source.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();

        if let Some(info) = trimmed.strip_prefix("```") {
            flush_paragraph(&mut paragraph, &mut out, caches);
            let lang = info.trim().to_owned();
            let mut code = Vec::new();
            for body in lines.by_ref() {
                if body.trim_start().starts_with("```") {
                    break;
                }
                code.push(body);
            }
            out.push_str(&code_block(&lang, &code.join("\n"), caches));
        } else if let Some(rest) = trimmed.strip_prefix("$$") {
            flush_paragraph(&mut paragraph, &mut out, caches);
            let mut body = String::new();
            if let Some(end) = rest.find("$$") {
                body.push_str(&rest[..end]);
            } else {
                body.push_str(rest);
                for next in lines.by_ref() {
                    if let Some(end) = next.find("$$") {
                        push_line(&mut body, &next[..end]);
                        break;
                    }
                    push_line(&mut body, next);
                }
            }
            out.push_str(&display_math(body.trim(), caches));
        } else if let Some((level, text)) = heading(trimmed) {
            flush_paragraph(&mut paragraph, &mut out, caches);
            out.push_str(&format!("<h{level}>"));
            render_inline(text.trim(), &mut out, caches);
            out.push_str(&format!("</h{level}>"));
        } else if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, &mut out, caches);
        } else {
            paragraph.push(line.trim());
        }
    }
    flush_paragraph(&mut paragraph, &mut out, caches);
    out
}

fn push_line(body: &mut String, line: &str) {
    if !body.is_empty() {
        body.push('\n');
    }
    body.push_str(line);
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.bytes().take_while(|&b| b == b'#').count();
    if !(1..=6).contains(&level) {
        return None;
    }
    let rest = &line[level..];
    (rest.is_empty() || rest.starts_with(' ')).then_some((level, rest))
}

fn flush_paragraph(lines: &mut Vec<&str>, out: &mut String, caches: &mut CacheManager) {
    if lines.is_empty() {
        return;
    }
    out.push_str("<p>");
    render_inline(&lines.join("\n"), out, caches);
    out.push_str("</p>");
    lines.clear();
}

/// Inline spans: `$math$`, `` `code` `` and `**strong**`.
fn render_inline(text: &str, out: &mut String, caches: &mut CacheManager) {
    let mut rest = text;
    while let Some(start) = rest.find(|c: char| matches!(c, '$' | '`' | '*')) {
        let (before, tail) = rest.split_at(start);
        escape_text(before, out);

        if let Some(body) = tail.strip_prefix("**") {
            let (inner, next) = split_closed(body, "**");
            out.push_str("<strong>");
            render_inline(inner, out, caches);
            out.push_str("</strong>");
            rest = next;
        } else if let Some(body) = tail.strip_prefix('`') {
            let (inner, next) = split_closed(body, "`");
            out.push_str("<code>");
            escape_text(inner, out);
            out.push_str("</code>");
            rest = next;
        } else if let Some(body) = tail.strip_prefix('$') {
            let (inner, next) = split_closed(body, "$");
            out.push_str(&inline_math(inner.trim(), caches));
            rest = next;
        } else {
            // A single '*' is literal.
            out.push('*');
            rest = &tail[1..];
        }
    }
    escape_text(rest, out);
}

/// Split `text` at the first `delim`, treating a missing one as closing at
/// the end.
fn split_closed<'a>(text: &'a str, delim: &str) -> (&'a str, &'a str) {
    text.find(delim)
        .map_or((text, ""), |end| (&text[..end], &text[end + delim.len()..]))
}

fn inline_math(tex: &str, caches: &mut CacheManager) -> String {
    caches.get_or_insert_with(Partition::InlineMath, tex, || {
        let mut out = String::from("<span class=\"math math-inline\">");
        escape_text(tex, &mut out);
        out.push_str("</span>");
        out
    })
}

fn display_math(tex: &str, caches: &mut CacheManager) -> String {
    caches.get_or_insert_with(Partition::DisplayMath, tex, || {
        let mut out = String::from("<div class=\"math math-display\">");
        escape_text(tex, &mut out);
        out.push_str("</div>");
        out
    })
}

fn code_block(lang: &str, code: &str, caches: &mut CacheManager) -> String {
    let key = format!("{lang}\n{code}");
    caches.get_or_insert_with(Partition::Highlight, &key, || {
        let mut out = String::from("<pre><code");
        if !lang.is_empty() {
            out.push_str(" class=\"language-");
            crate::dom::escape_attr(lang, &mut out);
            out.push('"');
        }
        out.push('>');
        highlight(code, &mut out);
        out.push_str("</code></pre>");
        out
    })
}

/// Wrap keywords and numbers in spans; everything else is escaped text.
fn highlight(code: &str, out: &mut String) {
    let mut rest = code;
    while !rest.is_empty() {
        let word_len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if word_len == 0 {
            let ch_len = rest.chars().next().map_or(1, char::len_utf8);
            escape_text(&rest[..ch_len], out);
            rest = &rest[ch_len..];
            continue;
        }
        let word = &rest[..word_len];
        if KEYWORDS.contains(&word) {
            out.push_str("<span class=\"kw\">");
            out.push_str(word);
            out.push_str("</span>");
        } else if word.starts_with(|c: char| c.is_ascii_digit()) {
            out.push_str("<span class=\"num\">");
            escape_text(word, out);
            out.push_str("</span>");
        } else {
            escape_text(word, out);
        }
        rest = &rest[word_len..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(source: &str) -> String {
        PlainRenderer.render(source, RenderStrategy::Sync, &mut CacheManager::default())
    }

    #[test]
    fn test_paragraphs_and_headings() {
        assert_eq!(
            render("# Title\n\nfirst line\nsecond\n\nnext"),
            "<h1>Title</h1><p>first line\nsecond</p><p>next</p>"
        );
        assert_eq!(render("#nospace"), "<p>#nospace</p>");
        assert_eq!(render(""), "");
    }

    #[test]
    fn test_escapes_text() {
        assert_eq!(render("a < b & c"), "<p>a &lt; b &amp; c</p>");
    }

    #[test]
    fn test_inline_spans() {
        assert_eq!(
            render("**bold** and `x<y` and $a^2$ * star"),
            "<p><strong>bold</strong> and <code>x&lt;y</code> and \
             <span class=\"math math-inline\">a^2</span> * star</p>"
        );
    }

    #[test]
    fn test_unterminated_spans_render_closed() {
        assert_eq!(
            render("price $x + 1"),
            "<p>price <span class=\"math math-inline\">x + 1</span></p>"
        );
        assert_eq!(render("**half"), "<p><strong>half</strong></p>");
    }

    #[test]
    fn test_fenced_code() {
        assert_eq!(
            render("```rust\nlet x = 42;\n```\nafter"),
            "<pre><code class=\"language-rust\"><span class=\"kw\">let</span> x = \
             <span class=\"num\">42</span>;</code></pre><p>after</p>"
        );
        // Still streaming: no closing fence yet.
        assert_eq!(render("```\na < b"), "<pre><code>a &lt; b</code></pre>");
    }

    #[test]
    fn test_display_math() {
        assert_eq!(
            render("$$x = y$$"),
            "<div class=\"math math-display\">x = y</div>"
        );
        assert_eq!(
            render("$$\n\\sum_i a_i\n$$\ntext"),
            "<div class=\"math math-display\">\\sum_i a_i</div><p>text</p>"
        );
        assert_eq!(
            render("$$\nopen"),
            "<div class=\"math math-display\">open</div>"
        );
    }

    #[test]
    fn test_sub_renders_cached_per_partition() {
        let mut caches = CacheManager::default();
        let mut renderer = PlainRenderer::new();
        renderer.render("$a$\n\n$$b$$\n```\nc\n```", RenderStrategy::Sync, &mut caches);

        assert!(caches.has(Partition::InlineMath, "a"));
        assert!(caches.has(Partition::DisplayMath, "b"));
        assert!(caches.has(Partition::Highlight, "\nc"));
        assert_eq!(caches.stats(Partition::SyncRender).entries, 1);
        assert_eq!(caches.stats(Partition::AsyncRender).entries, 0);
    }

    #[test]
    fn test_document_cache_hit() {
        let mut caches = CacheManager::default();
        let mut renderer = PlainRenderer::new();
        let first = renderer.render("hello $x$", RenderStrategy::Async, &mut caches);
        let second = renderer.render("hello $x$", RenderStrategy::Async, &mut caches);

        assert_eq!(first, second);
        assert_eq!(caches.stats(Partition::AsyncRender).hits, 1);
        // The sub-render ran once.
        assert_eq!(caches.stats(Partition::InlineMath).misses, 1);
    }
}
