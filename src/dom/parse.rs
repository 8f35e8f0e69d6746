//! Lenient markup fragment parser.
//!
//! Turns renderer output into a detached list of top-level nodes. The parser
//! never fails: anything it cannot make sense of becomes text or is dropped,
//! and unclosed elements are closed at the end of input.

use super::node::{is_void, NodeKind, NodeRef};

/// Elements whose content is raw text up to the matching close tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Parse a markup fragment into detached top-level nodes.
pub fn parse_fragment(markup: &str) -> Vec<NodeRef> {
    let mut parser = Parser {
        src: markup,
        pos: 0,
        roots: Vec::new(),
        stack: Vec::new(),
    };
    parser.run();
    parser.roots
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    roots: Vec<NodeRef>,
    stack: Vec<(String, NodeRef)>,
}

impl Parser<'_> {
    fn run(&mut self) {
        while self.pos < self.src.len() {
            let rest = &self.src[self.pos..];
            if rest.starts_with("<!--") {
                self.comment();
            } else if rest.starts_with("</") {
                self.close_tag();
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.skip_declaration();
            } else if rest.starts_with('<')
                && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic())
            {
                self.open_tag();
            } else {
                self.text();
            }
        }
        // Implicitly close whatever is still open.
        while let Some((_, node)) = self.stack.pop() {
            self.attach(node);
        }
    }

    fn attach(&mut self, node: NodeRef) {
        match self.stack.last() {
            Some((_, parent)) => parent.append_child(node),
            None => self.roots.push(node),
        }
    }

    fn text(&mut self) {
        let rest = &self.src[self.pos..];
        // A lone '<' that does not start a tag is literal text.
        let skip = usize::from(rest.starts_with('<'));
        let end = rest[skip..].find('<').map_or(rest.len(), |i| i + skip);
        let raw = &rest[..end];
        self.pos += end;
        self.push_text(decode_entities(raw));
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        // Merge with a preceding text sibling so "a<b" stays one node.
        let last = match self.stack.last() {
            Some((_, parent)) => parent
                .child_count()
                .checked_sub(1)
                .and_then(|i| parent.child(i)),
            None => self.roots.last().cloned(),
        };
        if let Some(prev) = last {
            if let Some(mut existing) = prev.text_content() {
                existing.push_str(&text);
                prev.set_kind(NodeKind::Text(existing));
                return;
            }
        }
        self.attach(NodeRef::text(text));
    }

    fn comment(&mut self) {
        let body_start = self.pos + 4;
        let (body_end, next) = self.src[body_start..]
            .find("-->")
            .map_or((self.src.len(), self.src.len()), |i| {
                (body_start + i, body_start + i + 3)
            });
        let node = NodeRef::comment(&self.src[body_start..body_end]);
        self.pos = next;
        self.attach(node);
    }

    fn skip_declaration(&mut self) {
        self.pos = self.src[self.pos..]
            .find('>')
            .map_or(self.src.len(), |i| self.pos + i + 1);
    }

    fn close_tag(&mut self) {
        let rest = &self.src[self.pos + 2..];
        let name_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
            .unwrap_or(rest.len());
        let name = rest[..name_len].to_ascii_lowercase();
        self.pos = self.src[self.pos..]
            .find('>')
            .map_or(self.src.len(), |i| self.pos + i + 1);

        // Unmatched close tags are ignored.
        let Some(depth) = self.stack.iter().rposition(|(tag, _)| *tag == name) else {
            return;
        };
        while self.stack.len() > depth {
            if let Some((_, node)) = self.stack.pop() {
                self.attach(node);
            }
        }
    }

    fn open_tag(&mut self) {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut i = self.pos + 1;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
            i += 1;
        }
        let tag = src[self.pos + 1..i].to_ascii_lowercase();
        let element = NodeRef::element(&tag);

        let mut self_closing = false;
        loop {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() {
                break;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    self_closing = true;
                    i += 1;
                }
                _ => {
                    let start = i;
                    while i < bytes.len()
                        && !bytes[i].is_ascii_whitespace()
                        && !matches!(bytes[i], b'=' | b'>' | b'/')
                    {
                        i += 1;
                    }
                    let name = src[start..i].to_ascii_lowercase();
                    let value = if i < bytes.len() && bytes[i] == b'=' {
                        i += 1;
                        let (value, next) = attr_value(src, i);
                        i = next;
                        value
                    } else {
                        String::new()
                    };
                    if !name.is_empty() {
                        element.set_attr(&name, &value);
                    }
                }
            }
        }
        self.pos = i;

        if self_closing || is_void(&tag) {
            self.attach(element);
        } else if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
            self.raw_text(&tag, &element);
            self.attach(element);
        } else {
            self.stack.push((tag, element));
        }
    }

    fn raw_text(&mut self, tag: &str, element: &NodeRef) {
        let close = format!("</{tag}");
        let rest = &self.src[self.pos..];
        let end = rest
            .to_ascii_lowercase()
            .find(&close)
            .unwrap_or(rest.len());
        if end > 0 {
            element.append_child(NodeRef::text(&rest[..end]));
        }
        self.pos += end;
        self.pos = self.src[self.pos..]
            .find('>')
            .map_or(self.src.len(), |i| self.pos + i + 1);
    }
}

/// Read an attribute value starting at byte `i`. Returns the decoded value
/// and the position after it.
fn attr_value(src: &str, i: usize) -> (String, usize) {
    let bytes = src.as_bytes();
    match bytes.get(i) {
        Some(&quote @ (b'"' | b'\'')) => {
            let start = i + 1;
            let end = src[start..]
                .find(char::from(quote))
                .map_or(src.len(), |e| start + e);
            let next = (end + 1).min(src.len());
            (decode_entities(&src[start..end]), next)
        }
        _ => {
            let end = src[i..]
                .find(|c: char| c.is_ascii_whitespace() || c == '>')
                .map_or(src.len(), |e| i + e);
            (decode_entities(&src[i..end]), end)
        }
    }
}

/// Decode the handful of entities renderers emit.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity.strip_prefix('#').and_then(|num| {
                    let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
