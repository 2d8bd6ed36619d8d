// src/mirror/markup.rs
// =============================================================================
// A small, lossless tokenizer for HTML markup.
//
// The rewrite pass needs to change a handful of attribute values and leave
// every other byte of the document exactly as the server sent it. A full DOM
// round-trip (parse + serialize) would normalize whitespace, quoting and
// entity encoding all over the page, so instead the document is split into a
// flat node list:
//
//   Text | Comment | Doctype | Tag { name, attributes with byte spans } | RawText
//
// Concatenating the source slices of all nodes gives back the input
// unchanged. Contents of <script>, <style>, <textarea> and <title> are kept
// as RawText, so a "<a href=..." inside a script string is never mistaken for
// a tag.
// =============================================================================

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lowercased attribute name
    pub name: String,
    /// Byte range of the value inside the document, quotes excluded.
    /// None for bare attributes like `disabled`.
    pub value: Option<Range<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(Range<usize>),
    Comment(Range<usize>),
    /// <!DOCTYPE ...>, <?xml ...?> and other declarations
    Declaration(Range<usize>),
    Tag {
        span: Range<usize>,
        /// Lowercased tag name
        name: String,
        closing: bool,
        attributes: Vec<Attribute>,
    },
    /// Body of a raw-text element such as <script>
    RawText(Range<usize>),
}

impl Node {
    pub fn span(&self) -> Range<usize> {
        match self {
            Node::Text(r) | Node::Comment(r) | Node::Declaration(r) | Node::RawText(r) => r.clone(),
            Node::Tag { span, .. } => span.clone(),
        }
    }
}

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Splits `html` into nodes covering the whole input.
pub fn tokenize(html: &str) -> Vec<Node> {
    let bytes = html.as_bytes();
    let mut nodes = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }

        let parsed = if html[pos..].starts_with("<!--") {
            let end = html[pos + 4..]
                .find("-->")
                .map(|i| pos + 4 + i + 3)
                .unwrap_or(bytes.len());
            Some((Node::Comment(pos..end), end))
        } else if matches!(bytes.get(pos + 1), Some(b'!') | Some(b'?')) {
            let end = html[pos..].find('>').map(|i| pos + i + 1).unwrap_or(bytes.len());
            Some((Node::Declaration(pos..end), end))
        } else {
            parse_tag(html, pos)
        };

        let Some((node, end)) = parsed else {
            // A stray '<' is just text
            pos += 1;
            continue;
        };

        if text_start < pos {
            nodes.push(Node::Text(text_start..pos));
        }

        let raw_text_of = match &node {
            Node::Tag { name, closing: false, .. } if RAW_TEXT_ELEMENTS.contains(&name.as_str()) => {
                Some(name.clone())
            }
            _ => None,
        };
        nodes.push(node);
        pos = end;
        text_start = end;

        if let Some(name) = raw_text_of {
            let close = find_closing_tag(html, pos, &name).unwrap_or(bytes.len());
            if close > pos {
                nodes.push(Node::RawText(pos..close));
            }
            pos = close;
            text_start = close;
        }
    }

    if text_start < bytes.len() {
        nodes.push(Node::Text(text_start..bytes.len()));
    }

    nodes
}

// Parses the tag starting at `start` (which points at '<').
// Returns None if this '<' does not open a tag.
fn parse_tag(html: &str, start: usize) -> Option<(Node, usize)> {
    let bytes = html.as_bytes();
    let mut pos = start + 1;

    let closing = bytes.get(pos) == Some(&b'/');
    if closing {
        pos += 1;
    }

    let name_start = pos;
    while pos < bytes.len() && !is_space(bytes[pos]) && bytes[pos] != b'>' && bytes[pos] != b'/' {
        pos += 1;
    }
    if pos == name_start || !bytes[name_start].is_ascii_alphabetic() {
        return None;
    }
    let name = html[name_start..pos].to_ascii_lowercase();

    let mut attributes = Vec::new();
    loop {
        while pos < bytes.len() && (is_space(bytes[pos]) || bytes[pos] == b'/') {
            pos += 1;
        }
        if pos >= bytes.len() {
            // unterminated tag runs to the end of the document
            break;
        }
        if bytes[pos] == b'>' {
            pos += 1;
            break;
        }

        let attr_start = pos;
        while pos < bytes.len()
            && !is_space(bytes[pos])
            && !matches!(bytes[pos], b'>' | b'=' | b'/')
        {
            pos += 1;
        }
        if pos == attr_start {
            // lone '=' or similar junk, skip it
            pos += 1;
            continue;
        }
        let attr_name = html[attr_start..pos].to_ascii_lowercase();

        while pos < bytes.len() && is_space(bytes[pos]) {
            pos += 1;
        }
        if bytes.get(pos) != Some(&b'=') {
            attributes.push(Attribute { name: attr_name, value: None });
            continue;
        }
        pos += 1;
        while pos < bytes.len() && is_space(bytes[pos]) {
            pos += 1;
        }

        let value = match bytes.get(pos) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let value_start = pos + 1;
                let value_end = html[value_start..]
                    .find(quote as char)
                    .map(|i| value_start + i)
                    .unwrap_or(bytes.len());
                pos = (value_end + 1).min(bytes.len());
                value_start..value_end
            }
            _ => {
                let value_start = pos;
                while pos < bytes.len() && !is_space(bytes[pos]) && bytes[pos] != b'>' {
                    pos += 1;
                }
                value_start..pos
            }
        };
        attributes.push(Attribute { name: attr_name, value: Some(value) });
    }

    Some((
        Node::Tag {
            span: start..pos,
            name,
            closing,
            attributes,
        },
        pos,
    ))
}

// Offset of the "</name" that ends a raw-text element, case-insensitive.
fn find_closing_tag(html: &str, from: usize, name: &str) -> Option<usize> {
    let lower = html[from..].to_ascii_lowercase();
    let needle = format!("</{name}");
    let mut search = 0;
    while let Some(i) = lower[search..].find(&needle) {
        let at = search + i;
        let after = lower.as_bytes().get(at + needle.len());
        if matches!(after, None | Some(b'>') | Some(b'/')) || after.is_some_and(|b| is_space(*b)) {
            return Some(from + at);
        }
        search = at + needle.len();
    }
    None
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
}
