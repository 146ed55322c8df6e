//! Append-only XML builder.
//!
//! The writer emits exactly what it is told, in call order. It knows nothing
//! about the DPS schema; the builders own ordering and emission rules.

/// Append-only XML writer with LIFO element tracking.
///
/// Misuse (closing the wrong element, finishing with open elements) is a
/// bug in the calling builder and panics.
///
/// # Examples
/// ```
/// use nfse_dps::xml::XmlWriter;
///
/// let mut w = XmlWriter::new();
/// w.open("obra");
/// w.leaf("cObra", "123");
/// w.leaf_opt("cArt", None);
/// w.close("obra");
/// assert_eq!(w.finish(), "<obra><cObra>123</cObra></obra>");
/// ```
#[derive(Debug, Default)]
pub struct XmlWriter {
    buf: String,
    stack: Vec<String>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the XML declaration. Only valid before any element.
    pub fn declaration(&mut self) {
        assert!(
            self.buf.is_empty(),
            "XML declaration must be the first thing written"
        );
        self.buf
            .push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    }

    /// Open an element without attributes.
    pub fn open(&mut self, tag: &str) {
        self.open_with_attrs(tag, &[]);
    }

    /// Open an element with attributes, written in the given order.
    pub fn open_with_attrs(&mut self, tag: &str, attrs: &[(&str, &str)]) {
        self.buf.push('<');
        self.buf.push_str(tag);
        for (name, value) in attrs {
            self.buf.push(' ');
            self.buf.push_str(name);
            self.buf.push_str("=\"");
            escape_into(&mut self.buf, value);
            self.buf.push('"');
        }
        self.buf.push('>');
        self.stack.push(tag.to_string());
    }

    /// Write `<tag>text</tag>` with `text` escaped.
    pub fn leaf(&mut self, tag: &str, text: &str) {
        self.buf.push('<');
        self.buf.push_str(tag);
        self.buf.push('>');
        escape_into(&mut self.buf, text);
        self.buf.push_str("</");
        self.buf.push_str(tag);
        self.buf.push('>');
    }

    /// Write a leaf only when `text` is present, using the trimmed value.
    ///
    /// Returns whether anything was written.
    pub fn leaf_opt(&mut self, tag: &str, text: Option<&str>) -> bool {
        match present(text) {
            Some(value) => {
                self.leaf(tag, value);
                true
            }
            None => false,
        }
    }

    /// Close the innermost open element, which must be `tag`.
    #[allow(clippy::panic)] // Mismatched close is a builder bug, not a data problem
    pub fn close(&mut self, tag: &str) {
        match self.stack.pop() {
            Some(open) if open == tag => {
                self.buf.push_str("</");
                self.buf.push_str(tag);
                self.buf.push('>');
            }
            Some(open) => panic!("closing <{tag}> while <{open}> is the innermost open element"),
            None => panic!("closing <{tag}> with no open element"),
        }
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Output written so far.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Consume the writer and return the document.
    pub fn finish(self) -> String {
        assert!(
            self.stack.is_empty(),
            "finishing with unclosed elements: {:?}",
            self.stack
        );
        self.buf
    }
}

/// Trimmed, non-blank value of an optional field.
///
/// This is the single definition of "present" used by every builder.
pub fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Escape text for element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(&mut out, text);
    out
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
}
