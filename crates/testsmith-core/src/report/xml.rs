//! Minimal indented XML writer used for the test report.

use std::borrow::Cow;
use std::fmt::{self, Write};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Escape markup characters and drop characters XML 1.0 cannot carry
/// (terminal control codes in runner output, mostly).
pub fn escape(s: &str) -> Cow<'_, str> {
    let needs_work = s
        .chars()
        .any(|c| matches!(c, '<' | '>' | '&' | '"' | '\'') || !is_xml_char(c));
    if !needs_work {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if is_xml_char(c) => out.push(c),
            _ => {}
        }
    }
    Cow::Owned(out)
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

/// Streaming writer with two-space indentation.
#[derive(Debug, Default)]
pub struct XmlWriter {
    buf: String,
    depth: usize,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn indent(&mut self) -> fmt::Result {
        for _ in 0..self.depth {
            self.buf.write_str("  ")?;
        }
        Ok(())
    }

    fn start_tag(&mut self, name: &str, attrs: &[(&str, String)]) -> fmt::Result {
        self.indent()?;
        write!(self.buf, "<{name}")?;
        for (key, value) in attrs {
            write!(self.buf, " {key}=\"{}\"", escape(value))?;
        }
        Ok(())
    }

    /// `<name attrs>` and descend one level.
    pub fn open(&mut self, name: &str, attrs: &[(&str, String)]) -> fmt::Result {
        self.start_tag(name, attrs)?;
        self.buf.write_str(">\n")?;
        self.depth += 1;
        Ok(())
    }

    /// `</name>` one level up.
    pub fn close(&mut self, name: &str) -> fmt::Result {
        self.depth = self.depth.saturating_sub(1);
        self.indent()?;
        writeln!(self.buf, "</{name}>")
    }

    /// `<name attrs/>`.
    pub fn empty(&mut self, name: &str, attrs: &[(&str, String)]) -> fmt::Result {
        self.start_tag(name, attrs)?;
        self.buf.write_str("/>\n")
    }

    /// `<name attrs>text</name>` on one line.
    pub fn text(&mut self, name: &str, attrs: &[(&str, String)], text: &str) -> fmt::Result {
        self.start_tag(name, attrs)?;
        writeln!(self.buf, ">{}</{name}>", escape(text))
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_leaves_plain_text_borrowed() {
        assert!(matches!(escape("plain text"), Cow::Borrowed(_)));
    }

    #[test]
    fn escape_markup_and_control_chars() {
        assert_eq!(
            escape("a < b && \"c\" \u{1b}[31mred"),
            "a &lt; b &amp;&amp; &quot;c&quot; [31mred"
        );
        assert_eq!(escape("tab\tline\n"), "tab\tline\n");
    }

    #[test]
    fn writer_nests_and_indents() {
        let mut w = XmlWriter::new();
        w.open("root", &[("lang", "python".into())]).unwrap();
        w.empty("leaf", &[("n", "1".into())]).unwrap();
        w.text("msg", &[], "x<y").unwrap();
        w.close("root").unwrap();
        assert_eq!(
            w.finish(),
            "<root lang=\"python\">\n  <leaf n=\"1\"/>\n  <msg>x&lt;y</msg>\n</root>\n"
        );
    }
}
