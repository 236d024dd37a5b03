//! Minimal WordprocessingML (.docx) writer.
//!
//! Produces the three parts a consumer needs to open a document
//! (`[Content_Types].xml`, `_rels/.rels`, `word/document.xml`) and nothing
//! else: plain paragraphs and hard page breaks. Styling is left to the
//! reader's defaults.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_CLOSE: &str = "<w:sectPr/></w:body></w:document>";

const PAGE_BREAK: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

/// Accumulates document body content and writes a `.docx` package.
#[derive(Debug, Default, Clone)]
pub struct DocxBuilder {
    body: String,
    paragraphs: usize,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one paragraph of plain text. An empty string yields an empty paragraph.
    pub fn paragraph(&mut self, text: &str) -> &mut Self {
        let text = escape_xml(text);
        if text.is_empty() {
            self.body.push_str("<w:p/>");
        } else {
            self.body.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
            self.body.push_str(&text);
            self.body.push_str("</w:t></w:r></w:p>");
        }
        self.paragraphs += 1;
        self
    }

    /// Append a hard page break.
    pub fn page_break(&mut self) -> &mut Self {
        self.body.push_str(PAGE_BREAK);
        self
    }

    /// Number of paragraphs appended so far (page breaks excluded).
    pub fn paragraph_count(&self) -> usize {
        self.paragraphs
    }

    /// The complete `word/document.xml` part.
    pub fn document_xml(&self) -> String {
        let mut xml = String::with_capacity(
            DOCUMENT_OPEN.len() + self.body.len() + DOCUMENT_CLOSE.len(),
        );
        xml.push_str(DOCUMENT_OPEN);
        xml.push_str(&self.body);
        xml.push_str(DOCUMENT_CLOSE);
        xml
    }

    /// Write the package to any seekable sink.
    pub fn write_to<W: Write + Seek>(&self, sink: W) -> zip::result::ZipResult<W> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(sink);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES.as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(PACKAGE_RELS.as_bytes())?;

        zip.start_file("word/document.xml", options)?;
        zip.write_all(self.document_xml().as_bytes())?;

        zip.finish()
    }

    /// Write the package to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> zip::result::ZipResult<()> {
        let file = File::create(path)?;
        let mut writer = self.write_to(BufWriter::new(file))?;
        writer.flush()?;
        Ok(())
    }
}

/// Escape text for an XML text node, dropping characters XML 1.0 forbids.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push('\t'),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use zip::ZipArchive;

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut part = archive.by_name(name).unwrap();
        let mut s = String::new();
        part.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn package_has_required_parts() {
        let mut doc = DocxBuilder::new();
        doc.paragraph("Hello");
        let bytes = doc.write_to(Cursor::new(Vec::new())).unwrap().into_inner();

        assert!(bytes.starts_with(b"PK"));
        let archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let mut names: Vec<_> = archive.file_names().collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec!["[Content_Types].xml", "_rels/.rels", "word/document.xml"]
        );
        assert!(read_part(&bytes, "word/document.xml").contains(">Hello</w:t>"));
    }

    #[test]
    fn text_is_escaped_and_control_chars_dropped() {
        let mut doc = DocxBuilder::new();
        doc.paragraph("a < b && \"c\"\u{0007}");
        let xml = doc.document_xml();
        assert!(xml.contains("a &lt; b &amp;&amp; &quot;c&quot;</w:t>"), "{xml}");
        assert!(!xml.contains('\u{0007}'));
    }

    #[test]
    fn empty_paragraph_and_page_break() {
        let mut doc = DocxBuilder::new();
        doc.paragraph("one").page_break().paragraph("");
        let xml = doc.document_xml();
        assert!(xml.contains(PAGE_BREAK));
        assert!(xml.ends_with("<w:p/><w:sectPr/></w:body></w:document>"));
        assert_eq!(doc.paragraph_count(), 2);
    }

    #[test]
    fn save_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.docx");
        let mut doc = DocxBuilder::new();
        doc.paragraph("saved");
        doc.save(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(read_part(&bytes, "word/document.xml").contains("saved"));
    }
}
