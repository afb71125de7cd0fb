// Document Loader
// Extracts plain text from submitted files (.txt/.md, .docx, .pdf)

use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("read file failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("docx parse failed: {0}")]
    Docx(String),
    #[error("pdf extraction failed: {0}")]
    Pdf(String),
    #[error("file is not valid UTF-8 text")]
    Encoding,
}

/// Load a document and return its text, one paragraph per block separated by blank lines.
pub fn load_document(path: &Path) -> Result<String, DocumentError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" | "text" => {
            let bytes = fs::read(path)?;
            String::from_utf8(bytes).map_err(|_| DocumentError::Encoding)
        }
        "docx" => extract_docx_text(&fs::read(path)?),
        "pdf" => extract_pdf_text(&fs::read(path)?),
        other => Err(DocumentError::Unsupported(other.to_string())),
    }
}

pub fn extract_docx_text(bytes: &[u8]) -> Result<String, DocumentError> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| DocumentError::Docx(e.to_string()))?;

    let mut paragraphs: Vec<String> = Vec::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(p) = child {
            let mut text = String::new();
            for pc in &p.children {
                if let ParagraphChild::Run(run) = pc {
                    for rc in &run.children {
                        match rc {
                            RunChild::Text(t) => text.push_str(&t.text),
                            RunChild::Tab(_) => text.push('\t'),
                            RunChild::Break(_) => text.push('\n'),
                            _ => {}
                        }
                    }
                }
            }
            if !text.trim().is_empty() {
                paragraphs.push(text);
            }
        }
    }

    Ok(paragraphs.join("\n\n"))
}

pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, DocumentError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| DocumentError::Pdf(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.TXT");
        fs::write(&path, "Primer párrafo.\n\nSegundo párrafo.").unwrap();
        assert_eq!(load_document(&path).unwrap(), "Primer párrafo.\n\nSegundo párrafo.");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        fs::write(&path, [0u8, 1, 2]).unwrap();
        assert!(matches!(load_document(&path), Err(DocumentError::Unsupported(ext)) if ext == "png"));
    }

    #[test]
    fn test_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, [0xffu8, 0xfe, 0xfd]).unwrap();
        assert!(matches!(load_document(&path), Err(DocumentError::Encoding)));
    }

    #[test]
    fn test_garbage_docx_is_an_error() {
        assert!(matches!(extract_docx_text(b"not a zip"), Err(DocumentError::Docx(_))));
    }
}
