//! File classification: is this path an existing PDF?
//!
//! The extension is only a cheap pre-filter. The leading bytes of the file
//! decide, so a renamed non-PDF with a `.pdf` extension is rejected.

use std::io::Read;
use std::path::Path;

/// Number of leading bytes inspected when sniffing content
pub const SNIFF_LEN: usize = 512;

/// Content type detected from a file's leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Pdf,
    PostScript,
    Png,
    Jpeg,
    Gif,
    Tiff,
    Zip,
    Gzip,
    Unknown,
}

impl ContentType {
    /// Sniff the content type from leading bytes.
    ///
    /// Signatures must match at offset 0, the same way browsers sniff uploads.
    pub fn sniff(data: &[u8]) -> Self {
        const SIGNATURES: &[(&[u8], ContentType)] = &[
            (b"%PDF-", ContentType::Pdf),
            (b"%!PS-Adobe-", ContentType::PostScript),
            (b"\x89PNG\r\n\x1a\n", ContentType::Png),
            (b"\xff\xd8\xff", ContentType::Jpeg),
            (b"GIF87a", ContentType::Gif),
            (b"GIF89a", ContentType::Gif),
            (b"II*\x00", ContentType::Tiff),
            (b"MM\x00*", ContentType::Tiff),
            (b"PK\x03\x04", ContentType::Zip),
            (b"\x1f\x8b\x08", ContentType::Gzip),
        ];

        SIGNATURES
            .iter()
            .find(|(magic, _)| data.starts_with(magic))
            .map(|(_, kind)| *kind)
            .unwrap_or(ContentType::Unknown)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentType::Pdf => "application/pdf",
            ContentType::PostScript => "application/postscript",
            ContentType::Png => "image/png",
            ContentType::Jpeg => "image/jpeg",
            ContentType::Gif => "image/gif",
            ContentType::Tiff => "image/tiff",
            ContentType::Zip => "application/zip",
            ContentType::Gzip => "application/x-gzip",
            ContentType::Unknown => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Decides which paths are PDF jobs
#[derive(Debug, Clone)]
pub struct FileClassifier {
    /// Lowercase, without leading dot
    extensions: Vec<String>,
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self::new(vec!["pdf".to_string()])
    }
}

impl FileClassifier {
    pub fn new(extensions: Vec<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        Self { extensions }
    }

    /// True only for an existing regular file. Stat failures and directories are rejected.
    pub fn is_existing_regular_file(path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Extension check, case-insensitive
    pub fn has_pdf_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }

    /// Extension, regular file and content sniff must all agree
    pub fn is_pdf(&self, path: &Path) -> bool {
        if !self.has_pdf_extension(path) {
            return false;
        }

        if !Self::is_existing_regular_file(path) {
            return false;
        }

        match sniff_file(path) {
            Ok(kind) => {
                if kind != ContentType::Pdf {
                    tracing::debug!(path = %path.display(), content_type = %kind, "Not a PDF");
                }
                kind == ContentType::Pdf
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), "file type error: {}", e);
                false
            }
        }
    }
}

/// Sniff the content type of a file from up to [`SNIFF_LEN`] leading bytes
pub fn sniff_file(path: &Path) -> std::io::Result<ContentType> {
    let file = std::fs::File::open(path)?;
    let mut buffer = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut buffer)?;

    if buffer.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "file is empty",
        ));
    }

    Ok(ContentType::sniff(&buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PDF_BYTES: &[u8] = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";

    #[test]
    fn test_sniff_signatures() {
        assert_eq!(ContentType::sniff(PDF_BYTES), ContentType::Pdf);
        assert_eq!(ContentType::sniff(b"\x89PNG\r\n\x1a\n...."), ContentType::Png);
        assert_eq!(ContentType::sniff(b"PK\x03\x04rest"), ContentType::Zip);
        assert_eq!(ContentType::sniff(b"hello world"), ContentType::Unknown);
        // Signature must be at offset 0
        assert_eq!(ContentType::sniff(b" %PDF-1.4"), ContentType::Unknown);
    }

    #[test]
    fn test_is_pdf() {
        let dir = TempDir::new().unwrap();
        let classifier = FileClassifier::default();

        let real = dir.path().join("scan.PDF");
        std::fs::write(&real, PDF_BYTES).unwrap();
        assert!(classifier.is_pdf(&real));

        // Short files are fine as long as they carry the signature
        let short = dir.path().join("short.pdf");
        std::fs::write(&short, b"%PDF-").unwrap();
        assert!(classifier.is_pdf(&short));
    }

    #[test]
    fn test_renamed_non_pdf_rejected() {
        let dir = TempDir::new().unwrap();
        let classifier = FileClassifier::default();

        let png = dir.path().join("image.pdf");
        std::fs::write(&png, b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR").unwrap();
        assert!(!classifier.is_pdf(&png));

        let empty = dir.path().join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        assert!(!classifier.is_pdf(&empty));
    }

    #[test]
    fn test_wrong_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let classifier = FileClassifier::default();

        let txt = dir.path().join("scan.txt");
        std::fs::write(&txt, PDF_BYTES).unwrap();
        assert!(!classifier.is_pdf(&txt));

        let bare = dir.path().join("pdf");
        std::fs::write(&bare, PDF_BYTES).unwrap();
        assert!(!classifier.is_pdf(&bare));
    }

    #[test]
    fn test_missing_and_directories_rejected() {
        let dir = TempDir::new().unwrap();
        let classifier = FileClassifier::default();

        let missing = dir.path().join("gone.pdf");
        assert!(!FileClassifier::is_existing_regular_file(&missing));
        assert!(!classifier.is_pdf(&missing));

        let folder = dir.path().join("folder.pdf");
        std::fs::create_dir(&folder).unwrap();
        assert!(!FileClassifier::is_existing_regular_file(&folder));
        assert!(!classifier.is_pdf(&folder));
    }

    #[test]
    fn test_custom_extensions() {
        let classifier = FileClassifier::new(vec![".PDF".to_string(), "pdfa".to_string()]);
        assert!(classifier.has_pdf_extension(Path::new("/in/a.pdfa")));
        assert!(classifier.has_pdf_extension(Path::new("/in/a.Pdf")));
        assert!(!classifier.has_pdf_extension(Path::new("/in/a.ps")));
    }
}
