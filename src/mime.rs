use std::path::Path;

/// The handful of content types this proxy actually needs to get right:
/// browsable POM/metadata XML, jars, a generated index page, and everything
/// else (checksums, signatures) served as plain text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MimeType {
    Html,
    Jar,
    Xml,
    PlainText,
    OctetStream,
}

impl MimeType {
    pub fn as_str(self) -> &'static str {
        match self {
            MimeType::Html => "text/html; charset=utf-8",
            MimeType::Jar => "application/java-archive",
            MimeType::Xml => "application/xml; charset=utf-8",
            MimeType::PlainText => "text/plain; charset=utf-8",
            MimeType::OctetStream => "application/octet-stream",
        }
    }
}

/// Maps an artifact path's final extension to a MIME type. Extensionless
/// paths (shouldn't normally occur for artifacts, but do for generated
/// listings) get `application/octet-stream`; anything outside the known set
/// falls back to `text/plain`, which is how Maven repositories serve
/// checksum and signature sidecar files (`.sha1`, `.md5`, `.asc`, ...).
pub fn get_mime_type(path: &str) -> &'static str {
    classify(Path::new(path)).as_str()
}

fn classify(path: &Path) -> MimeType {
    match path.extension().and_then(|s| s.to_str()) {
        None => MimeType::OctetStream,
        Some(ext) => match ext.to_ascii_lowercase().as_str() {
            "html" | "htm" => MimeType::Html,
            "jar" => MimeType::Jar,
            "xml" | "pom" => MimeType::Xml,
            _ => MimeType::PlainText,
        },
    }
}
