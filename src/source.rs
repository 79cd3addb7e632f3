//! File Sources
//!
//! Convenience adapters on `VtdGen` that read a document from disk, parse
//! it and keep the index for `VtdGen::take_index`:
//! - `parse_file`: a plain file
//! - `parse_gzip_file`: a GZIP-compressed file
//! - `parse_zip_file`: one named entry of a ZIP archive
//! - `parse_http_url`: the body of an HTTP GET answered with 200
//!
//! These only report success or failure; the cause of a failure is logged.

use std::fmt::Display;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use thiserror::Error;
use zip::ZipArchive;

use crate::error::ParseError;
use crate::generator::VtdGen;

#[derive(Error, Debug)]
enum SourceError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("http request: {0}")]
    Http(#[source] Box<ureq::Error>),
    #[error("http status {0}")]
    Status(u16),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl VtdGen {
    pub fn parse_file(&mut self, path: impl AsRef<Path>, namespace_aware: bool) -> bool {
        let path = path.as_ref();
        self.load(path.display(), namespace_aware, || Ok(std::fs::read(path)?))
    }

    pub fn parse_gzip_file(&mut self, path: impl AsRef<Path>, namespace_aware: bool) -> bool {
        let path = path.as_ref();
        self.load(path.display(), namespace_aware, || {
            let mut doc = Vec::new();
            GzDecoder::new(File::open(path)?).read_to_end(&mut doc)?;
            Ok(doc)
        })
    }

    pub fn parse_zip_file(&mut self, path: impl AsRef<Path>, entry: &str, namespace_aware: bool) -> bool {
        let path = path.as_ref();
        self.load(path.display(), namespace_aware, || {
            let mut archive = ZipArchive::new(File::open(path)?)?;
            let mut file = archive.by_name(entry)?;
            let mut doc = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut doc)?;
            Ok(doc)
        })
    }

    pub fn parse_http_url(&mut self, url: &str, namespace_aware: bool) -> bool {
        self.load(url, namespace_aware, || {
            let response = match ureq::get(url).call() {
                Ok(response) => response,
                Err(ureq::Error::Status(code, _)) => return Err(SourceError::Status(code)),
                Err(err) => return Err(SourceError::Http(Box::new(err))),
            };
            if response.status() != 200 {
                return Err(SourceError::Status(response.status()));
            }
            let mut doc = Vec::new();
            response.into_reader().read_to_end(&mut doc)?;
            Ok(doc)
        })
    }

    fn load(
        &mut self,
        source: impl Display,
        namespace_aware: bool,
        read: impl FnOnce() -> Result<Vec<u8>, SourceError>,
    ) -> bool {
        self.last = None;
        let result = read().and_then(|doc| {
            tracing::debug!(source = %source, bytes = doc.len(), "read document");
            Ok(self.parse(doc, namespace_aware)?)
        });
        match result {
            Ok(index) => {
                self.last = Some(index);
                true
            }
            Err(err) => {
                tracing::warn!(source = %source, error = %err, "failed to index document");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::NamedTempFile;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const DOC: &[u8] = b"<?xml version='1.0'?><r><a x='1'>t</a></r>";

    fn temp_with(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn expected_count() -> usize {
        VtdGen::new().parse(DOC.to_vec(), false).unwrap().token_count()
    }

    #[test]
    fn test_parse_file() {
        let file = temp_with(DOC);
        let mut gen = VtdGen::new();
        assert!(gen.parse_file(file.path(), false));
        let index = gen.take_index().unwrap();
        assert_eq!(index.token_count(), expected_count());
        assert!(gen.take_index().is_none());
    }

    #[test]
    fn test_parse_file_failures() {
        let mut gen = VtdGen::new();
        assert!(!gen.parse_file("/nonexistent/doc.xml", false));
        let bad = temp_with(b"<r>");
        assert!(!gen.parse_file(bad.path(), false));
        assert!(gen.take_index().is_none());
    }

    #[test]
    fn test_parse_gzip_file() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(DOC).unwrap();
        let file = temp_with(&encoder.finish().unwrap());

        let mut gen = VtdGen::new();
        assert!(gen.parse_gzip_file(file.path(), false));
        assert_eq!(gen.take_index().unwrap().token_count(), expected_count());

        let plain = temp_with(DOC);
        assert!(!gen.parse_gzip_file(plain.path(), false));
    }

    #[test]
    fn test_parse_zip_file() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ZipWriter::new(file.reopen().unwrap());
        writer.start_file("docs/a.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(DOC).unwrap();
        writer.finish().unwrap();

        let mut gen = VtdGen::new();
        assert!(gen.parse_zip_file(file.path(), "docs/a.xml", false));
        assert_eq!(gen.take_index().unwrap().token_count(), expected_count());
        assert!(!gen.parse_zip_file(file.path(), "missing.xml", false));
    }

    /// Answer one request on a local port and return its URL
    fn serve_once(status: &'static str, body: &'static [u8]) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/doc.xml", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            loop {
                line.clear();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            stream.write_all(body).unwrap();
            stream.flush().unwrap();
        });
        (url, handle)
    }

    #[test]
    fn test_parse_http_url() {
        let (url, server) = serve_once("200 OK", DOC);
        let mut gen = VtdGen::new();
        assert!(gen.parse_http_url(&url, false));
        server.join().unwrap();
        let index = gen.take_index().unwrap();
        assert_eq!(index.token_count(), expected_count());
        assert_eq!(index.document(), DOC);
    }

    #[test]
    fn test_parse_http_url_failures() {
        let mut gen = VtdGen::new();

        let (url, server) = serve_once("404 Not Found", b"missing");
        assert!(!gen.parse_http_url(&url, false));
        server.join().unwrap();

        let (url, server) = serve_once("200 OK", b"<r>");
        assert!(!gen.parse_http_url(&url, false));
        server.join().unwrap();

        assert!(!gen.parse_http_url("not a url", false));
        assert!(gen.take_index().is_none());
    }
}
