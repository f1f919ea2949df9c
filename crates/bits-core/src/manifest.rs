//! Key-stream framing
//!
//! A split file is replaced in the working tree by a "key manifest": one
//! fixed header line, one 64-hex key line per chunk in reconstruction
//! order, and one fixed footer line. The strings are bit-exact; readers
//! tolerate a trailing CR per line, writers emit LF only.

use crate::key::Key;
use crate::{BitsError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

/// First line of every key manifest
pub const MANIFEST_HEADER: &str =
    "--- to use this file decode it with the 'git-bits' extension ---";

/// Last line of every key manifest
pub const MANIFEST_FOOTER: &str =
    "----------------------- end of chunks --------------------------";

/// Writes a framed key manifest to an output stream
pub struct ManifestWriter<W> {
    out: W,
}

impl<W: AsyncWrite + Unpin> ManifestWriter<W> {
    /// Start a manifest by writing the header line
    pub async fn new(mut out: W) -> Result<Self> {
        out.write_all(MANIFEST_HEADER.as_bytes()).await?;
        out.write_all(b"\n").await?;
        Ok(Self { out })
    }

    /// Append one key line
    pub async fn write_key(&mut self, key: &Key) -> Result<()> {
        self.out.write_all(key.to_hex().as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        Ok(())
    }

    /// Write the footer line and hand the output stream back
    pub async fn finish(mut self) -> Result<W> {
        self.out.write_all(MANIFEST_FOOTER.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(self.out)
    }
}

enum ReadState {
    Header,
    Keys,
    Done,
}

/// Streams the key lines of a framed manifest
pub struct ManifestReader<R> {
    lines: Lines<BufReader<R>>,
    state: ReadState,
}

impl<R: AsyncRead + Unpin> ManifestReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            lines: BufReader::new(input).lines(),
            state: ReadState::Header,
        }
    }

    /// Next key, or `None` once the footer has been consumed
    ///
    /// The header is validated on the first call; a stream that ends
    /// before the footer fails with `TruncatedManifest`.
    pub async fn next_key(&mut self) -> Result<Option<Key>> {
        if let ReadState::Header = self.state {
            self.read_header().await?;
            self.state = ReadState::Keys;
        }
        if let ReadState::Done = self.state {
            return Ok(None);
        }
        let line = match self.lines.next_line().await? {
            Some(line) => line,
            None => return Err(BitsError::TruncatedManifest),
        };
        let line = line.trim_end_matches('\r');
        if line == MANIFEST_FOOTER {
            self.state = ReadState::Done;
            return Ok(None);
        }
        Key::from_hex(line).map(Some)
    }

    async fn read_header(&mut self) -> Result<()> {
        loop {
            let line = match self.lines.next_line().await? {
                Some(line) => line,
                None => {
                    return Err(BitsError::BadManifest(
                        "missing header line".to_string(),
                    ))
                }
            };
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if line != MANIFEST_HEADER {
                return Err(BitsError::BadManifest(format!(
                    "unexpected first line {line:?}"
                )));
            }
            return Ok(());
        }
    }
}

/// Call `f` for every key in the manifest read from `input`
///
/// Returns the number of keys observed. The first error returned by `f`
/// stops the stream and is wrapped so its message is preserved.
pub async fn for_each<R, F, E>(input: R, mut f: F) -> Result<usize>
where
    R: AsyncRead + Unpin,
    F: FnMut(Key) -> std::result::Result<(), E>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut reader = ManifestReader::new(input);
    let mut count = 0;
    while let Some(key) = reader.next_key().await? {
        f(key).map_err(|e| BitsError::Callback(Box::new(e)))?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn manifest(keys: &[&str]) -> String {
        let mut text = format!("{MANIFEST_HEADER}\n");
        for key in keys {
            text.push_str(key);
            text.push('\n');
        }
        text.push_str(MANIFEST_FOOTER);
        text.push('\n');
        text
    }

    #[tokio::test]
    async fn write_read_roundtrip() {
        let k1 = Key::from_hex(&"01".repeat(32)).unwrap();
        let k2 = Key::from_hex(&"fe".repeat(32)).unwrap();

        let mut writer = ManifestWriter::new(Cursor::new(Vec::new())).await.unwrap();
        writer.write_key(&k1).await.unwrap();
        writer.write_key(&k2).await.unwrap();
        let out = writer.finish().await.unwrap().into_inner();

        let mut reader = ManifestReader::new(&out[..]);
        assert_eq!(reader.next_key().await.unwrap(), Some(k1));
        assert_eq!(reader.next_key().await.unwrap(), Some(k2));
        assert_eq!(reader.next_key().await.unwrap(), None);
        assert_eq!(reader.next_key().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_manifest_has_no_keys() {
        let writer = ManifestWriter::new(Cursor::new(Vec::new())).await.unwrap();
        let out = writer.finish().await.unwrap().into_inner();
        let mut reader = ManifestReader::new(&out[..]);
        assert_eq!(reader.next_key().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_missing_header() {
        let text = format!("{}\n{}\n", "00".repeat(32), MANIFEST_FOOTER);
        let mut reader = ManifestReader::new(text.as_bytes());
        let err = reader.next_key().await.unwrap_err();
        assert!(matches!(err, BitsError::BadManifest(_)));
    }

    #[tokio::test]
    async fn rejects_missing_footer() {
        let text = format!("{MANIFEST_HEADER}\n{}\n", "00".repeat(32));
        let mut reader = ManifestReader::new(text.as_bytes());
        assert!(reader.next_key().await.unwrap().is_some());
        let err = reader.next_key().await.unwrap_err();
        assert!(matches!(err, BitsError::TruncatedManifest));
    }

    #[tokio::test]
    async fn rejects_short_key_line() {
        let text = manifest(&["0123456789abcdef"]);
        let mut reader = ManifestReader::new(text.as_bytes());
        let err = reader.next_key().await.unwrap_err();
        assert!(matches!(err, BitsError::BadKey(_)));
    }

    #[tokio::test]
    async fn rejects_non_hex_key_line() {
        let text = manifest(&["invalid_hex_key"]);
        let mut reader = ManifestReader::new(text.as_bytes());
        assert!(reader.next_key().await.is_err());
    }

    #[tokio::test]
    async fn tolerates_carriage_returns() {
        let hex = "ab".repeat(32);
        let text = format!("{MANIFEST_HEADER}\r\n{hex}\r\n{MANIFEST_FOOTER}\r\n");
        let mut reader = ManifestReader::new(text.as_bytes());
        assert_eq!(
            reader.next_key().await.unwrap(),
            Some(Key::from_hex(&hex).unwrap())
        );
        assert_eq!(reader.next_key().await.unwrap(), None);
    }

    #[tokio::test]
    async fn skips_leading_blank_lines() {
        let hex = "cd".repeat(32);
        let text = format!("\n\n{MANIFEST_HEADER}\n{hex}\n{MANIFEST_FOOTER}\n");
        let mut reader = ManifestReader::new(text.as_bytes());
        assert_eq!(
            reader.next_key().await.unwrap(),
            Some(Key::from_hex(&hex).unwrap())
        );
    }

    #[tokio::test]
    async fn for_each_visits_every_key() {
        let text = manifest(&[
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
            "fedcba9876543210fedcba9876543210fedcba9876543210fedcba9876543210",
        ]);
        let mut seen = Vec::new();
        let count = for_each(text.as_bytes(), |key| {
            seen.push(key);
            Ok::<(), std::io::Error>(())
        })
        .await
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn for_each_wraps_callback_errors() {
        let text = manifest(&[
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        ]);
        let err = for_each(text.as_bytes(), |_| {
            Err::<(), _>(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "unexpected EOF",
            ))
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("unexpected EOF"));
    }
}
