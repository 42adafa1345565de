//! ファイル読み込みユーティリティ（gzip対応）
//!
//! 入力はすべて丸ごと読み込んで即座に閉じる。ハンドルを保持したまま次の段階へ進むことはない。

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::{GateError, Result};

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

/// ファイル全体を UTF-8 文字列として読む。拡張子が `.gz` なら展開してから読む。
///
/// 存在しないファイルは [`GateError::NotFound`]、それ以外の読み込み失敗は
/// [`GateError::Format`] に分類する。
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let p = path.as_ref();
    read_text_inner(p).map_err(|e| classify_io_error(p, e))
}

fn read_text_inner(p: &Path) -> io::Result<String> {
    let f = File::open(p)?;
    let ext = p.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();

    let mut buf = String::with_capacity(READER_BUF_CAP);
    if ext == "gz" {
        flate2::read::GzDecoder::new(f).read_to_string(&mut buf)?;
    } else {
        io::BufReader::with_capacity(READER_BUF_CAP, f).read_to_string(&mut buf)?;
    }
    Ok(buf)
}

fn classify_io_error(p: &Path, e: io::Error) -> GateError {
    match e.kind() {
        io::ErrorKind::NotFound => GateError::NotFound(format!("file not found: {}", p.display())),
        _ => GateError::Format(format!("failed to read {}: {e}", p.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_plain_text() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rss.txt");
        std::fs::write(&path, "rss_bytes=1024\n").unwrap();
        assert_eq!(read_text(&path).unwrap(), "rss_bytes=1024\n");
    }

    #[test]
    fn test_read_gzip_text() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sample.json.gz");
        let f = File::create(&path).unwrap();
        let mut enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        enc.write_all(br#"{"iters":[1],"times":[1000000]}"#).unwrap();
        enc.finish().unwrap();

        assert_eq!(read_text(&path).unwrap(), r#"{"iters":[1],"times":[1000000]}"#);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_text(tmp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, GateError::NotFound(_)));
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_invalid_utf8_is_format_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(read_text(&path).unwrap_err(), GateError::Format(_)));
    }
}
