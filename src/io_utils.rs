//! I/O utilities for encoding normalization and CSV reading.
//!
//! All file I/O on the input side flows through this module. It provides:
//!
//! - **Encoding detection**: the raw bytes are probed against a fixed,
//!   ordered candidate list (ASCII, ISO-2022-JP, UTF-8, EUC-JP, Shift_JIS)
//!   and the first encoding that decodes without errors wins.
//! - **Normalization**: input that is not already UTF-8 is transcoded via
//!   `encoding_rs` into a temporary working copy. Undetectable input is
//!   assumed to be Shift_JIS.
//! - **Reader construction**: headerless, flexible comma-delimited readers
//!   over the normalized file.

use std::{
    borrow::Cow,
    fmt,
    fs::{self, File},
    io::{self, BufReader, Read, Write},
    path::{Path, PathBuf},
};

use encoding_rs::{EUC_JP, Encoding, ISO_2022_JP, SHIFT_JIS, UTF_8};
use log::{debug, info, warn};
use tempfile::TempPath;

use crate::error::LoadError;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const ESCAPE: u8 = 0x1B;

/// Source encoding of an input file as reported by [`detect_encoding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Ascii,
    Iso2022Jp,
    Utf8,
    Utf8WithBom,
    EucJp,
    ShiftJis,
}

impl SourceEncoding {
    /// Canonical input is read in place; everything else is transcoded.
    pub fn is_canonical(self) -> bool {
        matches!(self, SourceEncoding::Ascii | SourceEncoding::Utf8)
    }

    fn encoding(self) -> &'static Encoding {
        match self {
            SourceEncoding::Ascii | SourceEncoding::Utf8 | SourceEncoding::Utf8WithBom => UTF_8,
            SourceEncoding::Iso2022Jp => ISO_2022_JP,
            SourceEncoding::EucJp => EUC_JP,
            SourceEncoding::ShiftJis => SHIFT_JIS,
        }
    }

    fn decode(self, bytes: &[u8]) -> Cow<'_, str> {
        match self {
            SourceEncoding::Utf8WithBom => UTF_8.decode_with_bom_removal(bytes).0,
            other => other.encoding().decode_without_bom_handling(bytes).0,
        }
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEncoding::Ascii => f.write_str("ASCII"),
            SourceEncoding::Utf8WithBom => f.write_str("UTF-8 (BOM)"),
            other => f.write_str(other.encoding().name()),
        }
    }
}

/// Probes `bytes` against the candidate encodings in order.
///
/// Returns `None` when no candidate decodes the whole stream cleanly.
pub fn detect_encoding(bytes: &[u8]) -> Option<SourceEncoding> {
    if bytes.is_ascii() && !bytes.contains(&ESCAPE) {
        return Some(SourceEncoding::Ascii);
    }
    if bytes.is_ascii() && decodes_cleanly(ISO_2022_JP, bytes) {
        return Some(SourceEncoding::Iso2022Jp);
    }
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        if std::str::from_utf8(rest).is_ok() {
            return Some(SourceEncoding::Utf8WithBom);
        }
    }
    if std::str::from_utf8(bytes).is_ok() {
        return Some(SourceEncoding::Utf8);
    }
    if decodes_cleanly(EUC_JP, bytes) {
        return Some(SourceEncoding::EucJp);
    }
    // encoding_rs implements Shift_JIS as Windows-31J, so the Windows variant
    // and plain Shift_JIS share this probe.
    if decodes_cleanly(SHIFT_JIS, bytes) {
        return Some(SourceEncoding::ShiftJis);
    }
    None
}

fn decodes_cleanly(encoding: &'static Encoding, bytes: &[u8]) -> bool {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .is_some()
}

#[derive(Debug)]
enum WorkingCopy {
    Original(PathBuf),
    Temporary(TempPath),
}

/// The UTF-8 file the CSV parser reads: either the input itself or a
/// transcoded temporary copy owned by this value.
#[derive(Debug)]
pub struct NormalizedFile {
    source_encoding: SourceEncoding,
    copy: WorkingCopy,
}

impl NormalizedFile {
    pub fn path(&self) -> &Path {
        match &self.copy {
            WorkingCopy::Original(path) => path.as_path(),
            WorkingCopy::Temporary(path) => &**path,
        }
    }

    pub fn source_encoding(&self) -> SourceEncoding {
        self.source_encoding
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.copy, WorkingCopy::Temporary(_))
    }

    /// Removes the temporary copy, if any. The original input is never
    /// touched.
    pub fn discard(self) -> io::Result<()> {
        match self.copy {
            WorkingCopy::Original(_) => Ok(()),
            WorkingCopy::Temporary(path) => path.close(),
        }
    }
}

/// Detects the encoding of `path` and returns a UTF-8 view of it.
///
/// Canonical input is returned as-is without copying. Any other input is
/// transcoded into a uniquely named `.csv` file under `work_dir`.
pub fn normalize_encoding(path: &Path, work_dir: &Path) -> Result<NormalizedFile, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let source_encoding = detect_encoding(&bytes).unwrap_or_else(|| {
        warn!(
            "Could not detect the encoding of {:?}; assuming Shift_JIS",
            path
        );
        SourceEncoding::ShiftJis
    });
    info!("Detected {} encoding for {:?}", source_encoding, path);

    if source_encoding.is_canonical() {
        return Ok(NormalizedFile {
            source_encoding,
            copy: WorkingCopy::Original(path.to_path_buf()),
        });
    }

    let text = source_encoding.decode(&bytes);
    let mut temp = tempfile::Builder::new()
        .prefix("bulkload-")
        .suffix(".csv")
        .tempfile_in(work_dir)
        .map_err(|source| LoadError::EncodingWriteFailure {
            path: work_dir.to_path_buf(),
            source,
        })?;
    temp.write_all(text.as_bytes())
        .and_then(|()| temp.flush())
        .map_err(|source| LoadError::EncodingWriteFailure {
            path: temp.path().to_path_buf(),
            source,
        })?;

    let temp_path = temp.into_temp_path();
    debug!("Wrote UTF-8 working copy to {:?}", temp_path);
    Ok(NormalizedFile {
        source_encoding,
        copy: WorkingCopy::Temporary(temp_path),
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(
    path: &Path,
    delimiter: u8,
) -> Result<csv::Reader<BufReader<File>>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(open_csv_reader(BufReader::new(file), delimiter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detect_encoding_prefers_ascii_for_plain_text() {
        assert_eq!(detect_encoding(b"id,name\n1,a\n"), Some(SourceEncoding::Ascii));
        assert_eq!(detect_encoding(b""), Some(SourceEncoding::Ascii));
    }

    #[test]
    fn detect_encoding_recognises_utf8_and_bom() {
        let text = "1,スペシャルウィーク\n";
        assert_eq!(detect_encoding(text.as_bytes()), Some(SourceEncoding::Utf8));

        let mut with_bom = UTF8_BOM.to_vec();
        with_bom.extend_from_slice(text.as_bytes());
        assert_eq!(detect_encoding(&with_bom), Some(SourceEncoding::Utf8WithBom));
    }

    #[test]
    fn detect_encoding_recognises_iso_2022_jp() {
        let (encoded, _, _) = ISO_2022_JP.encode("1,スキル\n");
        assert_eq!(detect_encoding(&encoded), Some(SourceEncoding::Iso2022Jp));
    }

    #[test]
    fn detect_encoding_recognises_shift_jis() {
        let (encoded, _, _) = SHIFT_JIS.encode("1,スペシャルウィーク\n");
        assert_eq!(detect_encoding(&encoded), Some(SourceEncoding::ShiftJis));
    }

    #[test]
    fn detect_encoding_recognises_euc_jp() {
        let (encoded, _, _) = EUC_JP.encode("1,東京\n");
        assert_eq!(detect_encoding(&encoded), Some(SourceEncoding::EucJp));
    }

    #[test]
    fn detect_encoding_gives_up_on_binary_noise() {
        assert_eq!(detect_encoding(&[0x80, 0xFF, 0xFE, 0x80]), None);
    }

    #[test]
    fn canonical_input_is_not_copied() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("plain.csv");
        fs::write(&input, "1,a\n").unwrap();

        let normalized = normalize_encoding(&input, dir.path()).unwrap();
        assert!(!normalized.is_temporary());
        assert_eq!(normalized.path(), input.as_path());
        normalized.discard().unwrap();
        assert!(input.exists());
    }

    #[test]
    fn shift_jis_input_is_transcoded_into_work_dir() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sjis.csv");
        let (encoded, _, _) = SHIFT_JIS.encode("1,ゴールドシップ\n");
        fs::write(&input, &encoded).unwrap();

        let normalized = normalize_encoding(&input, dir.path()).unwrap();
        assert!(normalized.is_temporary());
        assert_eq!(normalized.source_encoding(), SourceEncoding::ShiftJis);
        assert_eq!(normalized.path().parent(), Some(dir.path()));
        let converted = fs::read_to_string(normalized.path()).unwrap();
        assert_eq!(converted, "1,ゴールドシップ\n");

        let temp = normalized.path().to_path_buf();
        normalized.discard().unwrap();
        assert!(!temp.exists());
        assert!(input.exists());
    }

    #[test]
    fn bom_is_stripped_from_working_copy() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("bom.csv");
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("1,ダイワスカーレット\n".as_bytes());
        fs::write(&input, &bytes).unwrap();

        let normalized = normalize_encoding(&input, dir.path()).unwrap();
        let converted = fs::read_to_string(normalized.path()).unwrap();
        assert_eq!(converted, "1,ダイワスカーレット\n");
    }

    #[test]
    fn undetectable_input_falls_back_to_shift_jis() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("noise.csv");
        fs::write(&input, [0x31, 0x2C, 0x80, 0xFF, 0x0A]).unwrap();

        let normalized = normalize_encoding(&input, dir.path()).unwrap();
        assert!(normalized.is_temporary());
        assert_eq!(normalized.source_encoding(), SourceEncoding::ShiftJis);
        let converted = fs::read_to_string(normalized.path()).unwrap();
        assert!(converted.starts_with("1,"));
    }

    #[test]
    fn missing_work_dir_is_an_encoding_write_failure() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sjis.csv");
        let (encoded, _, _) = SHIFT_JIS.encode("1,ウオッカ\n");
        fs::write(&input, &encoded).unwrap();

        let err = normalize_encoding(&input, &dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, LoadError::EncodingWriteFailure { .. }));
    }

    #[test]
    fn reader_keeps_ragged_rows() {
        let data = "a,b,c\n1,2\n\"x,y\",z\n";
        let mut reader = open_csv_reader(data.as_bytes(), DEFAULT_CSV_DELIMITER);
        let lengths: Vec<usize> = reader.records().map(|r| r.unwrap().len()).collect();
        assert_eq!(lengths, vec![3, 2, 2]);
    }
}
