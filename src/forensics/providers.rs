//! Capability provider implementations.
//!
//! The signature scanner and metadata extractor wrap external tools and
//! report `not_available` when the binary is missing. The strings extractor
//! and format carver are native.

use std::{collections::BTreeMap, io::Write, path::PathBuf, time::Duration};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::models::scan::{CarvingReport, MalwareScan, MetadataReport, StringsReport, ThreatSignature};

use super::{FormatCarver, MetadataExtractor, SignatureScanner, StringsExtractor};

/// Deadline for one external tool invocation.
const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

async fn run_command(program: &PathBuf, args: &[&str]) -> Result<CommandOutput, String> {
    let output = tokio::time::timeout(TOOL_TIMEOUT, Command::new(program).args(args).output())
        .await
        .map_err(|_| format!("command timeout after {}s", TOOL_TIMEOUT.as_secs()))?
        .map_err(|e| e.to_string())?;

    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn write_temp_file(bytes: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|e| e.to_string())?;
    file.write_all(bytes).map_err(|e| e.to_string())?;
    Ok(file)
}

/// Signature scanner backed by an external command-line scanner.
///
/// The tool contract: exit code 0 means clean, a non-zero exit with
/// `<name> FOUND` lines on stdout means infected.
pub struct CommandSignatureScanner {
    command: PathBuf,
}

impl CommandSignatureScanner {
    /// Creates a scanner wrapping the tool at `command`.
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self { command: command.into() }
    }
}

#[async_trait]
impl SignatureScanner for CommandSignatureScanner {
    fn available(&self) -> bool {
        self.command.exists()
    }

    async fn scan(&self, bytes: &[u8]) -> MalwareScan {
        let temp = match write_temp_file(bytes) {
            Ok(temp) => temp,
            Err(e) => return scan_error(e),
        };
        let path = temp.path().to_string_lossy().into_owned();

        let output = match run_command(&self.command, &["--no-summary", &path]).await {
            Ok(output) => output,
            Err(e) => return scan_error(e),
        };

        if output.success {
            return MalwareScan {
                success: true,
                status: "scanned".to_string(),
                detected: false,
                threats: Vec::new(),
                error: None,
            };
        }

        let threats: Vec<ThreatSignature> = output
            .stdout
            .lines()
            .filter(|line| line.contains("FOUND"))
            .filter_map(|line| {
                let after_colon = line.splitn(2, ": ").nth(1)?;
                let name = after_colon.split(" FOUND").next()?.trim();
                (!name.is_empty()).then(|| ThreatSignature {
                    name: name.to_string(),
                    kind: "signature".to_string(),
                })
            })
            .collect();

        if threats.is_empty() {
            return scan_error(output.stderr);
        }

        MalwareScan {
            success: true,
            status: "scanned".to_string(),
            detected: true,
            threats,
            error: None,
        }
    }
}

fn scan_error(message: String) -> MalwareScan {
    MalwareScan {
        success: false,
        status: "error".to_string(),
        detected: false,
        threats: Vec::new(),
        error: Some(message),
    }
}

/// Native printable-strings extractor.
pub struct PrintableStrings {
    min_length: usize,
    max_samples: usize,
}

impl Default for PrintableStrings {
    fn default() -> Self {
        Self { min_length: 8, max_samples: 20 }
    }
}

#[async_trait]
impl StringsExtractor for PrintableStrings {
    fn available(&self) -> bool {
        true
    }

    async fn extract(&self, bytes: &[u8]) -> StringsReport {
        let mut samples = Vec::new();
        let mut count: u32 = 0;
        let mut run: Vec<u8> = Vec::new();

        for &byte in bytes.iter().chain(std::iter::once(&0u8)) {
            if (0x20..=0x7e).contains(&byte) {
                run.push(byte);
                continue;
            }
            if run.len() >= self.min_length {
                count += 1;
                if samples.len() < self.max_samples {
                    samples.push(String::from_utf8_lossy(&run).into_owned());
                }
            }
            run.clear();
        }

        StringsReport { success: true, count, samples, error: None }
    }
}

/// Metadata extractor backed by an external tool emitting JSON.
pub struct CommandMetadataExtractor {
    command: PathBuf,
}

impl CommandMetadataExtractor {
    /// Creates an extractor wrapping the tool at `command`.
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self { command: command.into() }
    }
}

#[async_trait]
impl MetadataExtractor for CommandMetadataExtractor {
    fn available(&self) -> bool {
        self.command.exists()
    }

    async fn extract(&self, bytes: &[u8]) -> MetadataReport {
        let temp = match write_temp_file(bytes) {
            Ok(temp) => temp,
            Err(e) => {
                return MetadataReport {
                    success: false,
                    fields: BTreeMap::new(),
                    error: Some(e),
                }
            }
        };
        let path = temp.path().to_string_lossy().into_owned();

        let output = match run_command(&self.command, &["-json", &path]).await {
            Ok(output) if output.success => output,
            Ok(output) => {
                return MetadataReport {
                    success: false,
                    fields: BTreeMap::new(),
                    error: Some(output.stderr),
                }
            }
            Err(e) => {
                return MetadataReport {
                    success: false,
                    fields: BTreeMap::new(),
                    error: Some(e),
                }
            }
        };

        let fields = parse_json_metadata(&output.stdout)
            .unwrap_or_else(|| parse_text_metadata(&output.stdout));
        MetadataReport { success: true, fields, error: None }
    }
}

fn parse_json_metadata(stdout: &str) -> Option<BTreeMap<String, String>> {
    let value: serde_json::Value = serde_json::from_str(stdout).ok()?;
    let object = value.as_array()?.first()?.as_object()?;
    let mut fields = BTreeMap::new();
    for (key, value) in object {
        if key == "SourceFile" {
            continue;
        }
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        fields.insert(key.clone(), rendered);
    }
    Some(fields)
}

// Fallback for tools emitting `Key : Value` lines instead of JSON.
fn parse_text_metadata(stdout: &str) -> BTreeMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            let value = value.trim();
            (!key.is_empty() && !value.is_empty() && !key.starts_with("----"))
                .then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Native embedded-format carver scanning for magic numbers.
pub struct MagicCarver;

/// Markers searched anywhere in the buffer.
const EMBEDDED_MARKERS: &[(&[u8], &str)] = &[
    (b"PK\x03\x04", "ZIP archive"),
    (b"\x7fELF", "ELF executable"),
    (b"%PDF", "PDF document"),
    (b"\x89PNG\r\n\x1a\n", "PNG image"),
    (b"\xff\xd8\xff", "JPEG image"),
    (b"\x1f\x8b", "GZIP stream"),
    (b"Rar!\x1a\x07", "RAR archive"),
    (b"7z\xbc\xaf\x27\x1c", "7-Zip archive"),
];

/// Markers only meaningful at a fixed offset.
const ANCHORED_MARKERS: &[(&[u8], usize, &str)] =
    &[(b"MZ", 0, "DOS/PE executable"), (b"ustar", 257, "TAR archive")];

/// Signatures reported per file, at most.
const MAX_SIGNATURES: usize = 10;

#[async_trait]
impl FormatCarver for MagicCarver {
    fn available(&self) -> bool {
        true
    }

    async fn carve(&self, bytes: &[u8]) -> CarvingReport {
        let mut signatures = Vec::new();

        for (marker, offset, name) in ANCHORED_MARKERS {
            if bytes.len() >= offset + marker.len() && &bytes[*offset..offset + marker.len()] == *marker
            {
                signatures.push(format!("{name} at offset {offset}"));
            }
        }

        'markers: for (marker, name) in EMBEDDED_MARKERS {
            for offset in find_occurrences(bytes, marker, 5) {
                signatures.push(format!("{name} at offset {offset}"));
                if signatures.len() >= MAX_SIGNATURES {
                    break 'markers;
                }
            }
        }

        CarvingReport { success: true, signatures, error: None }
    }
}

fn find_occurrences(haystack: &[u8], needle: &[u8], cap: usize) -> Vec<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(offset, _)| offset)
        .take(cap)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn strings_extractor_finds_long_printable_runs() {
        let mut bytes = vec![0u8, 1, 2];
        bytes.extend_from_slice(b"hidden-payload-marker");
        bytes.push(0);
        bytes.extend_from_slice(b"short");
        bytes.push(0xff);

        let report = PrintableStrings::default().extract(&bytes).await;
        assert!(report.success);
        assert_eq!(report.count, 1);
        assert_eq!(report.samples, vec!["hidden-payload-marker".to_string()]);
    }

    #[tokio::test]
    async fn strings_sample_list_is_capped() {
        let mut bytes = Vec::new();
        for i in 0..30 {
            bytes.extend_from_slice(format!("printable-run-{i:02}").as_bytes());
            bytes.push(0);
        }
        let report = PrintableStrings::default().extract(&bytes).await;
        assert_eq!(report.count, 30);
        assert_eq!(report.samples.len(), 20);
    }

    #[tokio::test]
    async fn carver_reports_embedded_zip_headers() {
        let mut bytes = vec![0u8; 64];
        bytes.extend_from_slice(b"PK\x03\x04rest-of-archive");
        let report = MagicCarver.carve(&bytes).await;
        assert!(report.success);
        assert_eq!(report.signatures, vec!["ZIP archive at offset 64".to_string()]);
    }

    #[tokio::test]
    async fn carver_anchors_executable_markers_at_zero() {
        let mut bytes = b"MZ".to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        let report = MagicCarver.carve(&bytes).await;
        assert!(report.signatures.iter().any(|s| s.contains("DOS/PE executable")));

        // MZ later in the buffer is not an executable header.
        let mut shifted = vec![0u8; 8];
        shifted.extend_from_slice(b"MZ");
        let report = MagicCarver.carve(&shifted).await;
        assert!(report.signatures.is_empty());
    }

    #[tokio::test]
    async fn missing_scanner_binary_reports_unavailable() {
        let scanner = CommandSignatureScanner::new("/nonexistent/scanner");
        assert!(!scanner.available());
    }

    #[test]
    fn text_metadata_fallback_parses_key_value_lines() {
        let fields = parse_text_metadata("File Type : PDF\nAuthor: someone\n---- junk");
        assert_eq!(fields.get("File Type").map(String::as_str), Some("PDF"));
        assert_eq!(fields.get("Author").map(String::as_str), Some("someone"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn json_metadata_skips_the_source_file_field() {
        let stdout = r#"[{"SourceFile": "/tmp/x", "FileType": "PNG", "ImageWidth": 32}]"#;
        let fields = parse_json_metadata(stdout).unwrap();
        assert!(!fields.contains_key("SourceFile"));
        assert_eq!(fields.get("FileType").map(String::as_str), Some("PNG"));
        assert_eq!(fields.get("ImageWidth").map(String::as_str), Some("32"));
    }
}
