use crate::classify::{Message, Role};
use crate::config::DateRange;
use crate::pipeline::ClassifiedTranscript;
use crate::report::ReportModel;
use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{info, warn};

const SEPARATOR: &str = "----------";
const TRANSCRIPT_PREFIX: &str = "transcript_";
const TRANSCRIPT_SUFFIX: &str = ".txt";

pub const REPORT_TEXT: &str = "report.txt";
pub const REPORT_JSON: &str = "report.json";

// ===================================================================
// Writers
// ===================================================================

/// Create the output directory (and parents) if needed.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        info!(dir = %dir.display(), "output directory already exists");
    } else {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        info!(dir = %dir.display(), "created output directory");
    }
    Ok(())
}

pub fn transcript_path(dir: &Path, transcript_id: &str) -> PathBuf {
    dir.join(format!("{TRANSCRIPT_PREFIX}{transcript_id}{TRANSCRIPT_SUFFIX}"))
}

/// Render messages as `ROLE: content` blocks, each followed by a separator
/// line.
///
/// Continuation lines of the content that would read as a separator (any
/// number of backslashes followed by `----------`) get one extra leading
/// backslash, so `parse_transcript` can tell them apart from block
/// boundaries.
pub fn format_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for m in messages {
        out.push_str(m.role.as_str());
        out.push_str(": ");
        for (i, line) in m.content.split('\n').enumerate() {
            if i > 0 {
                out.push('\n');
                if is_escaped_separator(line) {
                    out.push('\\');
                }
            }
            out.push_str(line);
        }
        out.push('\n');
        out.push_str(SEPARATOR);
        out.push('\n');
    }
    out
}

/// A separator preceded by zero or more backslashes.
fn is_escaped_separator(line: &str) -> bool {
    line.trim_end_matches('\r').trim_start_matches('\\') == SEPARATOR
}

pub fn write_transcript(dir: &Path, transcript: &ClassifiedTranscript) -> Result<PathBuf> {
    let path = transcript_path(dir, &transcript.id);
    fs::write(&path, format_transcript(&transcript.messages))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Quote a CSV field when it contains a delimiter, quote, or line break.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Write every message of every transcript as `Timestamp,Role,Message`
/// rows.
pub fn write_messages_csv<W: Write>(out: &mut W, transcripts: &[ClassifiedTranscript]) -> io::Result<()> {
    out.write_all(b"Timestamp,Role,Message\r\n")?;
    for m in transcripts.iter().flat_map(|t| &t.messages) {
        write!(
            out,
            "{},{},{}\r\n",
            csv_field(&m.timestamp),
            m.role,
            csv_field(&m.content)
        )?;
    }
    Ok(())
}

/// `transcripts_<start>_to_<end>_<YYYYMMDD_HHMMSS>.csv`
pub fn csv_filename(range: &DateRange, now: OffsetDateTime) -> Result<String> {
    let stamp = now
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .context("formatting export timestamp")?;
    Ok(format!(
        "transcripts_{}_to_{}_{stamp}.csv",
        range.start_label(),
        range.end_label()
    ))
}

pub fn export_csv(dir: &Path, range: &DateRange, transcripts: &[ClassifiedTranscript]) -> Result<PathBuf> {
    let path = dir.join(csv_filename(range, OffsetDateTime::now_utc())?);
    let mut buf = Vec::new();
    write_messages_csv(&mut buf, transcripts).context("formatting CSV")?;
    fs::write(&path, buf).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Write `report.txt` (rendered through `template`) and `report.json`.
pub fn write_report(dir: &Path, report: &ReportModel, template: &str) -> Result<()> {
    let text = report.render(template)?;
    let text_path = dir.join(REPORT_TEXT);
    fs::write(&text_path, text).with_context(|| format!("writing {}", text_path.display()))?;

    let json = serde_json::to_string_pretty(report).context("serializing report")?;
    let json_path = dir.join(REPORT_JSON);
    fs::write(&json_path, json).with_context(|| format!("writing {}", json_path.display()))?;
    Ok(())
}

// ===================================================================
// Reader for previously exported directories
// ===================================================================

/// Parse the text written by `format_transcript` back into messages.
///
/// Blocks whose label isn't a known role are skipped. Timestamps are not
/// stored in the text dump and come back empty.
pub fn parse_transcript(contents: &str) -> Vec<Message> {
    let normalized = contents.replace("\r\n", "\n");
    let mut messages = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in normalized.split('\n') {
        if line == SEPARATOR {
            messages.extend(parse_block(&block));
            block.clear();
        } else {
            block.push(line);
        }
    }
    // Whatever follows the last separator; usually the empty tail.
    messages.extend(parse_block(&block));
    messages
}

fn parse_block(lines: &[&str]) -> Option<Message> {
    let (first, rest) = lines.split_first()?;
    let (label, head) = first.split_once(": ")?;
    let role = Role::from_label(label)?;
    let mut content = head.to_string();
    for line in rest {
        content.push('\n');
        match line.strip_prefix('\\') {
            Some(unescaped) if is_escaped_separator(line) => content.push_str(unescaped),
            _ => content.push_str(line),
        }
    }
    Some(Message {
        role,
        content,
        timestamp: String::new(),
    })
}

/// Read every `transcript_<id>.txt` in `dir`, sorted by id.
pub fn read_transcripts(dir: &Path) -> Result<Vec<ClassifiedTranscript>> {
    let entries = fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    let mut transcripts = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("reading {}", dir.display()))?;
        let name = entry.file_name();
        let Some(id) = name
            .to_str()
            .and_then(|n| n.strip_prefix(TRANSCRIPT_PREFIX))
            .and_then(|n| n.strip_suffix(TRANSCRIPT_SUFFIX))
        else {
            continue;
        };
        let path = entry.path();
        match fs::read_to_string(&path) {
            Ok(contents) => transcripts.push(ClassifiedTranscript {
                id: id.to_string(),
                messages: parse_transcript(&contents),
            }),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable transcript"),
        }
    }
    transcripts.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(transcripts)
}
