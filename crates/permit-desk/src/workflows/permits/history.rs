//! Append-only note history attached to each permit.
//!
//! Entries are kept structured (text vs. attachment) and in chronological order. The
//! legacy single-string format `[<timestamp> - <author>] <text>` separated by blank
//! lines is still readable and writable for older records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";
const LEGACY_TIMESTAMP_FORMATS: [&str; 3] = ["%d/%m/%Y %H:%M:%S", "%d/%m/%Y, %H:%M:%S", "%d/%m/%Y %H:%M"];
const ENTRY_SEPARATOR: &str = "\n\n";

pub const SINGLE_ATTACHMENT_PREFIX: &str = "Documento anexado:";
pub const MULTIPLE_ATTACHMENT_PREFIX: &str = "Documentos anexados:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    Text,
    Attachment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEntry {
    pub kind: NoteKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// `None` only for headerless text imported from legacy records.
    #[serde(default)]
    pub recorded_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub author: String,
}

impl NoteEntry {
    /// Free-text note; blank input yields `None`.
    pub fn text(text: &str, author: &str, at: NaiveDateTime) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        Some(Self {
            kind: NoteKind::Text,
            text: trimmed.to_string(),
            attachments: Vec::new(),
            recorded_at: Some(at),
            author: author.trim().to_string(),
        })
    }

    /// Note announcing uploaded files; `None` when nothing was uploaded.
    pub fn attachment(files: &[String], author: &str, at: NaiveDateTime) -> Option<Self> {
        let prefix = match files.len() {
            0 => return None,
            1 => SINGLE_ATTACHMENT_PREFIX,
            _ => MULTIPLE_ATTACHMENT_PREFIX,
        };

        Some(Self {
            kind: NoteKind::Attachment,
            text: format!("{prefix} {}", files.join(", ")),
            attachments: files.to_vec(),
            recorded_at: Some(at),
            author: author.trim().to_string(),
        })
    }

    pub fn header(&self) -> Option<String> {
        self.recorded_at
            .map(|at| format!("[{} - {}]", at.format(TIMESTAMP_FORMAT), self.author))
    }

    /// Single display line in the legacy shape.
    pub fn render(&self) -> String {
        match self.header() {
            Some(header) => format!("{header} {}", self.text),
            None => self.text.clone(),
        }
    }

    /// Best-effort link between this note and a stored file name.
    ///
    /// Matching is case-insensitive substring containment in either direction, so it
    /// can produce false positives; callers should treat it as a hint.
    pub fn mentions_file(&self, file_name: &str) -> bool {
        let wanted = file_name.trim().to_lowercase();
        if wanted.is_empty() {
            return false;
        }

        match self.kind {
            NoteKind::Attachment => self.attachments.iter().any(|attached| {
                let attached = attached.to_lowercase();
                attached.contains(&wanted) || wanted.contains(&attached)
            }),
            NoteKind::Text => self.text.to_lowercase().contains(&wanted),
        }
    }
}

/// Chronological, append-only list of notes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteHistory {
    entries: Vec<NoteEntry>,
}

impl NoteHistory {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn append(&mut self, entry: NoteEntry) {
        self.entries.push(entry);
    }

    /// Oldest first, the order entries were appended in.
    pub fn entries(&self) -> &[NoteEntry] {
        &self.entries
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &NoteEntry> {
        self.entries.iter().rev()
    }

    /// Display lines, most recent first.
    pub fn render(&self) -> Vec<String> {
        self.newest_first().map(NoteEntry::render).collect()
    }

    pub fn attachment_notes(&self) -> impl Iterator<Item = &NoteEntry> {
        self.newest_first()
            .filter(|entry| entry.kind == NoteKind::Attachment)
    }

    /// Legacy storage string: entries in append order separated by a blank line.
    pub fn to_legacy_text(&self) -> String {
        self.entries
            .iter()
            .map(NoteEntry::render)
            .collect::<Vec<_>>()
            .join(ENTRY_SEPARATOR)
    }

    /// Reads the legacy single-string format.
    ///
    /// A blank line ends an entry, so text after it without a header becomes its own
    /// headerless entry.
    pub fn from_legacy_text(text: &str) -> Self {
        let mut entries: Vec<NoteEntry> = Vec::new();
        let mut current: Option<(Option<(NaiveDateTime, String)>, Vec<&str>)> = None;
        let mut after_blank = false;

        for line in text.lines() {
            if line.trim().is_empty() {
                after_blank = true;
                continue;
            }

            if let Some((at, author, rest)) = parse_header(line) {
                if let Some(block) = current.take() {
                    push_legacy_entry(&mut entries, block);
                }
                current = Some((Some((at, author)), vec![rest]));
            } else if after_blank || current.is_none() {
                if let Some(block) = current.take() {
                    push_legacy_entry(&mut entries, block);
                }
                current = Some((None, vec![line]));
            } else if let Some((_, lines)) = current.as_mut() {
                lines.push(line);
            }
            after_blank = false;
        }

        if let Some(block) = current.take() {
            push_legacy_entry(&mut entries, block);
        }

        Self { entries }
    }
}

fn parse_header(line: &str) -> Option<(NaiveDateTime, String, &str)> {
    let inner = line.strip_prefix('[')?;
    let (header, rest) = inner.split_once(']')?;
    let (stamp, author) = header.split_once(" - ")?;
    let at = LEGACY_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(stamp.trim(), format).ok())?;
    Some((at, author.trim().to_string(), rest.trim_start()))
}

fn push_legacy_entry(
    entries: &mut Vec<NoteEntry>,
    (header, lines): (Option<(NaiveDateTime, String)>, Vec<&str>),
) {
    let text = lines.join("\n").trim().to_string();
    if text.is_empty() && header.is_none() {
        return;
    }

    let (recorded_at, author) = match header {
        Some((at, author)) => (Some(at), author),
        None => (None, String::new()),
    };

    let attachments = [MULTIPLE_ATTACHMENT_PREFIX, SINGLE_ATTACHMENT_PREFIX]
        .iter()
        .find_map(|prefix| text.strip_prefix(prefix))
        .map(|files| {
            files
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

    let (kind, attachments) = match attachments {
        Some(files) if !files.is_empty() => (NoteKind::Attachment, files),
        _ => (NoteKind::Text, Vec::new()),
    };

    entries.push(NoteEntry {
        kind,
        text,
        attachments,
        recorded_at,
        author,
    });
}

impl Serialize for NoteHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredHistory {
    Structured(Vec<NoteEntry>),
    Legacy(String),
}

impl<'de> Deserialize<'de> for NoteHistory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = Option::<StoredHistory>::deserialize(deserializer)?;
        Ok(match stored {
            Some(StoredHistory::Structured(entries)) => Self { entries },
            Some(StoredHistory::Legacy(text)) => Self::from_legacy_text(&text),
            None => Self::default(),
        })
    }
}
