//! Lesson content loading: markdown files with optional YAML frontmatter.
//!
//! Lessons live at `<content_dir>/<module>/<lesson>.md`. Loading splits the
//! frontmatter from the body and builds a heading outline for the table of
//! contents.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;

use crate::errors::PylearnError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Heading {
    pub id: String,
    pub text: String,
    pub level: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Lesson {
    pub frontmatter: Value,
    pub content: String,
    pub headings: Vec<Heading>,
}

#[derive(Debug, Clone)]
pub struct LessonStore {
    content_dir: PathBuf,
}

impl LessonStore {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// `Ok(None)` when the lesson does not exist or the identifiers are not plain names.
    pub async fn load(&self, module: &str, lesson: &str) -> Result<Option<Lesson>, PylearnError> {
        if !is_identifier(module) || !is_identifier(lesson) {
            log::debug!("Rejected lesson path {:?}/{:?}", module, lesson);
            return Ok(None);
        }

        let path = self.content_dir.join(module).join(format!("{}.md", lesson));
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PylearnError::ContentError(format!(
                    "Failed to read lesson {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        parse_lesson(&raw).map(Some)
    }
}

pub fn parse_lesson(raw: &str) -> Result<Lesson, PylearnError> {
    let (frontmatter, content) = split_frontmatter(raw)?;
    Ok(Lesson {
        frontmatter,
        headings: extract_headings(&content),
        content,
    })
}

fn split_frontmatter(raw: &str) -> Result<(Value, String), PylearnError> {
    let normalized = raw.replace("\r\n", "\n");
    let empty = Value::Object(Default::default());

    let Some(rest) = normalized.strip_prefix("---\n") else {
        return Ok((empty, normalized));
    };

    let (yaml, body) = if let Some(body) = rest.strip_prefix("---\n") {
        ("", body)
    } else if let Some(end) = rest.find("\n---\n") {
        (&rest[..end], &rest[end + "\n---\n".len()..])
    } else if let Some(yaml) = rest.strip_suffix("\n---") {
        (yaml, "")
    } else {
        // no closing fence: treat the whole file as body
        return Ok((empty, normalized));
    };

    let frontmatter = if yaml.trim().is_empty() {
        empty
    } else {
        let parsed: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| PylearnError::ContentError(format!("Invalid lesson frontmatter: {}", e)))?;
        serde_json::to_value(parsed)
            .map_err(|e| PylearnError::ContentError(format!("Unsupported lesson frontmatter: {}", e)))?
    };

    Ok((frontmatter, body.to_string()))
}

pub fn extract_headings(content: &str) -> Vec<Heading> {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    static PUNCTUATION: OnceLock<Regex> = OnceLock::new();
    static SLUG: OnceLock<Regex> = OnceLock::new();

    let heading = HEADING.get_or_init(|| Regex::new(r"(?m)^(#{1,3})[ \t]+(.+)$").expect("valid heading regex"));
    let punctuation = PUNCTUATION.get_or_init(|| Regex::new(r"[^A-Za-z0-9_\s]").expect("valid punctuation regex"));
    let slug = SLUG.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

    heading
        .captures_iter(content)
        .map(|cap| {
            let text = punctuation.replace_all(&cap[2], "").trim().to_string();
            let id = slug.replace_all(&text.to_lowercase(), "-").into_owned();
            Heading {
                id,
                text,
                level: cap[1].len(),
            }
        })
        .collect()
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
