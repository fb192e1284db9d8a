use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use chrono::Local;
use csv::{Reader, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ValidationError};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How many entries the patient is shown after logging a mood
pub const RECENT_ENTRIES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoodColor {
    Green,
    Blue,
    Yellow,
    Orange,
    Red,
}

impl MoodColor {
    pub const ALL: [MoodColor; 5] = [
        MoodColor::Green,
        MoodColor::Blue,
        MoodColor::Yellow,
        MoodColor::Orange,
        MoodColor::Red,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(MoodColor::Green),
            2 => Some(MoodColor::Blue),
            3 => Some(MoodColor::Yellow),
            4 => Some(MoodColor::Orange),
            5 => Some(MoodColor::Red),
            _ => None,
        }
    }

    /// Parses the menu answer "1".."5"
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        input
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(MoodColor::from_code)
            .ok_or_else(|| ValidationError::InvalidMood(input.trim().to_string()))
    }

    pub fn code(&self) -> u8 {
        match self {
            MoodColor::Green => 1,
            MoodColor::Blue => 2,
            MoodColor::Yellow => 3,
            MoodColor::Orange => 4,
            MoodColor::Red => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MoodColor::Green => "Green - Very Good (Feeling great, energetic, positive)",
            MoodColor::Blue => "Blue - Good (Calm, content, peaceful)",
            MoodColor::Yellow => "Yellow - Neutral (OK, balanced)",
            MoodColor::Orange => "Orange - Not Great (Worried, uneasy)",
            MoodColor::Red => "Red - Poor (Distressed, anxious, depressed)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub username: String,
    pub timestamp: String,
    pub color_code: u8,
    pub comments: String,
}

impl MoodEntry {
    /// Entry stamped with the current local time
    pub fn new(username: &str, color: MoodColor, comments: &str) -> Self {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        MoodEntry::with_timestamp(username, &timestamp, color, comments)
    }

    pub fn with_timestamp(username: &str, timestamp: &str, color: MoodColor, comments: &str) -> Self {
        MoodEntry {
            username: username.to_string(),
            timestamp: timestamp.to_string(),
            color_code: color.code(),
            comments: comments.trim().to_string(),
        }
    }
}

/// Append-only mood history file
#[derive(Debug, Clone)]
pub struct MoodLog {
    path: PathBuf,
}

impl MoodLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MoodLog { path: path.into() }
    }

    pub fn record(&self, entry: &MoodEntry) -> Result<()> {
        let file_exists = self.path.exists() && fs::metadata(&self.path)?.len() > 0;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        let mut wtr = WriterBuilder::new().has_headers(!file_exists).from_writer(file);
        wtr.serialize(entry)?;
        wtr.flush()?;

        info!(user = %entry.username, color = entry.color_code, "mood recorded");
        Ok(())
    }

    /// The user's newest entries first, at most `limit` of them
    pub fn recent(&self, username: &str, limit: usize) -> Result<Vec<MoodEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = Reader::from_path(&self.path)?;
        let mut entries = Vec::new();
        for result in reader.deserialize() {
            let entry: MoodEntry = result?;
            if entry.username == username {
                entries.push(entry);
            }
        }

        // later lines win ties on the same second
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }
}
