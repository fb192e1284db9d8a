//! Profile collaborator: lookup, single-field edits and deletion over `users.csv`.

use std::path::PathBuf;

use csv::{Reader, StringRecord, WriterBuilder};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{BookingError, Result, ValidationError};
use crate::storage::csv_files::replace_file;

pub const USERNAME_FIELD: &str = "username";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub username: String,
    /// Every other column of the users file, in header order
    pub fields: Vec<(String, String)>,
}

#[cfg(test)]
impl User {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub trait UserDirectory {
    fn get_user(&self, username: &str) -> Result<Option<User>>;

    /// False when the user or the field does not exist, or a rename collides
    fn update_user_field(&mut self, username: &str, field: &str, value: &str) -> Result<bool>;

    fn delete_user(&mut self, username: &str) -> Result<()>;
}

/// Email columns get a shape check before they are written
fn check_value(field: &str, value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::InvalidField(format!("{} cannot be empty", field)));
    }
    if field.contains("email") {
        let valid = match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid {
            return Err(ValidationError::InvalidField(format!("'{}' is not an email address", value)));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CsvUserDirectory {
    path: PathBuf,
}

impl CsvUserDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvUserDirectory { path: path.into() }
    }

    fn read_all(&self) -> Result<(StringRecord, Vec<StringRecord>)> {
        if !self.path.exists() {
            return Err(BookingError::FileNotFound {
                path: self.path.clone(),
            });
        }
        let mut reader = Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let mut records = Vec::new();
        for result in reader.records() {
            records.push(result?);
        }
        Ok((headers, records))
    }

    fn write_all(&self, headers: &StringRecord, records: &[StringRecord]) -> Result<()> {
        replace_file(&self.path, |file| {
            let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
            wtr.write_record(headers)?;
            for record in records {
                wtr.write_record(record)?;
            }
            wtr.flush()?;
            Ok(())
        })
    }

    fn username_column(&self, headers: &StringRecord) -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim() == USERNAME_FIELD)
            .ok_or_else(|| BookingError::format(&self.path, "missing username column"))
    }
}

impl UserDirectory for CsvUserDirectory {
    fn get_user(&self, username: &str) -> Result<Option<User>> {
        let (headers, records) = self.read_all()?;
        let name_col = self.username_column(&headers)?;

        Ok(records
            .iter()
            .find(|record| record.get(name_col).map(str::trim) == Some(username))
            .map(|record| User {
                username: username.to_string(),
                fields: headers
                    .iter()
                    .enumerate()
                    .filter(|(idx, _)| *idx != name_col)
                    .map(|(idx, name)| (name.trim().to_string(), record.get(idx).unwrap_or("").to_string()))
                    .collect(),
            }))
    }

    fn update_user_field(&mut self, username: &str, field: &str, value: &str) -> Result<bool> {
        check_value(field, value)?;
        let (headers, mut records) = self.read_all()?;
        let name_col = self.username_column(&headers)?;

        let Some(field_col) = headers.iter().position(|h| h.trim() == field) else {
            warn!(field, "unknown user field");
            return Ok(false);
        };
        if field_col == name_col && records.iter().any(|r| r.get(name_col).map(str::trim) == Some(value.trim())) {
            warn!(username = value.trim(), "username already taken");
            return Ok(false);
        }
        let Some(position) = records
            .iter()
            .position(|record| record.get(name_col).map(str::trim) == Some(username))
        else {
            return Ok(false);
        };

        let updated: StringRecord = records[position]
            .iter()
            .enumerate()
            .map(|(idx, cell)| if idx == field_col { value.trim() } else { cell })
            .collect();
        records[position] = updated;
        self.write_all(&headers, &records)?;

        info!(username, field, "user profile updated");
        Ok(true)
    }

    fn delete_user(&mut self, username: &str) -> Result<()> {
        let (headers, records) = self.read_all()?;
        let name_col = self.username_column(&headers)?;

        let before = records.len();
        let kept: Vec<StringRecord> = records
            .into_iter()
            .filter(|record| record.get(name_col).map(str::trim) != Some(username))
            .collect();
        if kept.len() == before {
            warn!(username, "delete requested for unknown user");
            return Ok(());
        }
        self.write_all(&headers, &kept)?;
        info!(username, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn directory() -> (TempDir, CsvUserDirectory) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.csv");
        fs::write(
            &path,
            "username,password,email,emergency_email,role\n\
             alice,pw1,alice@example.com,mum@example.com,patient\n\
             bob,pw2,bob@example.com,dad@example.com,patient\n",
        )
        .unwrap();
        (dir, CsvUserDirectory::new(path))
    }

    #[test]
    fn lookup_returns_all_fields() {
        let (_dir, users) = directory();
        let alice = users.get_user("alice").unwrap().unwrap();
        assert_eq!(alice.field("email"), Some("alice@example.com"));
        assert_eq!(alice.field("role"), Some("patient"));
        assert_eq!(users.get_user("carol").unwrap(), None);
    }

    #[test]
    fn field_update_is_persisted() {
        let (_dir, mut users) = directory();
        assert!(users.update_user_field("alice", "email", "new@example.org").unwrap());
        assert_eq!(
            users.get_user("alice").unwrap().unwrap().field("email"),
            Some("new@example.org")
        );
        // bob untouched
        assert_eq!(users.get_user("bob").unwrap().unwrap().field("email"), Some("bob@example.com"));
    }

    #[test]
    fn rejected_updates() {
        let (_dir, mut users) = directory();
        assert!(!users.update_user_field("carol", "email", "c@example.com").unwrap());
        assert!(!users.update_user_field("alice", "shoe_size", "42").unwrap());
        assert!(!users.update_user_field("alice", "username", "bob").unwrap());
        assert!(matches!(
            users.update_user_field("alice", "emergency_email", "not-an-email"),
            Err(BookingError::Validation(_))
        ));
    }

    #[test]
    fn rename_and_delete() {
        let (_dir, mut users) = directory();
        assert!(users.update_user_field("alice", "username", "alicia").unwrap());
        assert!(users.get_user("alice").unwrap().is_none());
        assert!(users.get_user("alicia").unwrap().is_some());

        users.delete_user("alicia").unwrap();
        assert!(users.get_user("alicia").unwrap().is_none());
        assert!(users.get_user("bob").unwrap().is_some());
    }
}
