// SPDX-License-Identifier: GPL-3.0-or-later

//! Deserialization of compilation database records.
//!
//! Records are validated only as far as their shape goes: a record
//! without a command is still read, and the adapter decides to skip it.

use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, Visitor};
use std::fmt;
use std::path::PathBuf;

/// One element of a `compile_commands.json` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub directory: Option<PathBuf>,
    pub file: String,
    pub command: Option<RecordCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordCommand {
    /// The `command` field, still to be tokenized.
    Line(String),
    /// The `arguments` field.
    Arguments(Vec<String>),
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_struct("Record", FIELDS, RecordVisitor)
    }
}

enum Field {
    Directory,
    File,
    Command,
    Arguments,
    Other,
}

const FIELDS: &[&str] = &["directory", "file", "command", "arguments"];

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D>(deserializer: D) -> Result<Field, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_identifier(FieldVisitor)
    }
}

struct FieldVisitor;

impl Visitor<'_> for FieldVisitor {
    type Value = Field;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "one of {FIELDS:?}")
    }

    fn visit_str<E>(self, value: &str) -> Result<Field, E>
    where
        E: de::Error,
    {
        Ok(match value {
            "directory" => Field::Directory,
            "file" => Field::File,
            "command" => Field::Command,
            "arguments" => Field::Arguments,
            // `output` and tool specific extensions
            _ => Field::Other,
        })
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("object Record")
    }

    fn visit_map<V>(self, mut map: V) -> Result<Record, V::Error>
    where
        V: MapAccess<'de>,
    {
        let mut directory: Option<PathBuf> = None;
        let mut file: Option<String> = None;
        let mut command: Option<String> = None;
        let mut arguments: Option<Vec<String>> = None;

        while let Some(key) = map.next_key()? {
            match key {
                Field::Directory => directory = Some(map.next_value()?),
                Field::File => file = Some(map.next_value()?),
                Field::Command => command = Some(map.next_value()?),
                Field::Arguments => arguments = Some(map.next_value()?),
                Field::Other => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        let file = file.ok_or_else(|| de::Error::missing_field("file"))?;
        let command = match (arguments, command) {
            (Some(arguments), _) => Some(RecordCommand::Arguments(arguments)),
            (None, Some(line)) => Some(RecordCommand::Line(line)),
            (None, None) => None,
        };
        Ok(Record { directory, file, command })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_record() {
        let content = r#"{
            "directory": "/home/user/project/build",
            "command": "g++ -I../include -c ../src/main.cpp",
            "file": "../src/main.cpp",
            "output": "main.o"
        }"#;

        let result: Record = serde_json::from_str(content).unwrap();

        assert_eq!(
            result,
            Record {
                directory: Some("/home/user/project/build".into()),
                file: "../src/main.cpp".into(),
                command: Some(RecordCommand::Line("g++ -I../include -c ../src/main.cpp".into())),
            }
        );
    }

    #[test]
    fn test_arguments_win_over_command() {
        let content = r#"{
            "file": "main.c",
            "command": "cc -DFROM_COMMAND main.c",
            "arguments": ["cc", "-DFROM_ARGUMENTS", "main.c"]
        }"#;

        let result: Record = serde_json::from_str(content).unwrap();

        assert_eq!(result.directory, None);
        assert_eq!(
            result.command,
            Some(RecordCommand::Arguments(vec!["cc".into(), "-DFROM_ARGUMENTS".into(), "main.c".into()]))
        );
    }

    #[test]
    fn test_record_without_command() {
        let result: Record = serde_json::from_str(r#"{"directory": "/tmp", "file": "main.c"}"#).unwrap();

        assert_eq!(result.command, None);
    }

    #[test]
    fn test_shape_errors() {
        assert!(serde_json::from_str::<Record>(r#"{"directory": "/tmp", "command": "cc main.c"}"#).is_err());
        assert!(serde_json::from_str::<Record>(r#"{"file": "main.c", "arguments": "cc main.c"}"#).is_err());
        assert!(serde_json::from_str::<Vec<Record>>(r#"{"file": "main.c"}"#).is_err());
    }
}
