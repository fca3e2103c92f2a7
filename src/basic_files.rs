//! File accessory devices: the registry contract the machine talks to, the
//! record codecs for the two record formats, and an in-memory device set.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use lazy_static::lazy_static;

use crate::basic_data::{parse_data_items, DataConstant};
use crate::basic_expressions::Value;
use crate::basic_format::format_str;
use crate::basic_functions::parse_numeric_text;
use crate::basic_types::BasicError;

/// I/O error codes reported as `I/O ERROR nn`.
pub const IO_BAD_DEVICE_NAME: u8 = 0;
pub const IO_BAD_OPEN_ATTRIBUTE: u8 = 2;
pub const IO_ILLEGAL_OPERATION: u8 = 3;
pub const IO_READ_PAST_END: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordFormat {
    Display,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Update,
    Input,
    Output,
    Append,
}

/// One attribute of an OPEN statement, kept in source order for listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOption {
    Display,
    Internal,
    Sequential,
    Relative(Option<u32>),
    Fixed(Option<u32>),
    Variable(Option<u32>),
    Mode(OpenMode),
    Permanent,
}

impl fmt::Display for FileOption {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let with_length = |f: &mut fmt::Formatter, word: &str, length: &Option<u32>| match length {
            Some(length) => write!(f, "{} {}", word, length),
            None => write!(f, "{}", word),
        };
        match self {
            FileOption::Display => write!(f, "DISPLAY"),
            FileOption::Internal => write!(f, "INTERNAL"),
            FileOption::Sequential => write!(f, "SEQUENTIAL"),
            FileOption::Relative(n) => with_length(f, "RELATIVE", n),
            FileOption::Fixed(n) => with_length(f, "FIXED", n),
            FileOption::Variable(n) => with_length(f, "VARIABLE", n),
            FileOption::Mode(OpenMode::Update) => write!(f, "UPDATE"),
            FileOption::Mode(OpenMode::Input) => write!(f, "INPUT"),
            FileOption::Mode(OpenMode::Output) => write!(f, "OUTPUT"),
            FileOption::Mode(OpenMode::Append) => write!(f, "APPEND"),
            FileOption::Permanent => write!(f, "PERMANENT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpenOptions {
    pub options: Vec<FileOption>,
}

impl OpenOptions {
    /// DISPLAY unless INTERNAL was given.
    pub fn format(&self) -> RecordFormat {
        self.options
            .iter()
            .rev()
            .find_map(|o| match o {
                FileOption::Display => Some(RecordFormat::Display),
                FileOption::Internal => Some(RecordFormat::Internal),
                _ => None,
            })
            .unwrap_or(RecordFormat::Display)
    }

    /// UPDATE unless another mode was given.
    pub fn mode(&self) -> OpenMode {
        self.options
            .iter()
            .rev()
            .find_map(|o| match o {
                FileOption::Mode(mode) => Some(*mode),
                _ => None,
            })
            .unwrap_or(OpenMode::Update)
    }

    /// Rejects contradictory attribute lists such as DISPLAY with INTERNAL.
    pub fn validate(&self) -> Result<(), BasicError> {
        let count = |pred: fn(&FileOption) -> bool| self.options.iter().filter(|o| pred(o)).count();
        let formats = count(|o| matches!(o, FileOption::Display | FileOption::Internal));
        let organizations = count(|o| matches!(o, FileOption::Sequential | FileOption::Relative(_)));
        let record_types = count(|o| matches!(o, FileOption::Fixed(_) | FileOption::Variable(_)));
        let modes = count(|o| matches!(o, FileOption::Mode(_)));
        if formats > 1 || organizations > 1 || record_types > 1 || modes > 1 {
            return Err(BasicError::IncorrectStatement);
        }
        Ok(())
    }
}

impl fmt::Display for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for option in &self.options {
            write!(f, ",{}", option)?;
        }
        Ok(())
    }
}

/// Turns one PRINT # item list into a record and back.
pub trait RecordCodec: Send + Sync {
    fn encode(&self, fields: &[Value]) -> Result<Vec<u8>, BasicError>;
    fn decode(&self, record: &[u8]) -> Result<Vec<DataConstant>, BasicError>;
}

/// Text records: fields rendered as printed and joined by commas.
struct DisplayCodec;

impl RecordCodec for DisplayCodec {
    fn encode(&self, fields: &[Value]) -> Result<Vec<u8>, BasicError> {
        let text = fields
            .iter()
            .map(|field| match field {
                Value::Number(n) => format_str(*n),
                Value::Text(s) if s.contains(',') || s.contains('"') => {
                    format!("\"{}\"", s.replace('"', "\"\""))
                }
                Value::Text(s) => s.clone(),
            })
            .collect::<Vec<_>>()
            .join(",");
        Ok(text.into_bytes())
    }

    fn decode(&self, record: &[u8]) -> Result<Vec<DataConstant>, BasicError> {
        let text = String::from_utf8(record.to_vec()).map_err(|_| BasicError::FileError)?;
        parse_data_items(&text).map_err(|_| BasicError::FileError)
    }
}

/// Binary records: every field is a length byte followed by its text.
/// Numbers are stored in their STR$ form.
struct InternalCodec;

impl RecordCodec for InternalCodec {
    fn encode(&self, fields: &[Value]) -> Result<Vec<u8>, BasicError> {
        let mut record = Vec::new();
        for field in fields {
            let text = match field {
                Value::Number(n) => format_str(*n),
                Value::Text(s) => s.clone(),
            };
            let bytes = text.as_bytes();
            let length = u8::try_from(bytes.len()).map_err(|_| BasicError::FileError)?;
            record.push(length);
            record.extend_from_slice(bytes);
        }
        Ok(record)
    }

    fn decode(&self, record: &[u8]) -> Result<Vec<DataConstant>, BasicError> {
        let mut fields = Vec::new();
        let mut position = 0;
        while position < record.len() {
            let length = record[position] as usize;
            let end = position + 1 + length;
            let bytes = record.get(position + 1..end).ok_or(BasicError::FileError)?;
            let text = String::from_utf8(bytes.to_vec()).map_err(|_| BasicError::FileError)?;
            fields.push(match parse_numeric_text(&text) {
                Some(value) => DataConstant::Number { value, text },
                None => DataConstant::Quoted(text),
            });
            position = end;
        }
        Ok(fields)
    }
}

lazy_static! {
    static ref RECORD_CODECS: HashMap<RecordFormat, Box<dyn RecordCodec>> = {
        let mut m: HashMap<RecordFormat, Box<dyn RecordCodec>> = HashMap::new();
        m.insert(RecordFormat::Display, Box::new(DisplayCodec));
        m.insert(RecordFormat::Internal, Box::new(InternalCodec));
        m
    };
}

pub fn codec_for(format: RecordFormat) -> &'static dyn RecordCodec {
    match RECORD_CODECS.get(&format) {
        Some(codec) => codec.as_ref(),
        None => &DisplayCodec,
    }
}

/// An open file on some device.
pub trait FileHandle {
    /// Next record, or `None` at end of file.
    fn read_record(&mut self) -> Result<Option<Vec<u8>>, BasicError>;
    fn write_record(&mut self, record: &[u8]) -> Result<(), BasicError>;
    fn close(&mut self, delete: bool) -> Result<(), BasicError>;
}

/// The set of devices reachable by OPEN and DELETE.
pub trait FileRegistry {
    fn open(&mut self, name: &str, options: &OpenOptions) -> Result<Box<dyn FileHandle>, BasicError>;
    fn delete(&mut self, name: &str) -> Result<(), BasicError>;
}

type Volume = Rc<RefCell<HashMap<String, Vec<Vec<u8>>>>>;

/// Files kept in memory for the lifetime of the registry.
#[derive(Debug, Default, Clone)]
pub struct MemoryDevices {
    files: Volume,
}

impl MemoryDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self, name: &str) -> Option<Vec<Vec<u8>>> {
        self.files.borrow().get(name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.files.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

impl FileRegistry for MemoryDevices {
    fn open(&mut self, name: &str, options: &OpenOptions) -> Result<Box<dyn FileHandle>, BasicError> {
        if name.trim().is_empty() {
            return Err(BasicError::IoError(IO_BAD_DEVICE_NAME));
        }
        options.validate()?;
        let mode = options.mode();
        let mut files = self.files.borrow_mut();
        let cursor = match mode {
            OpenMode::Input => {
                if !files.contains_key(name) {
                    return Err(BasicError::IoError(IO_BAD_OPEN_ATTRIBUTE));
                }
                0
            }
            OpenMode::Output => {
                files.insert(name.to_string(), Vec::new());
                0
            }
            OpenMode::Update => {
                files.entry(name.to_string()).or_default();
                0
            }
            OpenMode::Append => files.entry(name.to_string()).or_default().len(),
        };
        tracing::debug!(file = name, ?mode, "opened memory file");
        Ok(Box::new(MemoryHandle {
            name: name.to_string(),
            files: Rc::clone(&self.files),
            cursor,
            mode,
        }))
    }

    fn delete(&mut self, name: &str) -> Result<(), BasicError> {
        match self.files.borrow_mut().remove(name) {
            Some(_) => Ok(()),
            None => Err(BasicError::IoError(IO_BAD_OPEN_ATTRIBUTE)),
        }
    }
}

struct MemoryHandle {
    name: String,
    files: Volume,
    cursor: usize,
    mode: OpenMode,
}

impl FileHandle for MemoryHandle {
    fn read_record(&mut self) -> Result<Option<Vec<u8>>, BasicError> {
        if matches!(self.mode, OpenMode::Output | OpenMode::Append) {
            return Err(BasicError::IoError(IO_ILLEGAL_OPERATION));
        }
        let files = self.files.borrow();
        let records = files.get(&self.name).ok_or(BasicError::FileError)?;
        let record = records.get(self.cursor).cloned();
        if record.is_some() {
            self.cursor += 1;
        }
        Ok(record)
    }

    fn write_record(&mut self, record: &[u8]) -> Result<(), BasicError> {
        if self.mode == OpenMode::Input {
            return Err(BasicError::IoError(IO_ILLEGAL_OPERATION));
        }
        let mut files = self.files.borrow_mut();
        let records = files.entry(self.name.clone()).or_default();
        if self.cursor < records.len() {
            records[self.cursor] = record.to_vec();
        } else {
            records.push(record.to_vec());
        }
        self.cursor += 1;
        Ok(())
    }

    fn close(&mut self, delete: bool) -> Result<(), BasicError> {
        if delete {
            self.files.borrow_mut().remove(&self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn options(list: &[FileOption]) -> OpenOptions {
        OpenOptions { options: list.to_vec() }
    }

    #[test]
    fn test_defaults_and_listing() {
        let opts = options(&[FileOption::Internal, FileOption::Mode(OpenMode::Output), FileOption::Fixed(Some(64))]);
        assert_eq!(opts.format(), RecordFormat::Internal);
        assert_eq!(opts.mode(), OpenMode::Output);
        assert_eq!(opts.to_string(), ",INTERNAL,OUTPUT,FIXED 64");

        let defaults = OpenOptions::default();
        assert_eq!(defaults.format(), RecordFormat::Display);
        assert_eq!(defaults.mode(), OpenMode::Update);
    }

    #[test]
    fn test_conflicting_options() {
        let opts = options(&[FileOption::Display, FileOption::Internal]);
        assert_eq!(opts.validate(), Err(BasicError::IncorrectStatement));
    }

    #[test]
    fn test_display_codec() {
        let codec = codec_for(RecordFormat::Display);
        let record = codec
            .encode(&[Value::Number(12.0), Value::Text("A,B".to_string()), Value::Text("C".to_string())])
            .unwrap();
        assert_eq!(String::from_utf8(record.clone()).unwrap(), "12,\"A,B\",C");
        assert_eq!(codec.decode(&record).unwrap(), vec![
            DataConstant::Number { value: 12.0, text: "12".to_string() },
            DataConstant::Quoted("A,B".to_string()),
            DataConstant::Bare("C".to_string()),
        ]);
    }

    #[test]
    fn test_internal_codec() {
        let codec = codec_for(RecordFormat::Internal);
        let record = codec.encode(&[Value::Text("HI, THERE".to_string()), Value::Number(-0.5)]).unwrap();
        assert_eq!(record[0], 9);
        assert_eq!(codec.decode(&record).unwrap(), vec![
            DataConstant::Quoted("HI, THERE".to_string()),
            DataConstant::Number { value: -0.5, text: "-.5".to_string() },
        ]);
        assert_eq!(codec.decode(&[5, b'A']), Err(BasicError::FileError));
    }

    #[test]
    fn test_memory_round_trip() {
        let mut devices = MemoryDevices::new();
        let mut out = devices.open("DSK1.DATA", &options(&[FileOption::Mode(OpenMode::Output)])).unwrap();
        out.write_record(b"ONE").unwrap();
        out.write_record(b"TWO").unwrap();
        assert_eq!(out.read_record(), Err(BasicError::IoError(IO_ILLEGAL_OPERATION)));
        out.close(false).unwrap();

        let mut input = devices.open("DSK1.DATA", &options(&[FileOption::Mode(OpenMode::Input)])).unwrap();
        assert_eq!(input.read_record().unwrap(), Some(b"ONE".to_vec()));
        assert_eq!(input.read_record().unwrap(), Some(b"TWO".to_vec()));
        assert_eq!(input.read_record().unwrap(), None);
        input.close(true).unwrap();
        assert_eq!(devices.records("DSK1.DATA"), None);
    }

    #[test]
    fn test_missing_files() {
        let mut devices = MemoryDevices::new();
        let result = devices.open("DSK1.NONE", &options(&[FileOption::Mode(OpenMode::Input)]));
        assert!(matches!(result, Err(BasicError::IoError(IO_BAD_OPEN_ATTRIBUTE))));
        assert_eq!(devices.delete("DSK1.NONE"), Err(BasicError::IoError(IO_BAD_OPEN_ATTRIBUTE)));
    }
}
