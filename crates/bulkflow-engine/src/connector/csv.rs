//! Delimited-text connector for files, directories, and standard
//! streams.
//!
//! Each file is one resource; positions are 1-based data-line numbers
//! (the header line is not counted). Lines that do not match the header
//! arity are emitted as error records carrying the raw line, so the
//! pipeline's connector error gate can account for them.

use crate::config::CsvConnectorConfig;
use crate::connector::{Connector, ConnectorFeature, RecordMetadata, ResourceRead};
use anyhow::{anyhow, bail, Context, Result};
use bulkflow_types::{DataRecord, Field, FieldValue, Record, ResourceUri};
use std::fs::File;
use std::io::{self, BufRead, BufReader, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct CsvConnector {
    config: CsvConnectorConfig,
    resources: Vec<PathBuf>,
    stdio: bool,
    writer: Option<Box<dyn Write + Send>>,
    header_written: bool,
}

impl CsvConnector {
    #[must_use]
    pub fn new(config: CsvConnectorConfig) -> Self {
        Self {
            config,
            resources: Vec::new(),
            stdio: false,
            writer: None,
            header_written: false,
        }
    }

    fn open_writer(&mut self) -> Result<&mut (dyn Write + Send)> {
        if self.writer.is_none() {
            let writer: Box<dyn Write + Send> = if self.stdio {
                Box::new(io::stdout())
            } else {
                let file = File::create(&self.config.url).with_context(|| {
                    format!("Failed to create output file {}", self.config.url)
                })?;
                Box::new(LineWriter::new(file))
            };
            self.writer = Some(writer);
        }
        Ok(self.writer.as_mut().expect("writer just opened").as_mut())
    }

    fn render_value(value: &FieldValue) -> String {
        match value {
            FieldValue::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl Connector for CsvConnector {
    fn init(&mut self) -> Result<()> {
        if self.config.url.trim().is_empty() {
            bail!("connector.csv.url is not set");
        }
        if self.config.url == "-" {
            self.stdio = true;
            return Ok(());
        }
        let path = Path::new(&self.config.url);
        if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to list {}", path.display()))?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.is_file())
                .collect();
            files.sort();
            self.resources = files;
        } else if path.is_file() {
            self.resources = vec![path.to_path_buf()];
        }
        // A missing path is legal on the unload direction; the output
        // file is created on first write.
        Ok(())
    }

    fn read(&mut self) -> Result<Box<dyn Iterator<Item = Record> + Send>> {
        let by_resource = self.read_by_resource()?;
        Ok(Box::new(by_resource.flat_map(|r| r.records)))
    }

    fn read_by_resource(&mut self) -> Result<Box<dyn Iterator<Item = ResourceRead> + Send>> {
        let delimiter = self.config.delimiter;
        let header = self.config.header;
        if self.stdio {
            let resource = ResourceUri::new("std:/");
            let reader: Box<dyn BufRead + Send> = Box::new(BufReader::new(io::stdin()));
            let records = LineRecords::from_reader(resource.clone(), reader, delimiter, header);
            return Ok(Box::new(std::iter::once(ResourceRead {
                resource,
                records: Box::new(records),
            })));
        }
        if self.resources.is_empty() {
            bail!("No input files found at {}", self.config.url);
        }
        let paths = self.resources.clone();
        Ok(Box::new(paths.into_iter().map(move |path| {
            let resource = ResourceUri::new(format!("file://{}", path.display()));
            let records: Box<dyn Iterator<Item = Record> + Send> =
                match File::open(&path) {
                    Ok(file) => {
                        let reader: Box<dyn BufRead + Send> = Box::new(BufReader::new(file));
                        Box::new(LineRecords::from_reader(
                            resource.clone(),
                            reader,
                            delimiter,
                            header,
                        ))
                    }
                    Err(e) => Box::new(std::iter::once(Record::error(
                        resource.clone(),
                        1,
                        None,
                        anyhow!("Failed to open {}: {e}", path.display()),
                    ))),
                };
            ResourceRead { resource, records }
        })))
    }

    fn estimated_resource_count(&self) -> usize {
        if self.stdio {
            1
        } else {
            self.resources.len()
        }
    }

    fn supports(&self, feature: ConnectorFeature) -> bool {
        match feature {
            ConnectorFeature::IndexedRecords => true,
            ConnectorFeature::MappedRecords => self.config.header,
        }
    }

    fn record_metadata(&self) -> RecordMetadata {
        RecordMetadata::default()
    }

    fn write(&mut self, records: &[DataRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let delimiter = self.config.delimiter;
        let header = self.config.header;
        let header_pending = header && !self.header_written;
        let writer = self.open_writer()?;
        if header_pending {
            let names: Vec<&str> = records[0].fields.iter().map(|f| f.name.as_str()).collect();
            writeln!(writer, "{}", names.join(&delimiter.to_string()))?;
        }
        for record in records {
            let values: Vec<String> = record
                .fields
                .iter()
                .map(|f| Self::render_value(&f.value))
                .collect();
            writeln!(writer, "{}", values.join(&delimiter.to_string()))?;
        }
        if header_pending {
            self.header_written = true;
        }
        Ok(records.len() as u64)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().context("Failed to flush connector output")?;
        }
        Ok(())
    }
}

/// Lazy, position-ordered record iterator over one resource.
struct LineRecords {
    resource: ResourceUri,
    lines: io::Lines<Box<dyn BufRead + Send>>,
    field_names: Option<Arc<Vec<String>>>,
    delimiter: char,
    position: u64,
    done: bool,
}

impl LineRecords {
    fn from_reader(
        resource: ResourceUri,
        reader: Box<dyn BufRead + Send>,
        delimiter: char,
        header: bool,
    ) -> Self {
        let mut lines = reader.lines();
        let field_names = if header {
            match lines.next() {
                Some(Ok(line)) => Some(Arc::new(
                    line.split(delimiter)
                        .map(|s| s.trim().to_string())
                        .collect::<Vec<_>>(),
                )),
                _ => Some(Arc::new(Vec::new())),
            }
        } else {
            None
        };
        Self {
            resource,
            lines,
            field_names,
            delimiter,
            position: 0,
            done: false,
        }
    }
}

impl Iterator for LineRecords {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.done {
            return None;
        }
        let line = self.lines.next()?;
        self.position += 1;
        match line {
            Ok(line) => {
                let values: Vec<&str> = line.split(self.delimiter).collect();
                if let Some(names) = &self.field_names {
                    if values.len() != names.len() {
                        return Some(Record::error(
                            self.resource.clone(),
                            self.position,
                            Some(line.clone()),
                            anyhow!(
                                "Expected {} fields but found {}",
                                names.len(),
                                values.len()
                            ),
                        ));
                    }
                    let fields = names
                        .iter()
                        .zip(&values)
                        .map(|(name, value)| Field {
                            name: name.clone(),
                            value: FieldValue::Text((*value).to_string()),
                        })
                        .collect();
                    Some(Record::data(
                        self.resource.clone(),
                        self.position,
                        Some(line),
                        fields,
                    ))
                } else {
                    let fields = values
                        .iter()
                        .enumerate()
                        .map(|(index, value)| Field {
                            name: index.to_string(),
                            value: FieldValue::Text((*value).to_string()),
                        })
                        .collect();
                    Some(Record::data(
                        self.resource.clone(),
                        self.position,
                        Some(line),
                        fields,
                    ))
                }
            }
            Err(e) => {
                // The stream is unreliable past an I/O error; surface it
                // once and stop.
                self.done = true;
                Some(Record::error(
                    self.resource.clone(),
                    self.position,
                    None,
                    anyhow!("I/O error reading resource: {e}"),
                ))
            }
        }
    }
}
