// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::frame::column::ColumnBuilder;
use crate::frame::common::{DatasetId, DatasetMetadata, FrameError, Result};
use crate::frame::dataframe::DataFrame;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const MAX_FIELDS: usize = 10000;

#[derive(Debug)]
pub struct CsvReader {
    has_headers: bool,
    delimiter: u8,
    quote_char: u8,
}

impl CsvReader {
    pub fn new() -> Self {
        Self {
            has_headers: true,
            delimiter: b',',
            quote_char: b'"',
        }
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn read_file(&self, path: &Path, dataset_name: String) -> Result<DataFrame> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut first_line = String::new();
        reader.read_line(&mut first_line)?;
        let first_fields = self.parse_line(first_line.trim_end_matches(['\r', '\n']))?;
        let headers: Vec<String> = if self.has_headers {
            first_fields.clone()
        } else {
            (0..first_fields.len())
                .map(|i| format!("column_{i}"))
                .collect()
        };

        let mut column_builders: HashMap<String, ColumnBuilder> = headers
            .iter()
            .map(|name| (name.clone(), ColumnBuilder::new()))
            .collect();
        let mut row_count = 0;
        if !self.has_headers {
            self.push_row(&first_fields, &headers, &mut column_builders)?;
            row_count += 1;
        }

        let mut buffer = String::new();
        while reader.read_line(&mut buffer)? > 0 {
            let line = buffer.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                buffer.clear();
                continue;
            }
            let fields = self.parse_line(line).map_err(|e| {
                FrameError::CsvParse(format!("Line {}: {}", row_count + 2, e))
            })?;
            if fields.len() > headers.len() {
                return Err(FrameError::CsvParse(format!(
                    "Line {}: Expected {} fields, got {}",
                    row_count + 2,
                    headers.len(),
                    fields.len()
                )));
            }
            self.push_row(&fields, &headers, &mut column_builders)?;
            row_count += 1;
            buffer.clear();
        }

        let metadata = DatasetMetadata {
            id: DatasetId::new(),
            name: dataset_name,
            row_count,
            column_count: headers.len(),
            created_at: chrono::Utc::now(),
            source_path: Some(path.to_path_buf()),
        };
        let mut dataframe = DataFrame::new(metadata);
        for header in headers {
            let column = column_builders
                .remove(&header)
                .ok_or_else(|| FrameError::CsvParse(format!("Duplicate header '{header}'")))?
                .build()?;
            dataframe.add_column(header, column)?;
        }
        Ok(dataframe)
    }

    fn push_row(
        &self,
        fields: &[String],
        headers: &[String],
        column_builders: &mut HashMap<String, ColumnBuilder>,
    ) -> Result<()> {
        for (i, header) in headers.iter().enumerate() {
            let value = fields
                .get(i)
                .filter(|field| !field.trim().is_empty())
                .cloned();
            if let Some(builder) = column_builders.get_mut(header) {
                builder.push(value);
            }
        }
        Ok(())
    }

    fn parse_line(&self, line: &str) -> Result<Vec<String>> {
        let mut fields = Vec::new();
        let mut current_field = String::new();
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                ch if ch as u32 == self.quote_char as u32 => {
                    if in_quotes && chars.peek() == Some(&(self.quote_char as char)) {
                        current_field.push(self.quote_char as char);
                        chars.next();
                    } else {
                        in_quotes = !in_quotes;
                    }
                }
                ch if ch as u32 == self.delimiter as u32 && !in_quotes => {
                    fields.push(current_field.trim().to_string());
                    current_field.clear();
                    if fields.len() >= MAX_FIELDS {
                        return Err(FrameError::CsvParse(format!(
                            "Field count exceeds limit {MAX_FIELDS}"
                        )));
                    }
                }
                ch => current_field.push(ch),
            }
        }
        fields.push(current_field.trim().to_string());
        Ok(fields)
    }
}

impl Default for CsvReader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct CsvWriter {
    delimiter: u8,
    quote_char: u8,
}

impl CsvWriter {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            quote_char: b'"',
        }
    }

    pub fn write_file(&self, dataframe: &DataFrame, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let delimiter = (self.delimiter as char).to_string();
        let header_line = dataframe
            .column_names()
            .iter()
            .map(|name| self.escape_field(name))
            .collect::<Vec<_>>()
            .join(&delimiter);
        writeln!(writer, "{header_line}")?;
        for i in 0..dataframe.row_count() {
            let row: Vec<String> = dataframe
                .row_values(i)
                .into_iter()
                .map(|value| self.escape_field(&value.unwrap_or_default()))
                .collect();
            writeln!(writer, "{}", row.join(&delimiter))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn escape_field(&self, value: &str) -> String {
        let delimiter_char = self.delimiter as char;
        let quote_char = self.quote_char as char;
        if value.contains(delimiter_char)
            || value.contains(quote_char)
            || value.contains('\n')
            || value.contains('\r')
        {
            let escaped = value.replace(quote_char, &format!("{quote_char}{quote_char}"));
            format!("{quote_char}{escaped}{quote_char}")
        } else {
            value.to_string()
        }
    }
}

impl Default for CsvWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::common::DataType;

    #[test]
    fn read_file_infers_types_and_counts_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(
            &path,
            "Division,Count,Description\nPlant A,3,Wet floor\nPlant B,5,\"Cable, loose\"\n",
        )
        .unwrap();
        let df = CsvReader::new()
            .read_file(&path, "data".to_string())
            .unwrap();
        assert_eq!(df.row_count(), 2);
        assert_eq!(df.column_names(), ["Division", "Count", "Description"]);
        assert_eq!(df.get_column("Count").unwrap().data_type(), DataType::Int64);
        assert_eq!(
            df.get_column("Description").unwrap().get_string(1).as_deref(),
            Some("Cable, loose")
        );
    }

    #[test]
    fn write_then_read_round_trips_quoted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "Name,Note\nAda,\"says \"\"hi\"\"\"\n").unwrap();
        let df = CsvReader::new()
            .read_file(&path, "data".to_string())
            .unwrap();
        let out = dir.path().join("out.csv");
        CsvWriter::new().write_file(&df, &out).unwrap();
        let again = CsvReader::new().read_file(&out, "out".to_string()).unwrap();
        assert_eq!(
            again.get_column("Note").unwrap().get_string(0).as_deref(),
            Some("says \"hi\"")
        );
    }

    #[test]
    fn headerless_input_gets_generated_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,1\nb,2\n").unwrap();
        let df = CsvReader::new()
            .with_headers(false)
            .read_file(&path, "data".to_string())
            .unwrap();
        assert_eq!(df.column_names(), ["column_0", "column_1"]);
        assert_eq!(df.row_count(), 2);
    }
}
