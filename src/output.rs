//! Output sink shared by the CLI subcommands.
//!
//! Results render as a human readable table by default, or as JSONL/CSV for
//! further processing.

use std::path::PathBuf;

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Format {
    Table,
    Jsonl,
    Csv,
}

#[derive(clap::Parser)]
#[group(id = "output::Args")]
pub struct Args {
    /// Write the output to this file instead of the terminal.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    #[arg(long, short = 'f', value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open the specified output file at {1:?}")]
    OpenOutputFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the output file at {1:?}")]
    WriteFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the terminal")]
    WriteStdout(#[source] std::io::Error),
    #[error("could not serialize a record to JSON")]
    SerializeJson(#[source] serde_json::Error),
}

impl Args {
    pub fn to_output(self) -> Result<Output, Error> {
        let io: Box<dyn std::io::Write> = match &self.output {
            None => Box::new(std::io::stdout().lock()),
            Some(path) => Box::new(
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| Error::OpenOutputFile(e, path.clone()))?,
            ),
        };
        let formatter = match &self.format {
            Format::Table => {
                let mut comfy = comfy_table::Table::new();
                comfy.set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
                Formatter::Table { comfy }
            }
            Format::Jsonl => Formatter::Jsonl,
            Format::Csv => Formatter::Csv,
        };
        Ok(Output { args: self, io, formatter })
    }
}

pub struct Output {
    args: Args,
    io: Box<dyn std::io::Write>,
    formatter: Formatter,
}

enum Formatter {
    Table { comfy: comfy_table::Table },
    Jsonl,
    Csv,
}

impl Output {
    /// Column names. Must be supplied before the first record.
    pub fn headers(&mut self, names: &[&'static str]) -> Result<(), Error> {
        match &mut self.formatter {
            Formatter::Table { comfy } => {
                comfy.set_header(names.to_vec());
                Ok(())
            }
            Formatter::Jsonl => Ok(()),
            Formatter::Csv => {
                let cells = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
                self.csv_record(&cells)
            }
        }
    }

    /// One result. `cells` feeds the table and CSV renderings, the
    /// serializable `record` feeds JSONL.
    pub fn record<R: serde::Serialize>(
        &mut self,
        cells: Vec<String>,
        record: &R,
    ) -> Result<(), Error> {
        match &mut self.formatter {
            Formatter::Table { comfy } => {
                comfy.add_row(cells);
                Ok(())
            }
            Formatter::Jsonl => {
                serde_json::to_writer(&mut self.io, record).map_err(Error::SerializeJson)?;
                writeln!(self.io).map_err(|e| self.write_error(e))
            }
            Formatter::Csv => self.csv_record(&cells),
        }
    }

    fn csv_record(&mut self, cells: &[String]) -> Result<(), Error> {
        let longest = cells.iter().map(|cell| cell.len()).max().unwrap_or(0);
        // Every byte of a field can at worst expand to two quoted bytes.
        let mut scratch = vec![0; 2 + 2 * longest];
        let mut writer = csv_core::Writer::new();
        for cell in cells {
            let (result, read, written) = writer.field(cell.as_bytes(), &mut scratch);
            assert_eq!(result, csv_core::WriteResult::InputEmpty);
            assert_eq!(read, cell.len());
            self.io.write_all(&scratch[..written]).map_err(|e| self.write_error(e))?;
            let (result, written) = writer.delimiter(&mut scratch);
            assert_eq!(result, csv_core::WriteResult::InputEmpty);
            self.io.write_all(&scratch[..written]).map_err(|e| self.write_error(e))?;
        }
        let (result, written) = writer.terminator(&mut scratch);
        assert_eq!(result, csv_core::WriteResult::InputEmpty);
        self.io.write_all(&scratch[..written]).map_err(|e| self.write_error(e))
    }

    fn write_error(&self, e: std::io::Error) -> Error {
        match &self.args.output {
            None => Error::WriteStdout(e),
            Some(p) => Error::WriteFile(e, p.clone()),
        }
    }

    /// Render any buffered output (the table formatter collects all rows
    /// first) and flush the sink.
    pub fn finish(mut self) -> Result<(), Error> {
        if let Formatter::Table { comfy } = &self.formatter {
            self.io.write_fmt(format_args!("{comfy}\n")).map_err(|e| self.write_error(e))?;
        }
        self.io.flush().map_err(|e| self.write_error(e))
    }
}
