//! Dataset types for datarepair.
//!
//! Provides the [`Dataset`] trait and [`ArrowDataset`] implementation, plus
//! the block split and positional write-back used by partitioned repair.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use arrow::{
    array::{ArrayRef, RecordBatch, UInt64Array},
    compute::{concat_batches, take_record_batch},
    datatypes::{DataType, Field, Schema, SchemaRef},
};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    file::properties::WriterProperties,
};

use crate::{
    error::{Error, Result},
    value::{array_of, column_values, values_of, Value},
};

const READ_BATCH_SIZE: usize = 8192;
/// Records read for schema inference.
const INFER_ROWS: usize = 1000;

/// A dataset that can be iterated over.
///
/// All implementations must be thread-safe (Send + Sync).
pub trait Dataset: Send + Sync {
    /// Returns the total number of rows in the dataset.
    fn len(&self) -> usize;

    /// Returns true if the dataset contains no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the schema of the dataset.
    fn schema(&self) -> SchemaRef;
}

/// An in-memory dataset backed by Arrow RecordBatches.
///
/// Snapshots are cheap to clone: batches share their column buffers.
///
/// # Example
///
/// ```no_run
/// use datarepair::{ArrowDataset, Dataset};
///
/// let dataset = ArrowDataset::from_csv("hospital.csv").unwrap();
/// println!("Dataset has {} rows", dataset.len());
/// ```
#[derive(Debug, Clone)]
pub struct ArrowDataset {
    batches: Vec<RecordBatch>,
    schema: SchemaRef,
    row_count: usize,
}

impl ArrowDataset {
    /// Creates a new ArrowDataset from a vector of RecordBatches.
    ///
    /// # Errors
    ///
    /// Returns an error if the batches vector is empty or the batches have
    /// inconsistent schemas.
    pub fn new(batches: Vec<RecordBatch>) -> Result<Self> {
        if batches.is_empty() {
            return Err(Error::EmptyDataset);
        }

        let schema = batches[0].schema();

        for (i, batch) in batches.iter().enumerate().skip(1) {
            if batch.schema() != schema {
                return Err(Error::schema_mismatch(format!(
                    "Batch {} has different schema than batch 0",
                    i
                )));
            }
        }

        let row_count = batches.iter().map(|b| b.num_rows()).sum();

        Ok(Self {
            batches,
            schema,
            row_count,
        })
    }

    /// Creates an ArrowDataset from a single RecordBatch.
    ///
    /// # Errors
    ///
    /// Never fails for a single batch; the signature matches [`Self::new`].
    pub fn from_batch(batch: RecordBatch) -> Result<Self> {
        Self::new(vec![batch])
    }

    /// Loads a dataset from a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is not valid Parquet,
    /// or holds no batches.
    pub fn from_parquet(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(Error::Parquet)?;
        let reader = builder.build().map_err(Error::Parquet)?;

        let batches: Vec<RecordBatch> = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Arrow)?;

        Self::new(batches)
    }

    /// Saves the dataset to a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    pub fn to_parquet(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(|e| Error::io(e, path))?;

        let props = WriterProperties::builder().build();
        let mut writer =
            ArrowWriter::try_new(file, self.schema.clone(), Some(props)).map_err(Error::Parquet)?;

        for batch in &self.batches {
            writer.write(batch).map_err(Error::Parquet)?;
        }

        writer.close().map_err(Error::Parquet)?;
        Ok(())
    }

    /// Loads a dataset from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is not valid CSV, or
    /// is empty.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_csv_with_options(path, &CsvOptions::default())
    }

    /// Loads a dataset from a CSV file with options.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or the file is empty.
    pub fn from_csv_with_options(path: impl AsRef<Path>, options: &CsvOptions) -> Result<Self> {
        use std::io::{BufReader, Seek, SeekFrom};

        use arrow_csv::{reader::Format, ReaderBuilder};

        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let mut buf_reader = BufReader::new(file);

        let format = Format::default()
            .with_header(options.has_header)
            .with_delimiter(options.delimiter);
        let (inferred, _) = format
            .infer_schema(&mut buf_reader, Some(INFER_ROWS))
            .map_err(Error::Arrow)?;
        buf_reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::io(e, path))?;

        let reader = ReaderBuilder::new(Arc::new(inferred))
            .with_batch_size(READ_BATCH_SIZE)
            .with_header(options.has_header)
            .with_delimiter(options.delimiter)
            .build(buf_reader)
            .map_err(Error::Arrow)?;

        let batches: Vec<RecordBatch> = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Arrow)?;

        Self::new(batches)
    }

    /// Saves the dataset to a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_csv_with_options(path, &CsvOptions::default())
    }

    /// Saves the dataset to a CSV file with options.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    pub fn to_csv_with_options(&self, path: impl AsRef<Path>, options: &CsvOptions) -> Result<()> {
        use arrow_csv::WriterBuilder;

        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(|e| Error::io(e, path))?;

        let mut writer = WriterBuilder::new()
            .with_header(options.has_header)
            .with_delimiter(options.delimiter)
            .build(file);

        for batch in &self.batches {
            writer.write(batch).map_err(Error::Arrow)?;
        }

        Ok(())
    }

    /// Loads a dataset from a JSON Lines (JSONL) file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        use std::io::BufReader;

        use arrow_json::ReaderBuilder;

        let path = path.as_ref();

        let infer_file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let (inferred, _) =
            arrow_json::reader::infer_json_schema(BufReader::new(infer_file), Some(INFER_ROWS))
                .map_err(Error::Arrow)?;

        let file = std::fs::File::open(path).map_err(|e| Error::io(e, path))?;
        let reader = ReaderBuilder::new(Arc::new(inferred))
            .with_batch_size(READ_BATCH_SIZE)
            .build(BufReader::new(file))
            .map_err(Error::Arrow)?;

        let batches: Vec<RecordBatch> = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Arrow)?;

        Self::new(batches)
    }

    /// Saves the dataset to a JSON Lines (JSONL) file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    pub fn to_json(&self, path: impl AsRef<Path>) -> Result<()> {
        use std::io::BufWriter;

        use arrow_json::LineDelimitedWriter;

        let path = path.as_ref();
        let file = std::fs::File::create(path).map_err(|e| Error::io(e, path))?;
        let mut writer = LineDelimitedWriter::new(BufWriter::new(file));

        for batch in &self.batches {
            writer.write(batch).map_err(Error::Arrow)?;
        }

        writer.finish().map_err(Error::Arrow)?;

        Ok(())
    }

    /// Loads a dataset from a CSV string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid CSV or has no rows.
    pub fn from_csv_str(data: &str) -> Result<Self> {
        use std::io::Cursor;

        use arrow_csv::{reader::Format, ReaderBuilder};

        let mut cursor_for_infer = Cursor::new(data.as_bytes());
        let (inferred, _) = Format::default()
            .with_header(true)
            .infer_schema(&mut cursor_for_infer, Some(INFER_ROWS))
            .map_err(Error::Arrow)?;

        let reader = ReaderBuilder::new(Arc::new(inferred))
            .with_batch_size(READ_BATCH_SIZE)
            .with_header(true)
            .build(Cursor::new(data.as_bytes()))
            .map_err(Error::Arrow)?;

        let batches: Vec<RecordBatch> = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Arrow)?;

        Self::new(batches)
    }

    /// Loads a dataset by file extension (`csv`, `json`/`jsonl`, `parquet`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for other extensions.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, &CsvOptions::default())
    }

    /// Loads a dataset by file extension, reading CSV with `csv`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for other extensions.
    pub fn load_with(path: impl AsRef<Path>, csv: &CsvOptions) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "parquet" => Self::from_parquet(path),
            "csv" => Self::from_csv_with_options(path, csv),
            "json" | "jsonl" => Self::from_json(path),
            ext => Err(Error::unsupported_format(ext)),
        }
    }

    /// Saves a dataset by file extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for unknown extensions.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.save_with(path, &CsvOptions::default())
    }

    /// Saves a dataset by file extension, writing CSV with `csv`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for unknown extensions.
    pub fn save_with(&self, path: impl AsRef<Path>, csv: &CsvOptions) -> Result<()> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "parquet" => self.to_parquet(path),
            "csv" => self.to_csv_with_options(path, csv),
            "json" | "jsonl" => self.to_json(path),
            ext => Err(Error::unsupported_format(ext)),
        }
    }

    /// Returns the underlying batches.
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Returns the number of columns.
    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    /// Returns the column names in schema order.
    pub fn column_names(&self) -> Vec<String> {
        self.schema.fields().iter().map(|f| f.name().clone()).collect()
    }

    /// Concatenates all batches into one.
    ///
    /// # Errors
    ///
    /// Returns an error if concatenation fails.
    pub fn to_batch(&self) -> Result<RecordBatch> {
        if self.batches.len() == 1 {
            return Ok(self.batches[0].clone());
        }
        concat_batches(&self.schema, &self.batches).map_err(Error::Arrow)
    }

    /// Reads one column as values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ColumnNotFound`] if the column does not exist.
    pub fn column(&self, name: &str) -> Result<Vec<Value>> {
        column_values(&self.to_batch()?, name)
    }

    /// Splits the dataset into disjoint blocks, one per distinct value of
    /// `column`.
    ///
    /// Missing values form their own block. Blocks are ordered by key and
    /// each remembers the positions of its rows in this dataset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ColumnNotFound`] for an unknown partition column.
    pub fn partition_by(&self, column: &str) -> Result<Vec<Block>> {
        let batch = self.to_batch()?;
        let keys = column_values(&batch, column)?;

        let mut groups: BTreeMap<Value, Vec<usize>> = BTreeMap::new();
        for (row, key) in keys.into_iter().enumerate() {
            groups.entry(key).or_default().push(row);
        }

        groups
            .into_iter()
            .map(|(key, rows)| {
                let indices = UInt64Array::from(rows.iter().map(|&r| r as u64).collect::<Vec<_>>());
                let block = take_record_batch(&batch, &indices).map_err(Error::Arrow)?;
                Ok(Block {
                    key,
                    rows,
                    batch: block,
                })
            })
            .collect()
    }

    /// Writes repaired blocks back into a copy of this dataset by row
    /// position.
    ///
    /// Rows not covered by any block keep their values. A column that ends
    /// up with different types across blocks is unified: to Float64 when
    /// every type is numeric, otherwise to Utf8.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if a block's columns or row count
    /// do not match.
    pub fn scatter(&self, blocks: &[(Vec<usize>, RecordBatch)]) -> Result<Self> {
        let base = self.to_batch()?;
        let schema = base.schema();
        let mut fields = Vec::with_capacity(schema.fields().len());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

        for (idx, field) in schema.fields().iter().enumerate() {
            let mut values = values_of(base.column(idx).as_ref())?;
            let mut types = vec![field.data_type().clone()];

            for (rows, block) in blocks {
                if block.num_rows() != rows.len() {
                    return Err(Error::schema_mismatch(format!(
                        "block has {} rows for {} positions",
                        block.num_rows(),
                        rows.len()
                    )));
                }
                let block_idx = block.schema().index_of(field.name()).map_err(|_| {
                    Error::schema_mismatch(format!("block is missing column '{}'", field.name()))
                })?;
                types.push(block.schema().field(block_idx).data_type().clone());

                let block_values = values_of(block.column(block_idx).as_ref())?;
                for (&row, value) in rows.iter().zip(block_values) {
                    values[row] = value;
                }
            }

            let target = unify_types(&types);
            columns.push(array_of(field.name(), &values, &target)?);
            fields.push(Field::new(field.name(), target, true));
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Self::from_batch(batch)
    }
}

fn is_numeric(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int32 | DataType::Int64 | DataType::Float32 | DataType::Float64
    )
}

/// Picks one column type for a set of block types.
fn unify_types(types: &[DataType]) -> DataType {
    let first = &types[0];
    if types.iter().all(|t| t == first) {
        first.clone()
    } else if types.iter().all(is_numeric) {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

impl Dataset for ArrowDataset {
    fn len(&self) -> usize {
        self.row_count
    }

    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }
}

/// One partition block: its key, the source row positions, and the rows.
#[derive(Debug, Clone)]
pub struct Block {
    /// Partition value shared by every row of the block.
    pub key: Value,
    /// Positions of the block's rows in the partitioned dataset.
    pub rows: Vec<usize>,
    /// The block's rows, in position order.
    pub batch: RecordBatch,
}

/// Options for reading and writing CSV files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    /// Whether the CSV file has a header row.
    pub has_header: bool,
    /// Field delimiter.
    pub delimiter: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
        }
    }
}

impl CsvOptions {
    /// Creates new CSV options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the file has a header row.
    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Sets the delimiter character.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}
