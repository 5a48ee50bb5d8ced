//! LanceDB persistence for [`DenseIndex`].
//!
//! A saved index is a LanceDB database with two tables: `chunks` (one row per
//! chunk with its normalised vector) and `meta` (key/value pairs recording the
//! embedder id, dimension and row count).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray,
    UInt64Array,
};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use tracing::{debug, info};

use ragdb_core::error::{BoxError, Error, Result, Stage};
use ragdb_core::types::Chunk;

use crate::index::DenseIndex;
use crate::schema::{build_chunks_schema, build_meta_schema, CHUNKS_TABLE, META_TABLE};

const META_EMBEDDER_ID: &str = "embedder_id";
const META_DIM: &str = "dim";
const META_ROWS: &str = "rows";

fn dense(e: impl Into<BoxError>) -> Error { Error::backend(Stage::Dense, e) }

pub async fn open_db(dir: &Path) -> Result<Connection> {
    connect(dir.to_string_lossy().as_ref()).execute().await.map_err(dense)
}

impl DenseIndex {
    /// Write the index to `dir`, replacing anything already there.
    pub async fn save(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;
        let conn = open_db(dir).await?;

        let dim = i32::try_from(self.dim()).map_err(|_| Error::InvalidConfig(format!("dimension {} is too large", self.dim())))?;
        let schema = build_chunks_schema(dim);
        let batch = chunks_batch(schema.clone(), self.chunks(), self.vectors(), dim)?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
        conn.create_table(CHUNKS_TABLE, Box::new(reader)).execute().await.map_err(dense)?;

        let entries = [
            (META_EMBEDDER_ID, self.embedder_id().to_string()),
            (META_DIM, self.dim().to_string()),
            (META_ROWS, self.len().to_string()),
        ];
        let meta = meta_batch(&entries)?;
        let reader = RecordBatchIterator::new(vec![Ok(meta)].into_iter(), build_meta_schema());
        conn.create_table(META_TABLE, Box::new(reader)).execute().await.map_err(dense)?;

        info!(rows = self.len(), dir = %dir.display(), "saved dense index");
        Ok(())
    }

    /// Read an index written by [`DenseIndex::save`].
    pub async fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::CorpusNotFound(dir.to_path_buf()));
        }
        let conn = open_db(dir).await?;
        let names = conn.table_names().execute().await.map_err(dense)?;
        if !names.iter().any(|n| n == CHUNKS_TABLE) || !names.iter().any(|n| n == META_TABLE) {
            return Err(Error::CorpusNotFound(dir.to_path_buf()));
        }

        let meta = read_meta(&conn).await?;
        let embedder_id = meta_value(&meta, META_EMBEDDER_ID)?.to_string();
        let dim: usize = parse_meta(&meta, META_DIM)?;
        let rows: usize = parse_meta(&meta, META_ROWS)?;

        let (chunks, vectors) = read_chunks(&conn, rows, dim).await?;
        if chunks.len() != rows {
            return Err(Error::FormatMismatch(format!("dense index lists {rows} rows but holds {}", chunks.len())));
        }
        debug!(rows, dim, embedder = %embedder_id, "opened dense index");
        DenseIndex::from_parts(embedder_id, dim, chunks, vectors)
    }
}

fn chunks_batch(schema: Arc<arrow_schema::Schema>, chunks: &[Chunk], vectors: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
    let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    let ordinals: Vec<u64> = chunks.iter().map(|c| c.ordinal as u64).collect();
    let offsets: Vec<u64> = chunks.iter().map(|c| c.offset as u64).collect();
    let positions: Vec<u64> = (0..chunks.len() as u64).collect();
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let vectors = vectors.iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>()));

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt64Array::from(ordinals)),
            Arc::new(UInt64Array::from(offsets)),
            Arc::new(UInt64Array::from(positions)),
            Arc::new(StringArray::from(texts)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
        ],
    )
    .map_err(dense)
}

fn meta_batch(entries: &[(&str, String)]) -> Result<RecordBatch> {
    let now = Utc::now().timestamp_millis();
    RecordBatch::try_new(
        build_meta_schema(),
        vec![
            Arc::new(StringArray::from(entries.iter().map(|(k, _)| *k).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|(_, v)| v.as_str()).collect::<Vec<_>>())),
            Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
        ],
    )
    .map_err(dense)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::FormatMismatch(format!("dense index column '{name}' is missing or mistyped")))
}

async fn read_meta(conn: &Connection) -> Result<HashMap<String, String>> {
    let table = conn.open_table(META_TABLE).execute().await.map_err(dense)?;
    let mut stream = table.query().limit(64).execute().await.map_err(dense)?;
    let mut meta = HashMap::new();
    while let Some(batch) = stream.try_next().await.map_err(dense)? {
        let keys = column::<StringArray>(&batch, "key")?;
        let values = column::<StringArray>(&batch, "value")?;
        for i in 0..batch.num_rows() {
            meta.insert(keys.value(i).to_string(), values.value(i).to_string());
        }
    }
    Ok(meta)
}

fn meta_value<'a>(meta: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    meta.get(key).map(String::as_str).ok_or_else(|| Error::FormatMismatch(format!("dense index metadata has no '{key}'")))
}

fn parse_meta(meta: &HashMap<String, String>, key: &str) -> Result<usize> {
    let raw = meta_value(meta, key)?;
    raw.parse().map_err(|_| Error::FormatMismatch(format!("dense index metadata '{key}' is not a number: {raw}")))
}

async fn read_chunks(conn: &Connection, rows: usize, dim: usize) -> Result<(Vec<Chunk>, Vec<Vec<f32>>)> {
    let table = conn.open_table(CHUNKS_TABLE).execute().await.map_err(dense)?;
    let mut stream = table.query().limit(rows.max(1)).execute().await.map_err(dense)?;

    let mut rows_by_position: Vec<(u64, Chunk, Vec<f32>)> = Vec::with_capacity(rows);
    while let Some(batch) = stream.try_next().await.map_err(dense)? {
        let ids = column::<StringArray>(&batch, "id")?;
        let sources = column::<StringArray>(&batch, "source")?;
        let ordinals = column::<UInt64Array>(&batch, "ordinal")?;
        let offsets = column::<UInt64Array>(&batch, "offset")?;
        let positions = column::<UInt64Array>(&batch, "position")?;
        let texts = column::<StringArray>(&batch, "text")?;
        let vectors = column::<FixedSizeListArray>(&batch, "vector")?;

        for i in 0..batch.num_rows() {
            let values = vectors.value(i);
            let floats = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| Error::FormatMismatch("dense index vectors are not f32".into()))?;
            if floats.len() != dim {
                return Err(Error::FormatMismatch(format!("stored vector has {} values, expected {dim}", floats.len())));
            }
            let chunk = Chunk {
                id: ids.value(i).to_string(),
                source: sources.value(i).to_string(),
                ordinal: ordinals.value(i) as usize,
                offset: offsets.value(i) as usize,
                text: texts.value(i).to_string(),
            };
            rows_by_position.push((positions.value(i), chunk, floats.values().to_vec()));
        }
    }

    rows_by_position.sort_by_key(|(p, _, _)| *p);
    if rows_by_position.iter().enumerate().any(|(i, (p, _, _))| *p != i as u64) {
        return Err(Error::FormatMismatch("dense index positions are not contiguous".into()));
    }
    Ok(rows_by_position.into_iter().map(|(_, c, v)| (c, v)).unzip())
}
