use std::fs;
use std::path::Path;

use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery};
use tantivy::schema::{Field, Schema, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::{debug, info};

use ragdb_core::error::{BoxError, Error, Result, Stage};
use ragdb_core::types::{by_score_then_position, Chunk, SearchHit, SourceKind};

use crate::tantivy_utils::{build_schema, register_tokenizer};

const WRITER_MEMORY_BUDGET: usize = 50_000_000;

fn lexical(e: impl Into<BoxError>) -> Error { Error::backend(Stage::Lexical, e) }

#[derive(Debug, Clone, Copy)]
struct Fields {
	id: Field,
	source: Field,
	ordinal: Field,
	offset: Field,
	position: Field,
	text: Field,
}

impl Fields {
	fn from_schema(schema: &Schema) -> Result<Self> {
		let get = |name: &str| schema.get_field(name).map_err(|_| Error::FormatMismatch(format!("lexical index has no '{name}' field")));
		Ok(Self { id: get("id")?, source: get("source")?, ordinal: get("ordinal")?, offset: get("offset")?, position: get("position")?, text: get("text")? })
	}
}

/// BM25 index over a chunk corpus.
///
/// Built in RAM; `save` writes an on-disk copy and `open` reads one back. Every
/// chunk receives a score for every query (0.0 when no query term matches), so
/// `query(q, k)` returns exactly `min(k, len)` hits.
pub struct LexicalIndex {
	index: Index,
	reader: IndexReader,
	fields: Fields,
	chunks: Vec<Chunk>,
}

impl LexicalIndex {
	pub fn build(chunks: &[Chunk]) -> Result<Self> {
		if chunks.is_empty() { return Err(Error::EmptyCorpus); }
		let index = Index::create_in_ram(build_schema());
		let built = Self::populate(index, chunks.to_vec())?;
		info!(chunks = built.len(), "built lexical index");
		Ok(built)
	}

	/// Reopen an index written by [`LexicalIndex::save`].
	pub fn open(dir: &Path) -> Result<Self> {
		if !dir.join("meta.json").is_file() { return Err(Error::CorpusNotFound(dir.to_path_buf())); }
		let index = Index::open_in_dir(dir).map_err(lexical)?;
		register_tokenizer(&index);
		let fields = Fields::from_schema(&index.schema())?;
		let reader = open_reader(&index)?;
		let chunks = read_chunks(&reader.searcher(), &fields)?;
		if chunks.is_empty() { return Err(Error::FormatMismatch(format!("lexical index at {} is empty", dir.display()))); }
		info!(chunks = chunks.len(), dir = %dir.display(), "opened lexical index");
		Ok(Self { index, reader, fields, chunks })
	}

	/// Write the index to `dir`, replacing whatever was there.
	pub fn save(&self, dir: &Path) -> Result<()> {
		if dir.exists() { fs::remove_dir_all(dir)?; }
		fs::create_dir_all(dir)?;
		let index = Index::create_in_dir(dir, build_schema()).map_err(lexical)?;
		Self::populate(index, self.chunks.clone())?;
		debug!(dir = %dir.display(), "saved lexical index");
		Ok(())
	}

	pub fn chunks(&self) -> &[Chunk] { &self.chunks }
	pub fn len(&self) -> usize { self.chunks.len() }
	pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

	/// Top `k` chunks by BM25 score, ties broken by corpus position.
	pub fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
		if k == 0 { return Ok(Vec::new()); }
		let searcher = self.reader.searcher();
		let terms = self.query_terms(text)?;
		let mut scores = vec![0f32; self.chunks.len()];
		if !terms.is_empty() {
			let query = BooleanQuery::new_multiterms_query(terms);
			let top_docs = searcher.search(&query, &TopDocs::with_limit(self.chunks.len())).map_err(lexical)?;
			for (score, addr) in top_docs {
				let doc: TantivyDocument = searcher.doc(addr).map_err(lexical)?;
				let position = stored_u64(&doc, self.fields.position)? as usize;
				let slot = scores.get_mut(position).ok_or_else(|| Error::FormatMismatch(format!("chunk position {position} out of range")))?;
				*slot = score;
			}
		}
		let mut ranked: Vec<(f32, usize)> = scores.into_iter().enumerate().map(|(p, s)| (s, p)).collect();
		ranked.sort_by(|a, b| by_score_then_position(*a, *b));
		ranked.truncate(k);
		debug!(query = text, k, hits = ranked.len(), "lexical query");
		Ok(ranked.into_iter().map(|(score, p)| SearchHit { chunk: self.chunks[p].clone(), score, source: SourceKind::Text }).collect())
	}

	fn query_terms(&self, text: &str) -> Result<Vec<Term>> {
		let mut analyzer = self.index.tokenizer_for_field(self.fields.text).map_err(lexical)?;
		let mut stream = analyzer.token_stream(text);
		let mut terms = Vec::new();
		while stream.advance() {
			terms.push(Term::from_field_text(self.fields.text, &stream.token().text));
		}
		Ok(terms)
	}

	fn populate(index: Index, chunks: Vec<Chunk>) -> Result<Self> {
		register_tokenizer(&index);
		let fields = Fields::from_schema(&index.schema())?;
		// One thread keeps the corpus in a single segment in insertion order.
		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY_BUDGET).map_err(lexical)?;
		for (position, c) in chunks.iter().enumerate() {
			writer.add_document(doc!(
				fields.id => c.id.clone(),
				fields.source => c.source.clone(),
				fields.ordinal => c.ordinal as u64,
				fields.offset => c.offset as u64,
				fields.position => position as u64,
				fields.text => c.text.clone(),
			)).map_err(lexical)?;
		}
		writer.commit().map_err(lexical)?;
		writer.wait_merging_threads().map_err(lexical)?;
		let reader = open_reader(&index)?;
		Ok(Self { index, reader, fields, chunks })
	}
}

fn open_reader(index: &Index) -> Result<IndexReader> {
	index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(lexical)
}

fn stored_u64(doc: &TantivyDocument, field: Field) -> Result<u64> {
	doc.get_first(field).and_then(|v| v.as_u64()).ok_or_else(|| Error::FormatMismatch("stored numeric field missing".into()))
}

fn stored_str(doc: &TantivyDocument, field: Field) -> Result<String> {
	doc.get_first(field).and_then(|v| v.as_str()).map(str::to_string).ok_or_else(|| Error::FormatMismatch("stored text field missing".into()))
}

/// Rebuild the chunk table from stored fields, in corpus order.
fn read_chunks(searcher: &Searcher, fields: &Fields) -> Result<Vec<Chunk>> {
	let addresses = searcher.search(&AllQuery, &DocSetCollector).map_err(lexical)?;
	let mut rows = Vec::with_capacity(addresses.len());
	for addr in addresses {
		let doc: TantivyDocument = searcher.doc(addr).map_err(lexical)?;
		let position = stored_u64(&doc, fields.position)? as usize;
		let chunk = Chunk {
			id: stored_str(&doc, fields.id)?,
			source: stored_str(&doc, fields.source)?,
			ordinal: stored_u64(&doc, fields.ordinal)? as usize,
			offset: stored_u64(&doc, fields.offset)? as usize,
			text: stored_str(&doc, fields.text)?,
		};
		rows.push((position, chunk));
	}
	rows.sort_by_key(|(position, _)| *position);
	if rows.iter().enumerate().any(|(i, (position, _))| i != *position) {
		return Err(Error::FormatMismatch("lexical index chunk positions are not contiguous".into()));
	}
	Ok(rows.into_iter().map(|(_, chunk)| chunk).collect())
}
