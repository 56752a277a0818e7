use tracing::{debug, info};
use crate::backend::RowSink;
use crate::core::error::Result;
use crate::core::types::{KvDocument, RowId};
use crate::d2r::{D2RTranslator, RidGenerator};
use crate::metainf::repository::{CommitReport, MetainfoRepository};

/// Batch writer for bulk inserts into one collection.
///
/// Every flush is one translation unit: stage a snapshot, translate the
/// buffered documents, commit the new metadata, rebind the rows to the
/// committed identifiers and hand them to the sink.
pub struct BatchWriter<'a, S: RowSink> {
    pub repository: &'a MetainfoRepository,
    pub rid_generator: &'a dyn RidGenerator,
    pub sink: &'a mut S,
    pub database: String,
    pub collection: String,
    pub buffer: Vec<KvDocument>,
    pub batch_size: usize,
    pub dids: Vec<RowId>,
}

impl<'a, S: RowSink> BatchWriter<'a, S> {
    pub fn new(
        repository: &'a MetainfoRepository,
        rid_generator: &'a dyn RidGenerator,
        sink: &'a mut S,
        database: &str,
        collection: &str,
        batch_size: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        BatchWriter {
            repository,
            rid_generator,
            sink,
            database: database.to_string(),
            collection: collection.to_string(),
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            dids: Vec::new(),
        }
    }

    pub fn add(&mut self, doc: KvDocument) -> Result<()> {
        self.buffer.push(doc);

        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }

        Ok(())
    }

    /// Writes the buffered documents. A failing document aborts the whole
    /// unit: nothing of it is committed or inserted, and the buffer is
    /// dropped.
    pub fn flush(&mut self) -> Result<Option<CommitReport>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let documents = std::mem::take(&mut self.buffer);

        let stage = self.repository.start_snapshot_stage();
        let mut unit = stage.create_mutable_snapshot();
        let mut translator = D2RTranslator::new(
            self.repository.factory(),
            self.rid_generator,
            &mut unit,
            &self.database,
            &self.collection,
        )?;
        let mut dids = Vec::with_capacity(documents.len());
        for doc in &documents {
            dids.push(translator.translate(doc)?);
        }
        let mut data = translator.finish()?;

        let report = self.repository.commit(&unit)?;
        drop(stage);
        data.rebind(&report.snapshot)?;
        if !report.renames.is_empty() {
            info!(renames = report.renames.len(), "rows rebound to renamed identifiers");
        }

        self.sink.insert(&data)?;
        debug!(
            collection = %self.collection,
            documents = documents.len(),
            rows = data.row_count(),
            version = report.version,
            "flushed batch"
        );
        self.dids.extend(dids);
        Ok(Some(report))
    }

    /// Flushes what is left and returns the `did` of every written document.
    pub fn finish(mut self) -> Result<Vec<RowId>> {
        self.flush()?;
        Ok(std::mem::take(&mut self.dids))
    }
}
