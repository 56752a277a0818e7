use std::sync::Arc;
use parking_lot::RwLock;
use tracing::info;
use crate::backend::MemoryBackend;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{KvDocument, RowId, TranslatedDocument};
use crate::d2r::InMemoryRidGenerator;
use crate::identifier::{DefaultIdentifierConstraints, IdentifierConstraints, IdentifierFactory};
use crate::metainf::repository::MetainfoRepository;
use crate::metainf::ImmutableMetaSnapshot;
use crate::r2d::R2DTranslator;
use crate::writer::batch::BatchWriter;

pub struct Database {
    config: Config,

    repository: Arc<MetainfoRepository>,
    rid_generator: Arc<InMemoryRidGenerator>,

    backend: Arc<RwLock<MemoryBackend>>, // one table per docpart
    r2d: R2DTranslator,
}

impl Database {
    pub fn open(config: Config) -> Result<Self> {
        let constraints = Arc::new(DefaultIdentifierConstraints::new(&config));
        Self::open_with_constraints(constraints, config)
    }

    /// Opens with backend-specific identifier rules.
    pub fn open_with_constraints(constraints: Arc<dyn IdentifierConstraints>, config: Config) -> Result<Self> {
        let factory = Arc::new(IdentifierFactory::new(constraints)?);
        let repository = Arc::new(MetainfoRepository::new(factory, &config));
        info!(
            max_identifier_length = config.max_identifier_length,
            batch_size = config.writer_batch_size,
            "opened database"
        );

        Ok(Self {
            config,
            repository,
            rid_generator: Arc::new(InMemoryRidGenerator::new()),
            backend: Arc::new(RwLock::new(MemoryBackend::new())),
            r2d: R2DTranslator::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Arc<MetainfoRepository> {
        &self.repository
    }

    pub fn snapshot(&self) -> Arc<ImmutableMetaSnapshot> {
        self.repository.current_snapshot()
    }

    pub fn backend(&self) -> &Arc<RwLock<MemoryBackend>> {
        &self.backend
    }

    /// Inserts documents in units of `writer_batch_size`. Returns the
    /// `did` assigned to each document, in input order.
    pub fn insert<I>(&self, database: &str, collection: &str, documents: I) -> Result<Vec<RowId>>
    where
        I: IntoIterator<Item = KvDocument>,
    {
        let mut backend = self.backend.write();
        let mut writer = BatchWriter::new(
            &self.repository,
            self.rid_generator.as_ref(),
            &mut *backend,
            database,
            collection,
            self.config.writer_batch_size,
        );
        for document in documents {
            writer.add(document)?;
        }
        writer.finish()
    }

    pub fn insert_one(&self, database: &str, collection: &str, document: KvDocument) -> Result<RowId> {
        self.insert(database, collection, std::iter::once(document))?
            .pop()
            .ok_or_else(|| Error::new(ErrorKind::Internal, "insert returned no document id".to_string()))
    }

    /// Every document of the collection, in insertion order.
    pub fn find_all(&self, database: &str, collection: &str) -> Result<Vec<TranslatedDocument>> {
        let results = self.backend.read().results(database, collection);
        self.r2d.translate(results)
    }
}
