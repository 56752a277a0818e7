use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::identifier::IdentifierFactory;
use crate::metainf::immutable::ImmutableMetaSnapshot;
use crate::metainf::merge::{IdentifierRename, SnapshotMerger};
use crate::metainf::mutable::MutableMetaSnapshot;

/// Stage id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub u64);

/// Versioned holder of the committed metadata snapshot.
///
/// Readers take an `Arc` of the current version and never block writers.
/// Commits are optimistic: the unit is merged against the latest version
/// outside the lock, and the result is published only if no other commit
/// landed in between; otherwise the merge is redone.
pub struct MetainfoRepository {
    versions: Arc<RwLock<BTreeMap<u64, Arc<ImmutableMetaSnapshot>>>>,
    active_stages: Arc<RwLock<HashMap<StageId, u64>>>,
    current_version: Arc<AtomicU64>,
    next_stage: AtomicU64,
    factory: Arc<IdentifierFactory>,
    commit_retries: usize,
    max_versions: usize,
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitReport {
    pub version: u64,
    pub snapshot: Arc<ImmutableMetaSnapshot>,
    /// Identifiers the unit created that were replaced during the merge.
    pub renames: Vec<IdentifierRename>,
}

/// Read scope pinned to one committed version. Dropping it lets the
/// version be collected.
pub struct SnapshotStage<'a> {
    repository: &'a MetainfoRepository,
    id: StageId,
    version: u64,
    snapshot: Arc<ImmutableMetaSnapshot>,
}

impl<'a> SnapshotStage<'a> {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> &Arc<ImmutableMetaSnapshot> {
        &self.snapshot
    }

    /// Overlay a translation unit writes its new metadata into.
    pub fn create_mutable_snapshot(&self) -> MutableMetaSnapshot {
        MutableMetaSnapshot::new(self.snapshot.clone(), self.version)
    }
}

impl Drop for SnapshotStage<'_> {
    fn drop(&mut self) {
        self.repository.active_stages.write().remove(&self.id);
    }
}

impl MetainfoRepository {
    pub fn new(factory: Arc<IdentifierFactory>, config: &Config) -> Self {
        Self::with_snapshot(ImmutableMetaSnapshot::new(), factory, config)
    }

    /// Starts from an already populated snapshot, e.g. one rebuilt from the
    /// backend catalog.
    pub fn with_snapshot(initial: ImmutableMetaSnapshot, factory: Arc<IdentifierFactory>, config: &Config) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(0, Arc::new(initial));
        MetainfoRepository {
            versions: Arc::new(RwLock::new(versions)),
            active_stages: Arc::new(RwLock::new(HashMap::new())),
            current_version: Arc::new(AtomicU64::new(0)),
            next_stage: AtomicU64::new(0),
            factory,
            commit_retries: config.commit_retries.max(1),
            max_versions: config.max_versions.max(1),
        }
    }

    pub fn factory(&self) -> &Arc<IdentifierFactory> {
        &self.factory
    }

    pub fn current_version(&self) -> u64 {
        self.current_version.load(Ordering::Acquire)
    }

    pub fn current_snapshot(&self) -> Arc<ImmutableMetaSnapshot> {
        self.current().1
    }

    /// A retained committed version, if it has not been collected.
    pub fn snapshot_at(&self, version: u64) -> Option<Arc<ImmutableMetaSnapshot>> {
        self.versions.read().get(&version).cloned()
    }

    fn current(&self) -> (u64, Arc<ImmutableMetaSnapshot>) {
        let versions = self.versions.read();
        let version = self.current_version.load(Ordering::Acquire);
        let snapshot = versions
            .get(&version)
            .cloned()
            .unwrap_or_else(|| Arc::new(ImmutableMetaSnapshot::new()));
        (version, snapshot)
    }

    pub fn start_snapshot_stage(&self) -> SnapshotStage<'_> {
        let id = StageId(self.next_stage.fetch_add(1, Ordering::SeqCst));
        let (version, snapshot) = self.current();
        self.active_stages.write().insert(id, version);
        SnapshotStage {
            repository: self,
            id,
            version,
            snapshot,
        }
    }

    /// Merges `changes` into the latest committed snapshot and publishes
    /// the result as a new version.
    pub fn commit(&self, changes: &MutableMetaSnapshot) -> Result<CommitReport> {
        if !changes.has_changes() {
            let (version, snapshot) = self.current();
            return Ok(CommitReport { version, snapshot, renames: Vec::new() });
        }

        let merger = SnapshotMerger::new(&self.factory);
        for attempt in 0..self.commit_retries {
            let (version, committed) = self.current();
            let outcome = merger.merge(&committed, changes)?;

            let mut versions = self.versions.write();
            if self.current_version.load(Ordering::Acquire) != version {
                drop(versions);
                warn!(attempt, base_version = version, "lost commit race; merging again");
                continue;
            }

            let new_version = version + 1;
            let snapshot = Arc::new(outcome.snapshot);
            versions.insert(new_version, snapshot.clone());
            self.current_version.store(new_version, Ordering::Release);
            self.gc_old_versions(&mut versions);
            drop(versions);

            for rename in &outcome.renames {
                info!(%rename, "identifier renamed on commit");
            }
            debug!(version = new_version, base_version = changes.base_version(), "committed metadata snapshot");
            return Ok(CommitReport {
                version: new_version,
                snapshot,
                renames: outcome.renames,
            });
        }

        Err(Error::new(
            ErrorKind::CommitConflict,
            format!("metadata commit lost {} consecutive races", self.commit_retries),
        ))
    }

    fn gc_old_versions(&self, versions: &mut BTreeMap<u64, Arc<ImmutableMetaSnapshot>>) {
        if versions.len() <= self.max_versions {
            return;
        }
        let current = self.current_version.load(Ordering::Acquire);
        let min_active = {
            let active = self.active_stages.read();
            active.values().copied().min().unwrap_or(current)
        };
        let oldest_kept = current.saturating_sub(self.max_versions as u64 - 1);
        versions.retain(|&v, _| v >= oldest_kept.min(min_active));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::table_ref::TableRef;
    use crate::core::types::FieldType;
    use crate::identifier::DefaultIdentifierConstraints;
    use crate::metainf::MetaDocPart;

    fn repository(config: &Config) -> MetainfoRepository {
        let factory = IdentifierFactory::new(Arc::new(DefaultIdentifierConstraints::new(config))).unwrap();
        MetainfoRepository::new(Arc::new(factory), config)
    }

    fn add_collection(repo: &MetainfoRepository, unit: &mut MutableMetaSnapshot, collection: &str) {
        unit.get_or_create_database("app", repo.factory()).unwrap()
            .get_or_create_collection(collection, repo.factory()).unwrap();
    }

    #[test]
    fn commit_publishes_a_new_version() {
        let repo = repository(&Config::default());
        let stage = repo.start_snapshot_stage();
        let mut unit = stage.create_mutable_snapshot();
        add_collection(&repo, &mut unit, "people");

        let report = repo.commit(&unit).unwrap();
        assert_eq!(report.version, 1);
        assert_eq!(repo.current_version(), 1);
        assert!(repo.current_snapshot().database("app").unwrap().collection("people").is_some());
        // the stage still sees what it started with
        assert!(stage.snapshot().database("app").is_none());
    }

    #[test]
    fn empty_unit_does_not_bump_the_version() {
        let repo = repository(&Config::default());
        let unit = repo.start_snapshot_stage().create_mutable_snapshot();
        let report = repo.commit(&unit).unwrap();
        assert_eq!(report.version, 0);
    }

    #[test]
    fn stale_units_merge_onto_the_latest_version() {
        let repo = repository(&Config::default());
        let mut first = repo.start_snapshot_stage().create_mutable_snapshot();
        let mut second = repo.start_snapshot_stage().create_mutable_snapshot();
        add_collection(&repo, &mut first, "a");
        add_collection(&repo, &mut second, "b");

        repo.commit(&first).unwrap();
        let report = repo.commit(&second).unwrap();
        assert_eq!(report.version, 2);
        let db = report.snapshot.database("app").unwrap().clone();
        assert!(db.collection("a").is_some());
        assert!(db.collection("b").is_some());
        assert_eq!(
            db.collection("b").unwrap().doc_part(&TableRef::root()).unwrap().fields().len(),
            0
        );
    }

    #[test]
    fn old_versions_are_collected() {
        let config = Config { max_versions: 2, ..Config::default() };
        let repo = repository(&config);
        for index in 0..5 {
            let mut unit = repo.start_snapshot_stage().create_mutable_snapshot();
            let collection = unit
                .get_or_create_database("app", repo.factory()).unwrap()
                .get_or_create_collection("c", repo.factory()).unwrap();
            let root = collection.doc_part_mut(0);
            let name = format!("f{}", index);
            let id = repo.factory().field_identifier(&*root, FieldType::Integer, &name).unwrap();
            root.add_field(&name, id, FieldType::Integer);
            repo.commit(&unit).unwrap();
        }
        assert_eq!(repo.current_version(), 5);
        assert!(repo.snapshot_at(5).is_some());
        assert!(repo.snapshot_at(4).is_some());
        assert!(repo.snapshot_at(1).is_none());
    }

    #[test]
    fn pinned_stage_keeps_its_version() {
        let config = Config { max_versions: 1, ..Config::default() };
        let repo = repository(&config);
        let pinned = repo.start_snapshot_stage();
        for name in ["a", "b", "c"] {
            let mut unit = repo.start_snapshot_stage().create_mutable_snapshot();
            add_collection(&repo, &mut unit, name);
            repo.commit(&unit).unwrap();
        }
        assert!(repo.snapshot_at(pinned.version()).is_some());
        drop(pinned);
    }

    #[test]
    fn concurrent_commits_all_land() {
        let repo = Arc::new(repository(&Config::default()));
        let handles: Vec<_> = (0..8)
            .map(|index| {
                let repo = repo.clone();
                std::thread::spawn(move || {
                    let mut unit = repo.start_snapshot_stage().create_mutable_snapshot();
                    add_collection(&repo, &mut unit, &format!("c{}", index));
                    repo.commit(&unit).map(|report| report.version)
                })
            })
            .collect();
        for handle in handles {
            // every commit either lands or runs out of retries
            match handle.join().unwrap() {
                Ok(version) => assert!(version >= 1),
                Err(e) => assert_eq!(e.kind, ErrorKind::CommitConflict),
            }
        }
        let db = repo.current_snapshot().database("app").unwrap().clone();
        assert!(db.collections().count() >= 1);
    }
}
