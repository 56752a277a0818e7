use std::sync::Arc;
use std::thread;
use docrel::core::config::Config;
use docrel::core::table_ref::TableRef;
use docrel::core::types::FieldType;
use docrel::d2r::{D2RTranslator, InMemoryRidGenerator};
use docrel::core::types::KvDocument;
use docrel::identifier::{DefaultIdentifierConstraints, IdentifierFactory};
use docrel::metainf::repository::MetainfoRepository;
use docrel::metainf::MetaDocPart;
use docrel::r2d::{deepest_first, R2DTranslator};

fn repository() -> Arc<MetainfoRepository> {
    let config = Config { commit_retries: 64, ..Config::default() };
    let factory = IdentifierFactory::new(Arc::new(DefaultIdentifierConstraints::new(&config))).unwrap();
    Arc::new(MetainfoRepository::new(Arc::new(factory), &config))
}

#[test]
fn units_started_together_commit_the_union() {
    let repo = repository();
    let rids = Arc::new(InMemoryRidGenerator::new());

    let handles: Vec<_> = (0..6)
        .map(|index| {
            let repo = repo.clone();
            let rids = rids.clone();
            thread::spawn(move || {
                let stage = repo.start_snapshot_stage();
                let mut unit = stage.create_mutable_snapshot();
                let mut translator =
                    D2RTranslator::new(repo.factory(), rids.as_ref(), &mut unit, "db", "c").unwrap();
                let document = KvDocument::new()
                    .with("shared", 1)
                    .with(format!("own{}", index), "x");
                translator.translate(&document).unwrap();
                let mut data = translator.finish().unwrap();
                let report = repo.commit(&unit).unwrap();
                data.rebind(&report.snapshot).unwrap();
                data
            })
        })
        .collect();
    let units: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let snapshot = repo.current_snapshot();
    let root = snapshot.database("db").unwrap()
        .collection("c").unwrap()
        .doc_part(&TableRef::root()).unwrap()
        .clone();
    assert_eq!(root.fields().len(), 7);
    assert!(root.field_by_name_and_type("shared", FieldType::Integer).is_some());

    let mut ids: Vec<&str> = root.column_identifiers().collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 7);

    // every unit reads back correctly against its rebound metadata
    for data in units {
        let documents = R2DTranslator::new().translate(deepest_first(data)).unwrap();
        assert_eq!(documents.len(), 1);
        assert!(documents[0].document.contains_key("shared"));
    }
}

#[test]
fn conflicting_names_get_distinct_identifiers() {
    let repo = repository();
    let rids = InMemoryRidGenerator::new();

    let first_stage = repo.start_snapshot_stage();
    let second_stage = repo.start_snapshot_stage();
    let mut first = first_stage.create_mutable_snapshot();
    let mut second = second_stage.create_mutable_snapshot();

    let mut t1 = D2RTranslator::new(repo.factory(), &rids, &mut first, "db", "c").unwrap();
    t1.translate(&KvDocument::new().with("Name", "a")).unwrap();
    let mut first_data = t1.finish().unwrap();

    let mut t2 = D2RTranslator::new(repo.factory(), &rids, &mut second, "db", "c").unwrap();
    t2.translate(&KvDocument::new().with("name", "b")).unwrap();
    let mut second_data = t2.finish().unwrap();

    let first_report = repo.commit(&first).unwrap();
    first_data.rebind(&first_report.snapshot).unwrap();
    let second_report = repo.commit(&second).unwrap();
    assert_eq!(second_report.renames.len(), 1);
    second_data.rebind(&second_report.snapshot).unwrap();

    let root = second_data.doc_part(&TableRef::root()).unwrap().meta_doc_part().clone();
    let ids: Vec<&str> = root.column_identifiers().collect();
    assert_eq!(ids, vec!["name_s", "name_1_s"]);
    let row = &second_data.doc_part(&TableRef::root()).unwrap().rows()[0];
    assert_eq!(row.field_value(0), None);
    assert!(row.field_value(1).is_some());
}
