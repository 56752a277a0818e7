use docrel::core::config::Config;
use docrel::core::database::Database;
use docrel::core::error::ErrorKind;
use docrel::core::json::parse_document;
use docrel::core::table_ref::TableRef;
use docrel::core::types::{FieldType, KvDocument, KvValue};
use docrel::d2r::{D2RTranslator, InMemoryRidGenerator};
use docrel::identifier::{DefaultIdentifierConstraints, IdentifierFactory};
use docrel::metainf::{ImmutableMetaSnapshot, MetaDocPart, MutableMetaSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn open() -> Database {
    Database::open(Config::default()).unwrap()
}

fn doc(json: &str) -> KvDocument {
    parse_document(json).unwrap()
}

fn assert_round_trip(documents: &[&str]) {
    let db = open();
    let originals: Vec<KvDocument> = documents.iter().map(|json| doc(json)).collect();
    let dids = db.insert("test", "c", originals.clone()).unwrap();
    let read = db.find_all("test", "c").unwrap();

    assert_eq!(read.len(), originals.len());
    for ((translated, original), did) in read.iter().zip(&originals).zip(&dids) {
        assert_eq!(translated.did, *did);
        assert_eq!(&translated.document, original);
    }
}

#[test]
fn flat_document() {
    let db = open();
    let did = db.insert_one("test", "people", doc(r#"{"name": "John", "age": 34}"#)).unwrap();

    let snapshot = db.snapshot();
    let collection = snapshot.database("test").unwrap().collection("people").unwrap().clone();
    assert_eq!(collection.doc_parts().count(), 1);
    let root = collection.doc_part(&TableRef::root()).unwrap();
    let columns: Vec<&str> = root.column_identifiers().collect();
    assert_eq!(columns, vec!["name_s", "age_i"]);

    let backend = db.backend().read();
    let rows = backend.rows("test", "people", &TableRef::root()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].did(), did);
    assert_eq!(rows[0].rid(), did);
    assert_eq!(rows[0].pid(), None);
}

#[test]
fn scalar_array() {
    let db = open();
    let did = db.insert_one("test", "c", doc(r#"{"numbers": [4, 8, 15, 16]}"#)).unwrap();

    let backend = db.backend().read();
    let root = backend.rows("test", "c", &TableRef::root()).unwrap();
    assert_eq!(root[0].field_value(0), Some(&KvValue::Boolean(true)));

    let elements = backend.rows("test", "c", &TableRef::root().child("numbers")).unwrap();
    let values: Vec<(Option<u32>, Option<&KvValue>)> =
        elements.iter().map(|r| (r.seq(), r.scalar_value(0))).collect();
    assert_eq!(
        values,
        vec![
            (Some(0), Some(&KvValue::Integer(4))),
            (Some(1), Some(&KvValue::Integer(8))),
            (Some(2), Some(&KvValue::Integer(15))),
            (Some(3), Some(&KvValue::Integer(16))),
        ]
    );
    assert!(elements.iter().all(|r| r.pid() == Some(did) && r.did() == did));
}

#[test]
fn documents_with_nested_structure() {
    assert_round_trip(&[
        r#"{"name": "John", "address": {"city": "Madrid", "zip": 28001}}"#,
        r#"{"matrix": [[1, 2], [3, [4, 5]], []]}"#,
        r#"{"items": [{"sku": "a", "qty": 1}, {"sku": "b", "tags": ["x", "y"]}, 7, null]}"#,
        r#"{"empty": {}, "none": [], "deep": {"a": {"b": {"c": [true, false]}}}}"#,
        r#"{"_id": {"$oid": "000102030405060708090a0b"}, "when": {"$date": "2020-01-02T03:04:05Z"}}"#,
    ]);
}

#[test]
fn field_order_is_not_significant() {
    assert_round_trip(&[r#"{"b": 1, "a": 2}"#, r#"{"a": 3, "b": 4}"#]);
}

#[test]
fn polymorphic_fields_round_trip() {
    let db = open();
    db.insert(
        "test",
        "c",
        vec![doc(r#"{"a": 1}"#), doc(r#"{"a": "one"}"#), doc(r#"{"a": [1]}"#), doc(r#"{"a": {"x": 1}}"#)],
    )
    .unwrap();

    let snapshot = db.snapshot();
    let root = snapshot.database("test").unwrap()
        .collection("c").unwrap()
        .doc_part(&TableRef::root()).unwrap()
        .clone();
    assert!(root.field_by_name_and_type("a", FieldType::Integer).is_some());
    assert!(root.field_by_name_and_type("a", FieldType::String).is_some());
    // array and subdocument share the child DocPart and its marker column
    assert!(root.field_by_name_and_type("a", FieldType::Child).is_some());
    assert_eq!(root.fields().len(), 3);

    let read: Vec<KvDocument> = db.find_all("test", "c").unwrap().into_iter().map(|d| d.document).collect();
    assert_eq!(read[2], doc(r#"{"a": [1]}"#));
    assert_eq!(read[3], doc(r#"{"a": {"x": 1}}"#));
}

#[test]
fn same_shape_reuses_metadata() {
    let db = open();
    db.insert_one("test", "c", doc(r#"{"a": 1, "b": [1]}"#)).unwrap();
    let version = db.repository().current_version();
    db.insert_one("test", "c", doc(r#"{"a": 2, "b": [2, 3]}"#)).unwrap();
    assert_eq!(db.repository().current_version(), version);
}

#[test]
fn rows_stay_aligned_with_columns() {
    let db = open();
    db.insert("test", "c", vec![doc(r#"{"a": 1}"#), doc(r#"{"b": "x"}"#)]).unwrap();
    db.insert_one("test", "c", doc(r#"{"c": true}"#)).unwrap();

    let snapshot = db.snapshot();
    let root = snapshot.database("test").unwrap()
        .collection("c").unwrap()
        .doc_part(&TableRef::root()).unwrap()
        .clone();
    let backend = db.backend().read();
    for row in backend.rows("test", "c", &TableRef::root()).unwrap() {
        assert_eq!(row.values().count(), root.column_count());
    }
}

#[test]
fn documents_come_back_in_insertion_order() {
    let db = Database::open(Config { writer_batch_size: 2, ..Config::default() }).unwrap();
    let documents: Vec<KvDocument> = (0..7).map(|i| KvDocument::new().with("i", i)).collect();
    db.insert("test", "c", documents.clone()).unwrap();
    let read: Vec<KvDocument> = db.find_all("test", "c").unwrap().into_iter().map(|d| d.document).collect();
    assert_eq!(read, documents);
}

#[test]
fn unsupported_values_abort_the_batch() {
    let db = open();
    let err = db
        .insert("test", "c", vec![doc(r#"{"a": 1}"#), doc(r#"{"k": {"$maxKey": 1}}"#)])
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedValueType);
    assert!(db.find_all("test", "c").unwrap().is_empty());
    assert!(db.snapshot().database("test").is_none());
}

#[test]
fn identifiers_respect_the_length_limit() {
    let db = Database::open(Config { max_identifier_length: 16, ..Config::default() }).unwrap();
    let long = "a_rather_long_field_name_that_keeps_going";
    let mut document = KvDocument::new();
    for suffix in ["one", "two", "three"] {
        document.insert(format!("{}_{}", long, suffix), 1);
    }
    db.insert_one("test", "a_long_collection_name", document.clone()).unwrap();

    let snapshot = db.snapshot();
    let collection = snapshot.database("test").unwrap().collection("a_long_collection_name").unwrap().clone();
    let root = collection.doc_part(&TableRef::root()).unwrap();
    let mut columns: Vec<&str> = root.column_identifiers().collect();
    assert!(columns.iter().all(|c| c.len() <= 16));
    let count = columns.len();
    columns.sort();
    columns.dedup();
    assert_eq!(columns.len(), count);

    let read = db.find_all("test", "a_long_collection_name").unwrap();
    assert_eq!(read[0].document, document);
}

const KEYS: [&str; 6] = ["a", "b", "c", "tags", "sub", "v"];
const WORDS: [&str; 5] = ["", "x", "hello", "ñandú", "two words"];

fn random_value(rng: &mut StdRng, depth: usize) -> KvValue {
    let choices = if depth < 3 { 10 } else { 7 };
    match rng.gen_range(0..choices) {
        0 => KvValue::Null,
        1 => KvValue::Boolean(rng.gen_bool(0.5)),
        2 => KvValue::Integer(rng.gen_range(-1000..1000)),
        3 => KvValue::Long(rng.gen_range(i64::MIN..i64::MAX)),
        4 => KvValue::Double(rng.gen_range(-1.0e6..1.0e6)),
        5 => KvValue::from(WORDS[rng.gen_range(0..WORDS.len())]),
        6 => KvValue::Binary((0..rng.gen_range(0..4)).map(|_| rng.gen_range(0..=255u8)).collect()),
        7 => KvValue::Document(random_document(rng, depth + 1)),
        8 => random_array(rng, depth + 1),
        _ => KvValue::Array(vec![random_array(rng, depth + 1), KvValue::Array(Vec::new())]),
    }
}

fn random_array(rng: &mut StdRng, depth: usize) -> KvValue {
    KvValue::Array((0..rng.gen_range(0..4)).map(|_| random_value(rng, depth)).collect())
}

fn random_document(rng: &mut StdRng, depth: usize) -> KvDocument {
    let mut document = KvDocument::new();
    for _ in 0..rng.gen_range(0..5) {
        let key = KEYS[rng.gen_range(0..KEYS.len())];
        let value = random_value(rng, depth);
        document.insert(key, value);
    }
    document
}

fn random_documents(seed: u64, count: usize) -> Vec<KvDocument> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| random_document(&mut rng, 0)).collect()
}

#[test]
fn generated_documents_round_trip() {
    let documents = random_documents(7, 300);
    let db = Database::open(Config { writer_batch_size: 16, ..Config::default() }).unwrap();
    let dids = db.insert("test", "gen", documents.clone()).unwrap();

    let read = db.find_all("test", "gen").unwrap();
    assert_eq!(read.len(), documents.len());
    for ((translated, original), did) in read.iter().zip(&documents).zip(&dids) {
        assert_eq!(translated.did, *did);
        assert_eq!(&translated.document, original);
    }
}

#[test]
fn generated_documents_keep_rows_aligned() {
    let db = Database::open(Config { writer_batch_size: 16, ..Config::default() }).unwrap();
    db.insert("test", "gen", random_documents(11, 300)).unwrap();

    let snapshot = db.snapshot();
    let collection = snapshot.database("test").unwrap().collection("gen").unwrap().clone();
    let backend = db.backend().read();
    let mut rows = 0;
    for doc_part in collection.doc_parts() {
        for row in backend.rows("test", "gen", doc_part.table_ref()).unwrap_or(&[]) {
            assert_eq!(row.values().count(), doc_part.column_count(), "{}", doc_part.table_ref());
            rows += 1;
        }
    }
    assert_eq!(rows, backend.row_count("test", "gen"));
}

#[test]
fn generated_documents_emit_parents_before_children() {
    let factory = IdentifierFactory::new(Arc::new(DefaultIdentifierConstraints::default())).unwrap();
    let rids = InMemoryRidGenerator::new();
    let mut snapshot = MutableMetaSnapshot::new(Arc::new(ImmutableMetaSnapshot::new()), 0);

    for (seed, chunk) in random_documents(13, 300).chunks(50).enumerate() {
        let mut translator = D2RTranslator::new(&factory, &rids, &mut snapshot, "test", "gen").unwrap();
        for document in chunk {
            translator.translate(document).unwrap();
        }
        let data = translator.finish().unwrap();

        let order: Vec<&TableRef> = data.doc_parts().iter().map(|dp| dp.table_ref()).collect();
        assert_eq!(order.first().copied(), Some(&TableRef::root()), "chunk {}", seed);
        for (position, table_ref) in order.iter().enumerate().skip(1) {
            let parent = table_ref.parent().unwrap();
            let parent_position = order.iter().position(|r| **r == parent).unwrap();
            assert!(parent_position < position, "{} before its parent in chunk {}", table_ref, seed);
        }
    }
}
