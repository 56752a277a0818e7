pub mod core;
pub mod identifier;
pub mod metainf;
pub mod d2r;
pub mod r2d;
pub mod backend;
pub mod writer;

/*
┌────────────────────────────────────────────────────────────────────────────────────────────┐
│                              DOCREL STRUCT ARCHITECTURE                                     │
└────────────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────────── CORE LAYER ──────────────────────────────────────────┐
│                                                                                              │
│  ┌────────────────────────────────────────────────────────────────────────────────────┐    │
│  │                               struct Database                                       │    │
│  │  ┌──────────────────────────────────────────────────────────────────────────────┐ │    │
│  │  │ config: Config                          // Identifier policy, batch size     │ │    │
│  │  │ repository: Arc<MetainfoRepository>     // Versioned metadata snapshots      │ │    │
│  │  │ rid_generator: Arc<InMemoryRidGenerator>// Row ids per DocPart               │ │    │
│  │  │ backend: Arc<RwLock<MemoryBackend>>     // One table per DocPart             │ │    │
│  │  │ r2d: R2DTranslator                      // Rows → documents                  │ │    │
│  │  └──────────────────────────────────────────────────────────────────────────────┘ │    │
│  └────────────────────────────────────────────────────────────────────────────────────┘    │
│                                                                                              │
│  ┌──────────────────┐  ┌──────────────────┐  ┌───────────────────────────────────────┐    │
│  │ enum KvValue     │  │ struct TableRef  │  │ enum FieldType                        │    │
│  │ • Null, Boolean  │  │ • path: Arc<[..]>│  │ • Binary r  Boolean b  Date c         │    │
│  │ • Integer, Long  │  │   Name(String)   │  │ • Double d  Instant g  Integer i      │    │
│  │ • Double, String │  │   ArrayDimension │  │ • Long l  ObjectId x  Timestamp y     │    │
│  │ • Document       │  │ • parent()       │  │ • Null n  String s  Time t            │    │
│  │ • Array          │  │ • array_child()  │  │ • Child e  (array / subdoc marker)    │    │
│  └──────────────────┘  └──────────────────┘  └───────────────────────────────────────┘    │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── METADATA LAYER ─────────────────────────────────────────┐
│                                                                                              │
│  ImmutableMetaSnapshot ──► ImmutableMetaDatabase ──► ImmutableMetaCollection                 │
│        (by name)                (by name)                 ──► ImmutableMetaDocPart (by ref)  │
│                                                                 • fields  (name, type)       │
│                                                                 • scalars (type)             │
│                                                                                              │
│  MetainfoRepository                                                                          │
│   start_snapshot_stage() ──► SnapshotStage ──► create_mutable_snapshot()                    │
│                                                      │                                       │
│                                                      ▼                                       │
│                                              MutableMetaSnapshot (copy-on-write overlay)    │
│   commit(&MutableMetaSnapshot)                       │                                       │
│     SnapshotMerger: latest committed + overlay ──► new version, Vec<IdentifierRename>       │
│     version CAS under write lock; lost race ──► merge again (commit_retries)                │
│                                                                                              │
│  IdentifierFactory (IdentifierConstraints)                                                   │
│   schema / table / column identifiers: normalize ──► join ──► counter + middle elision      │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────────── TRANSLATION LAYER ────────────────────────────────────────┐
│                                                                                              │
│  KvDocument ──► D2RTranslator ──► CollectionData ──► DocPartData ──► DocPartRow             │
│                  • did = rid of root row              (parent before child)  did/rid/pid/seq │
│                  • subdoc: child row, marker false                                           │
│                  • array: one row per element, marker true                                   │
│                  • nested array: scalar Child = true, next ArrayDimension                    │
│                                                                                              │
│  DocPartResult (deepest first) ──► R2DTranslator ──► Vec<TranslatedDocument>                │
│                  • children attached by pid, arrays ordered by seq                           │
└──────────────────────────────────────────────────────────────────────────────────────────────┘

┌───────────────────────────────────── WRITE PATH ────────────────────────────────────────────┐
│                                                                                              │
│  BatchWriter::flush                                                                          │
│   stage ──► D2R ──► commit ──► CollectionData::rebind(committed) ──► RowSink::insert        │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/
