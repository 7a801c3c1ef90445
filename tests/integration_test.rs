use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parcel_store::engine::{MemoryStorage, NoEncryption};
use parcel_store::{
    Encryption, Error, FromValue, Limits, ParcelStore, ParcelStoreBuilder, Partitioned, Record, Result, Storage,
    ToValue, TypeDesc, Typed, Value,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
struct SampleItem {
    name: String,
    quantity: i32,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
struct NestedItem {
    label: String,
    weight: f64,
}

parcel_store::impl_record!(SampleItem, "SampleItem");
parcel_store::impl_record!(NestedItem, "NestedItem");

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
struct SampleData {
    items: Vec<SampleItem>,
    by_id: HashMap<Uuid, SampleItem>,
    nested: Option<NestedItem>,
    title: String,
    numbers: Vec<i64>,
    tags: Vec<String>,
}

parcel_store::impl_record!(SampleData, "SampleData", partitioned);

fn unknown_partition(index: usize) -> Error {
    Error::Partition(format!("no partition {}", index))
}

impl Partitioned for SampleData {
    fn partition_count(&self) -> usize {
        6
    }

    fn partition_data(&self, index: usize) -> Result<Option<Value>> {
        Ok(match index {
            0 => Some(self.items.to_value()?),
            1 => Some(self.by_id.to_value()?),
            2 => self.nested.as_ref().map(|n| n.to_value()).transpose()?,
            3 => Some(self.title.to_value()?),
            4 => Some(self.numbers.to_value()?),
            5 => Some(self.tags.to_value()?),
            _ => None,
        })
    }

    fn set_partition_data(&mut self, index: usize, data: Value) -> Result<()> {
        match index {
            0 => self.items = FromValue::from_value(data)?,
            1 => self.by_id = FromValue::from_value(data)?,
            2 => self.nested = Some(FromValue::from_value(data)?),
            3 => self.title = FromValue::from_value(data)?,
            4 => self.numbers = FromValue::from_value(data)?,
            5 => self.tags = FromValue::from_value(data)?,
            _ => return Err(unknown_partition(index)),
        }
        Ok(())
    }

    fn partition_type(&self, index: usize) -> Option<TypeDesc> {
        Some(match index {
            0 => <Vec<SampleItem>>::type_desc(),
            1 => <HashMap<Uuid, SampleItem>>::type_desc(),
            2 => NestedItem::type_desc(),
            3 => String::type_desc(),
            4 => <Vec<i64>>::type_desc(),
            5 => <Vec<String>>::type_desc(),
            _ => return None,
        })
    }
}

/// Partitioned in parallel.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
struct Catalog {
    groups: HashMap<String, Vec<NestedItem>>,
    scores: BTreeSet<i32>,
    ranks: BTreeMap<i32, String>,
}

parcel_store::impl_record!(Catalog, "Catalog", partitioned);

impl Partitioned for Catalog {
    fn is_partitioning_parallelized(&self) -> bool {
        true
    }

    fn partition_count(&self) -> usize {
        3
    }

    fn partition_data(&self, index: usize) -> Result<Option<Value>> {
        Ok(match index {
            0 => Some(self.groups.to_value()?),
            1 => Some(self.scores.to_value()?),
            2 => Some(self.ranks.to_value()?),
            _ => None,
        })
    }

    fn set_partition_data(&mut self, index: usize, data: Value) -> Result<()> {
        match index {
            0 => self.groups = FromValue::from_value(data)?,
            1 => self.scores = FromValue::from_value(data)?,
            2 => self.ranks = FromValue::from_value(data)?,
            _ => return Err(unknown_partition(index)),
        }
        Ok(())
    }

    fn partition_type(&self, index: usize) -> Option<TypeDesc> {
        Some(match index {
            0 => <HashMap<String, Vec<NestedItem>>>::type_desc(),
            1 => <BTreeSet<i32>>::type_desc(),
            2 => <BTreeMap<i32, String>>::type_desc(),
            _ => return None,
        })
    }
}

/// Holds untyped cells and pairs, so every row keeps whatever type it was written with.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
struct Mixed {
    label: String,
    #[serde(skip)]
    cells: Vec<Value>,
    #[serde(skip)]
    pairs: Vec<(Value, Value)>,
}

parcel_store::impl_record!(Mixed, "Mixed", partitioned);

impl Partitioned for Mixed {
    fn partition_count(&self) -> usize {
        3
    }

    fn partition_data(&self, index: usize) -> Result<Option<Value>> {
        Ok(match index {
            0 => Some(self.label.to_value()?),
            1 => Some(Value::List(self.cells.clone())),
            2 => Some(Value::Map(self.pairs.clone())),
            _ => None,
        })
    }

    fn set_partition_data(&mut self, index: usize, data: Value) -> Result<()> {
        match (index, data) {
            (0, data) => self.label = FromValue::from_value(data)?,
            (1, Value::List(cells)) => self.cells = cells,
            (2, Value::Map(pairs)) => self.pairs = pairs,
            (index, _) => return Err(unknown_partition(index)),
        }
        Ok(())
    }

    fn partition_type(&self, index: usize) -> Option<TypeDesc> {
        match index {
            0 => Some(TypeDesc::Text),
            1 => Some(TypeDesc::List(None)),
            2 => Some(TypeDesc::Map(None)),
            _ => None,
        }
    }
}

/// Passthrough encryption that takes its time.
struct SlowEncryption(Duration);

impl Encryption for SlowEncryption {
    fn init(&self) -> bool {
        true
    }

    fn encrypt(&self, key: &str, plaintext: &str) -> Result<Vec<u8>> {
        std::thread::sleep(self.0);
        NoEncryption.encrypt(key, plaintext)
    }

    fn decrypt(&self, key: &str, ciphertext: &[u8]) -> Result<String> {
        NoEncryption.decrypt(key, ciphertext)
    }
}

fn builder() -> ParcelStoreBuilder {
    ParcelStoreBuilder::new()
        .register_record::<SampleItem>()
        .register_record::<NestedItem>()
        .register_partitioned::<SampleData>()
        .register_partitioned::<Catalog>()
        .register_partitioned::<Mixed>()
}

fn store() -> ParcelStore {
    builder().build()
}

fn sample() -> SampleData {
    let mut by_id = HashMap::new();
    by_id.insert(Uuid::new_v4(), SampleItem { name: "bolt".into(), quantity: 12 });
    by_id.insert(Uuid::new_v4(), SampleItem { name: "nut".into(), quantity: 40 });
    SampleData {
        items: vec![
            SampleItem { name: "washer".into(), quantity: 3 },
            SampleItem { name: "screw".into(), quantity: 7 },
        ],
        by_id,
        nested: Some(NestedItem { label: "crate".into(), weight: 2.5 }),
        title: "inventory".into(),
        numbers: vec![10, 20, 30],
        tags: vec!["hardware".into(), "metric".into()],
    }
}

fn catalog() -> Catalog {
    let mut groups = HashMap::new();
    groups.insert(
        "heavy".to_string(),
        vec![
            NestedItem { label: "anvil".into(), weight: 50.0 },
            NestedItem { label: "safe".into(), weight: 120.5 },
        ],
    );
    groups.insert("empty".to_string(), Vec::new());
    Catalog {
        groups,
        scores: [3, 1, 2].into_iter().collect(),
        ranks: [(1, "gold".to_string()), (2, "silver".to_string())].into_iter().collect(),
    }
}

#[tokio::test]
async fn test_list_round_trip() {
    let store = store();
    assert!(store.put("k", &vec![1i64, 3, 5, 7, 9]).await);
    assert_eq!(store.get::<Vec<i64>>("k").await, Some(vec![1, 3, 5, 7, 9]));
    assert!(store.contains("k").await);
    assert_eq!(store.count().await, 1);
}

#[tokio::test]
async fn test_scalars_and_maps_round_trip() {
    let store = store();
    assert!(store.put("flag", &true).await);
    assert!(store.put("pi", &3.25f64).await);
    assert!(store.put("empty", "").await);
    let id = Uuid::new_v4();
    assert!(store.put("id", &id).await);

    let mut by_number = HashMap::new();
    by_number.insert(4i32, SampleItem { name: "four".into(), quantity: 4 });
    assert!(store.put("by_number", &by_number).await);

    assert_eq!(store.get::<bool>("flag").await, Some(true));
    assert_eq!(store.get::<f64>("pi").await, Some(3.25));
    assert_eq!(store.get::<String>("empty").await.as_deref(), Some(""));
    assert_eq!(store.get::<Uuid>("id").await, Some(id));
    assert_eq!(store.get::<HashMap<i32, SampleItem>>("by_number").await, Some(by_number));
}

#[tokio::test]
async fn test_composite_round_trip() {
    let store = store();
    let data = sample();
    assert!(store.put("sample", &data).await);

    let loaded: SampleData = store.get("sample").await.unwrap();
    assert_eq!(loaded.items, data.items);
    assert_eq!(loaded.by_id, data.by_id);
    assert_eq!(loaded.nested, data.nested);
    assert_eq!(loaded.title, data.title);
    assert_eq!(loaded.numbers, data.numbers);
    assert_eq!(loaded.tags, data.tags);

    // The aggregate can also be read back through the dynamic value model.
    let value = store.get::<Value>("sample").await.unwrap();
    assert_eq!(value.type_desc(), TypeDesc::record("SampleData"));
}

#[tokio::test]
async fn test_partition_layout_and_delete() {
    let store = store();
    let baseline = store.count().await;
    assert!(store.put("sample", &sample()).await);

    // 2 metadata + (1 + 2*2) + (1 + 2*2) + 1 + 1 + (1 + 2*3) + (1 + 2*2)
    assert_eq!(store.count().await - baseline, 26);
    let facade = store.facade();
    for key in [
        "sample.partitions",
        "sample.type",
        "sample.0.rows",
        "sample.0.1",
        "sample.0.1.type",
        "sample.1.rows",
        "sample.2",
        "sample.3",
        "sample.4.2.type",
        "sample.5.rows",
    ] {
        assert!(facade.contains(key).await, "missing {}", key);
    }
    assert!(!facade.contains("sample").await);
    assert!(store.contains("sample").await);

    assert!(store.delete("sample").await);
    assert_eq!(store.count().await, baseline);
    assert!(!store.contains("sample").await);
    assert_eq!(store.get::<SampleData>("sample").await, None);
}

#[tokio::test]
async fn test_skipped_partition_keeps_default() {
    let store = store();
    let data = SampleData {
        nested: None,
        ..sample()
    };
    assert!(store.put("sample", &data).await);
    assert!(!store.facade().contains("sample.2").await);

    let loaded: SampleData = store.get("sample").await.unwrap();
    assert_eq!(loaded.nested, None);
    assert_eq!(loaded.title, "inventory");
}

#[tokio::test]
async fn test_heterogeneous_rows_keep_their_types() {
    let store = store();
    let cells = vec![
        Value::Int(1),
        Value::Long(2),
        Value::Text("three".into()),
        Value::Double(4.5),
        Value::Bool(true),
        Value::Uuid(Uuid::new_v4()),
    ];
    let mixed = Mixed {
        label: "row".into(),
        cells: cells.clone(),
        ..Mixed::default()
    };
    assert!(store.put("mixed", &mixed).await);

    let loaded: Mixed = store.get("mixed").await.unwrap();
    assert_eq!(loaded.cells, cells);
    assert_eq!(loaded.label, "row");
}

#[tokio::test]
async fn test_map_partition_with_mixed_key_types() {
    let store = store();
    let pairs = vec![
        (Value::Int(1), Value::Text("x".into())),
        (Value::Text("a".into()), Value::Long(2)),
        (Value::Text("b".into()), Value::List(vec![])),
        (Value::Long(3), Value::List(vec![Value::Double(0.5)])),
    ];
    let mixed = Mixed {
        label: "pairs".into(),
        pairs: pairs.clone(),
        ..Mixed::default()
    };
    assert!(store.put("mixed", &mixed).await);
    assert_eq!(
        store.facade().get_as("mixed.2.rows", Some(&TypeDesc::Long)).await,
        Some(Value::Long(4))
    );
    assert_eq!(
        store.facade().get("mixed.2.0.type").await,
        Some(Value::Text("PairDataInfo".into()))
    );

    let loaded: Mixed = store.get("mixed").await.unwrap();
    assert_eq!(loaded.pairs, pairs);
    assert_eq!(loaded, mixed);
}

#[tokio::test]
async fn test_mixed_collections_write_nothing() {
    let store = store();
    let mixed_list = Value::List(vec![Value::Long(1), Value::Double(2.5)]);
    let mixed_map = Value::Map(vec![
        (Value::Text("a".into()), Value::Long(1)),
        (Value::Text("b".into()), Value::Text("x".into())),
    ]);
    assert!(!store.put("list", &mixed_list).await);
    assert!(!store.put("map", &mixed_map).await);
    assert!(matches!(store.try_put("list", &mixed_list).await, Err(Error::Conversion(_))));

    // Untyped JSON as the command line reads it.
    let inferred = Value::infer(serde_json::json!({"a": 1, "b": "x"})).unwrap();
    assert!(!store.put("inferred", &inferred).await);

    // Rows may differ from each other, but a single row must be uniform.
    let mixed = Mixed {
        label: "row".into(),
        cells: vec![Value::Text("fine".into()), mixed_list.clone()],
        ..Mixed::default()
    };
    assert!(!store.put("mixed", &mixed).await);
    let nested = Mixed {
        label: "pair".into(),
        pairs: vec![(Value::Int(1), mixed_map.clone())],
        ..Mixed::default()
    };
    assert!(matches!(store.try_put("nested", &nested).await, Err(Error::Conversion(_))));

    assert_eq!(store.count().await, 0);
    assert!(!store.contains("mixed").await);
}

#[tokio::test]
async fn test_aggregate_type_tag_is_record_name() {
    let store = store();
    assert!(store.put("sample", &sample()).await);
    assert_eq!(
        store.facade().get("sample.type").await,
        Some(Value::Text(SampleData::TYPE_NAME.to_string()))
    );

    // Without a registration the aggregate has no name to store and could not be read back.
    let bare = ParcelStoreBuilder::new().build();
    assert!(!bare.put("sample", &sample()).await);
    assert!(matches!(bare.try_put("sample", &sample()).await, Err(Error::UnknownType(_))));
    assert_eq!(bare.count().await, 0);
}

#[tokio::test]
async fn test_parallel_partitions_round_trip() {
    let store = store();
    let data = catalog();
    assert!(store.put("catalog", &data).await);

    let loaded: Catalog = store.get("catalog").await.unwrap();
    assert_eq!(loaded, data);
    assert_eq!(loaded.ranks.get(&1).map(String::as_str), Some("gold"));
}

#[tokio::test]
async fn test_parallel_timeout_writes_nothing() {
    let store = builder()
        .encryption(Arc::new(SlowEncryption(Duration::from_millis(100))))
        .partition_timeout(Duration::from_millis(50))
        .build();

    assert!(!store.put("catalog", &catalog()).await);
    assert!(matches!(store.try_put("catalog", &catalog()).await, Err(Error::Timeout(_))));

    // Aborted partitions must not show up later either.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.count().await, 0);
    assert!(!store.contains("catalog").await);
}

#[tokio::test]
async fn test_size_ceiling_writes_nothing() {
    let store = builder()
        .limits(Limits {
            max_collection_size: 2,
            ..Limits::default()
        })
        .build();

    assert!(!store.put("sample", &sample()).await);
    assert!(matches!(store.try_put("sample", &sample()).await, Err(Error::SizeLimit(_))));
    assert!(!store.put("list", &vec![1i64, 2, 3]).await);
    assert_eq!(store.count().await, 0);

    assert!(store.put("list", &vec![1i64, 2]).await);
    assert_eq!(store.count().await, 1);
}

#[tokio::test]
async fn test_overwrite_removes_stale_layout() {
    let store = store();
    let mut data = sample();
    data.numbers = (0..20).collect();
    assert!(store.put("sample", &data).await);
    let large = store.count().await;

    data.numbers = vec![1];
    assert!(store.put("sample", &data).await);
    assert_eq!(large - store.count().await, 2 * 19);
    assert_eq!(store.get::<SampleData>("sample").await.unwrap().numbers, vec![1]);

    assert!(store.put("sample", "now plain").await);
    assert_eq!(store.count().await, 1);
    assert!(!store.facade().contains("sample.partitions").await);
    assert_eq!(store.get::<String>("sample").await.as_deref(), Some("now plain"));
}

#[tokio::test]
async fn test_missing_keys() {
    let store = store();
    assert!(!store.delete("missing-key").await);
    assert!(!store.contains("missing-key").await);
    assert_eq!(store.get::<i64>("missing-key").await, None);
    assert_eq!(store.get_or("missing-key", 7i64).await, 7);
    assert!(!store.put("", &1i64).await);
}

#[tokio::test]
async fn test_unknown_row_type_aborts_read() {
    let store = store();
    assert!(store.put("sample", &sample()).await);
    assert!(store.facade().put("sample.0.0.type", Value::Text("Missing".into())).await);

    assert_eq!(store.get::<SampleData>("sample").await, None);
    assert!(matches!(store.try_get::<SampleData>("sample").await, Err(Error::UnknownType(_))));
}

#[tokio::test]
async fn test_encrypted_store() {
    let storage = Arc::new(MemoryStorage::new());
    let store = builder()
        .storage(storage.clone())
        .master_key(b"thisis32byteslongsecretkey123456")
        .build();

    assert!(store.put("sample", &sample()).await);
    for raw in storage.snapshot().await.values() {
        assert!(!raw.contains("inventory"));
        assert!(!raw.contains("washer"));
    }
    assert_eq!(store.get::<SampleData>("sample").await.unwrap().title, "inventory");

    assert!(store.delete_all().await);
    assert_eq!(store.count().await, 0);
}

#[tokio::test]
async fn test_file_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let key = b"thisis32byteslongsecretkey123456";
    let data = sample();
    {
        let store = parcel_store::open_with(dir.path(), Some(key), builder()).unwrap();
        assert!(store.put("sample", &data).await);
        assert!(store.put("numbers", &vec![1i64, 3, 5, 7, 9]).await);
    }

    let store = parcel_store::open_with(dir.path(), Some(key), builder()).unwrap();
    assert_eq!(store.get::<SampleData>("sample").await, Some(data));
    assert_eq!(store.get::<Vec<i64>>("numbers").await, Some(vec![1, 3, 5, 7, 9]));
}

#[tokio::test]
async fn test_disabled_partitioning_stores_whole_record() {
    #[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
    struct Whole {
        values: Vec<i64>,
    }

    parcel_store::impl_record!(Whole, "Whole", partitioned);

    impl Partitioned for Whole {
        fn is_partitioning_enabled(&self) -> bool {
            false
        }

        fn partition_count(&self) -> usize {
            1
        }

        fn partition_data(&self, _index: usize) -> Result<Option<Value>> {
            Ok(Some(self.values.to_value()?))
        }

        fn set_partition_data(&mut self, _index: usize, data: Value) -> Result<()> {
            self.values = FromValue::from_value(data)?;
            Ok(())
        }

        fn partition_type(&self, _index: usize) -> Option<TypeDesc> {
            Some(<Vec<i64>>::type_desc())
        }
    }

    let storage = Arc::new(MemoryStorage::new());
    let store = builder().register_partitioned::<Whole>().storage(storage.clone()).build();
    let whole = Whole { values: vec![4, 5] };
    assert!(store.put("whole", &whole).await);
    assert_eq!(storage.count().await.unwrap(), 1);
    assert_eq!(store.get::<Whole>("whole").await, Some(whole));
}
