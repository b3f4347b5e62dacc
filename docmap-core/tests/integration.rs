//! Integration tests exercising full encode/decode passes through the public API.

use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};

use docmap_core::{
    Binary, DecodeError, DecodeOptions, DescriptorError, Document, EncodeError, EncodeOptions,
    Record, Registry, StructCodecOptions, TagConvention, Timestamp, TreeReader, Value, cbor, doc,
    from_document, to_document,
};
use indexmap::IndexMap;

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Address {
    pub street: String,
    pub city: String,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Profile {
    #[docmap(tag = "_id")]
    pub id: String,
    pub age: i64,
    pub visits: u64,
    pub ratio: f64,
    pub active: bool,
    pub tags: Vec<String>,
    pub scores: BTreeMap<String, i32>,
    pub home: Option<Address>,
    pub joined: Timestamp,
    pub avatar: Binary,
    #[docmap(tag = "-")]
    pub cached: i32,
}

fn sample_profile() -> Profile {
    let mut scores = BTreeMap::new();
    scores.insert("math".to_string(), 91);
    scores.insert("art".to_string(), 78);
    Profile {
        id: "u-1".into(),
        age: 36,
        visits: 12,
        ratio: 0.5,
        active: true,
        tags: vec!["admin".into(), "ops".into()],
        scores,
        home: Some(Address {
            street: "1 Main St".into(),
            city: "Springfield".into(),
        }),
        joined: Timestamp::from_millis(1_700_000_000_000),
        avatar: Binary::new(vec![0xde, 0xad]),
        cached: 0,
    }
}

#[test]
fn round_trip_reproduces_every_field() {
    let profile = sample_profile();
    let document = to_document(&profile).unwrap();

    assert_eq!(document.get("_id"), Some(&Value::from("u-1")));
    assert_eq!(
        document.get_document("home"),
        Some(&doc! { "street" => "1 Main St", "city" => "Springfield" })
    );
    assert!(!document.contains_key("cached"));

    let back: Profile = from_document(document).unwrap();
    assert_eq!(back, profile);
}

#[test]
fn skipped_fields_are_left_alone_on_decode() {
    let mut profile = Profile {
        cached: 9,
        ..Profile::default()
    };
    Registry::new()
        .decode_into(
            doc! { "cached" => 1, "age" => 2 },
            &mut profile,
            &DecodeOptions::default(),
        )
        .unwrap();
    assert_eq!(profile.cached, 9);
    assert_eq!(profile.age, 2);
}

#[derive(Debug, Default, PartialEq, Record)]
struct Sparse {
    #[docmap(tag = ",omitempty")]
    pub name: String,
    #[docmap(tag = ",omitempty")]
    pub count: i32,
    #[docmap(tag = ",omitempty")]
    pub items: Vec<i64>,
    #[docmap(tag = ",omitempty")]
    pub lookup: BTreeMap<String, String>,
    #[docmap(tag = ",omitempty")]
    pub parent: Option<Address>,
    #[docmap(tag = ",omitempty")]
    pub seen: Timestamp,
}

#[test]
fn all_empty_omitempty_struct_encodes_to_empty_document() {
    assert_eq!(to_document(&Sparse::default()).unwrap(), Document::new());

    let partial = Sparse {
        count: 3,
        ..Sparse::default()
    };
    assert_eq!(to_document(&partial).unwrap(), doc! { "count" => 3 });
}

#[test]
fn context_omit_empty_covers_every_field() {
    let options = EncodeOptions {
        omit_empty: true,
        ..EncodeOptions::default()
    };
    let encoded = Registry::new()
        .encode_document(&Address::default(), &options)
        .unwrap();
    assert!(encoded.is_empty());
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Base {
    pub id: String,
    pub version: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Article {
    #[docmap(tag = ",inline")]
    pub base: Base,
    pub title: String,
}

#[test]
fn inline_struct_flattens_and_round_trips() {
    let article = Article {
        base: Base {
            id: "a-7".into(),
            version: 2,
        },
        title: "Hello".into(),
    };
    let document = to_document(&article).unwrap();
    assert_eq!(
        document,
        doc! { "id" => "a-7", "version" => 2, "title" => "Hello" }
    );
    assert_eq!(document.keys().collect::<Vec<_>>(), ["id", "version", "title"]);

    let back: Article = from_document(document).unwrap();
    assert_eq!(back, article);
}

#[derive(Debug, Default, Record)]
struct Left {
    pub name: String,
}

#[derive(Debug, Default, Record)]
struct Right {
    pub name: String,
}

#[derive(Debug, Default, Record)]
struct Siblings {
    #[docmap(tag = ",inline")]
    pub left: Left,
    #[docmap(tag = ",inline")]
    pub right: Right,
}

#[derive(Debug, Default, PartialEq, Record)]
struct Shadowing {
    pub id: i64,
    #[docmap(tag = ",inline")]
    pub base: Base,
}

#[test]
fn equal_depth_collision_is_a_duplicate_key() {
    let err = to_document(&Siblings::default()).unwrap_err();
    assert!(matches!(
        err,
        EncodeError::Descriptor(DescriptorError::DuplicateKey { ref name, .. }) if name == "name"
    ));

    let err = from_document::<Siblings>(doc! { "name" => "x" }).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Descriptor(DescriptorError::DuplicateKey { .. })
    ));
}

#[test]
fn shallower_field_wins_a_collision() {
    let value = Shadowing {
        id: 5,
        base: Base {
            id: "hidden".into(),
            version: 1,
        },
    };
    let document = to_document(&value).unwrap();
    assert_eq!(document, doc! { "id" => 5i64, "version" => 1 });

    let back: Shadowing = from_document(doc! { "id" => 8i64, "version" => 3 }).unwrap();
    assert_eq!(back.id, 8);
    assert_eq!(back.base.id, "");
    assert_eq!(back.base.version, 3);

    let strict = EncodeOptions {
        error_on_inline_duplicates: true,
        ..EncodeOptions::default()
    };
    assert!(Registry::new().encode_document(&value, &strict).is_err());
}

#[derive(Debug, Default, PartialEq, Record)]
struct Loose {
    pub name: String,
    #[docmap(tag = ",inline")]
    pub rest: IndexMap<String, Value>,
}

#[derive(Debug, Default, PartialEq, Record)]
struct Closed {
    pub name: String,
}

#[test]
fn inline_map_catches_unmatched_names() {
    let input = doc! { "name" => "n", "x" => 1, "y" => "z" };
    let loose: Loose = from_document(input.clone()).unwrap();
    assert_eq!(loose.name, "n");
    assert_eq!(loose.rest.len(), 2);
    assert_eq!(loose.rest.get("x"), Some(&Value::Int32(1)));
    assert_eq!(loose.rest.get("y"), Some(&Value::from("z")));

    assert_eq!(to_document(&loose).unwrap(), input);

    let closed: Closed = from_document(input).unwrap();
    assert_eq!(closed, Closed { name: "n".into() });
}

#[derive(Debug, Default, PartialEq, Record)]
struct Envelope {
    pub label: String,
    #[docmap(tag = ",inline")]
    pub meta: Option<Base>,
}

#[test]
fn none_inline_pointer_contributes_nothing() {
    let envelope = Envelope {
        label: "l".into(),
        meta: None,
    };
    assert_eq!(to_document(&envelope).unwrap(), doc! { "label" => "l" });

    let back: Envelope = from_document(doc! { "label" => "l", "id" => "m-1" }).unwrap();
    assert_eq!(
        back.meta,
        Some(Base {
            id: "m-1".into(),
            version: 0,
        })
    );
}

#[test]
fn null_document_resets_destination() {
    let registry = Registry::new();
    let mut profile = sample_profile();
    let mut reader = TreeReader::new(Value::Null);
    registry
        .decode_from(&mut reader, &mut profile, &DecodeOptions::default())
        .unwrap();
    assert_eq!(profile, Profile::default());
    assert!(reader.is_exhausted());
}

#[derive(Debug, Default, Record)]
struct Level3 {
    pub c: i32,
}

#[derive(Debug, Default, Record)]
struct Level2 {
    pub b: Level3,
}

#[derive(Debug, Default, Record)]
struct Level1 {
    pub a: Level2,
}

#[test]
fn nested_failure_reports_key_path() {
    let input = doc! { "a" => doc! { "b" => doc! { "c" => "oops" } } };
    let err = from_document::<Level1>(input).unwrap_err();
    assert_eq!(err.keys(), ["a", "b", "c"]);
    assert!(matches!(
        err.root_cause(),
        DecodeError::IncompatibleType { .. }
    ));
    assert!(err.to_string().starts_with("error decoding key a.b.c: "));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_use_converges_on_one_descriptor() {
    const CALLERS: usize = 16;
    let registry = Arc::new(Registry::new());
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            tokio::task::spawn_blocking(move || {
                barrier.wait();
                registry.describe::<Article>(TagConvention::Native)
            })
        })
        .collect();

    let mut descriptors = Vec::with_capacity(CALLERS);
    for handle in handles {
        descriptors.push(handle.await.unwrap().unwrap());
    }
    let first = &descriptors[0];
    assert!(descriptors.iter().all(|d| Arc::ptr_eq(d, first)));
    assert_eq!(registry.struct_codec().cached_descriptors(), 2);
}

#[derive(Debug, Default, Clone, PartialEq, Record)]
struct Release {
    #[docmap(tag = ",inline")]
    pub base: Base,
    pub downloads: i64,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_round_trips_on_unseen_type_agree() {
    const CALLERS: usize = 16;
    let registry = Arc::new(Registry::new());
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            tokio::task::spawn_blocking(move || {
                let release = Release {
                    base: Base {
                        id: format!("r-{i}"),
                        version: i as i32,
                    },
                    downloads: i as i64 * 100,
                };
                barrier.wait();
                let encoded = registry
                    .encode_document(&release, &EncodeOptions::default())
                    .unwrap();
                let decoded: Release = registry
                    .decode_document(encoded.clone(), &DecodeOptions::default())
                    .unwrap();
                (release, encoded, decoded)
            })
        })
        .collect();

    for handle in handles {
        let (release, encoded, decoded) = handle.await.unwrap();
        assert_eq!(decoded, release);
        assert_eq!(encoded.keys().collect::<Vec<_>>(), ["id", "version", "downloads"]);
    }

    let first = registry.describe::<Release>(TagConvention::Native).unwrap();
    let again = registry.describe::<Release>(TagConvention::Native).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(registry.struct_codec().cached_descriptors(), 2);
}

#[derive(Debug, Default, PartialEq, Record)]
struct Contact {
    #[docmap(json = "full_name,omitempty")]
    pub name: String,
    #[docmap(tag = "mail", json = "email")]
    pub email: String,
}

#[test]
fn json_tags_apply_when_enabled() {
    let contact = Contact {
        name: "Ada".into(),
        email: "ada@example.com".into(),
    };
    let registry = Registry::new();

    let native = registry
        .encode_document(&contact, &EncodeOptions::default())
        .unwrap();
    assert_eq!(native.keys().collect::<Vec<_>>(), ["name", "mail"]);

    let json = EncodeOptions {
        use_json_struct_tags: true,
        ..EncodeOptions::default()
    };
    let encoded = registry.encode_document(&contact, &json).unwrap();
    assert_eq!(encoded.keys().collect::<Vec<_>>(), ["full_name", "mail"]);

    let decode = DecodeOptions {
        use_json_struct_tags: true,
        ..DecodeOptions::default()
    };
    let back: Contact = registry.decode_document(encoded, &decode).unwrap();
    assert_eq!(back, contact);
}

#[test]
fn cbor_round_trip_of_encoded_struct() {
    let profile = sample_profile();
    let bytes = cbor::to_vec(&to_document(&profile).unwrap()).unwrap();
    let back: Profile = from_document(cbor::from_slice(&bytes).unwrap()).unwrap();
    assert_eq!(back, profile);
}

#[test]
fn struct_codec_options_load_from_json() {
    let options: StructCodecOptions =
        serde_json::from_str(r#"{"encode_omit_default_struct": true}"#).unwrap();
    let registry = Registry::with_struct_options(options);

    #[derive(Debug, Default, Record)]
    struct Holder {
        #[docmap(tag = ",omitempty")]
        pub address: Address,
        pub note: String,
    }

    let encoded = registry
        .encode_document(&Holder::default(), &EncodeOptions::default())
        .unwrap();
    assert_eq!(encoded, doc! { "note" => "" });
}

#[test]
fn zero_structs_clears_unset_fields() {
    let registry = Registry::new();
    let mut address = Address {
        street: "old".into(),
        city: "old".into(),
    };
    let options = DecodeOptions {
        zero_structs: true,
        ..DecodeOptions::default()
    };
    registry
        .decode_into(doc! { "city" => "new" }, &mut address, &options)
        .unwrap();
    assert_eq!(address, Address {
        street: String::new(),
        city: "new".into(),
    });
}
