//! End-to-end coverage over the memory backend: every operation goes
//! through schema registration, program building, the script cache, one
//! atomic invocation, and reply decoding.

use burrowdb::prelude::*;
use burrowdb::{DbError, SchemaError};
use chrono::NaiveDate;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn author_schema() -> ModelSchema {
    ModelSchema::new("author", "name")
        .field("name", FieldKind::Scalar(ScalarKind::Text))
        .field(
            "active_years",
            FieldKind::TupleOf(vec![
                TupleSlot::Scalar(ScalarKind::Int),
                TupleSlot::Scalar(ScalarKind::Int),
            ]),
        )
}

fn book_schema() -> ModelSchema {
    ModelSchema::new("book", "title")
        .field("title", FieldKind::Scalar(ScalarKind::Text))
        .field(
            "author",
            FieldKind::Optional(Box::new(FieldKind::Nested("author".to_string()))),
        )
        .field(
            "rating",
            FieldKind::Optional(Box::new(FieldKind::Scalar(ScalarKind::Float))),
        )
        .field(
            "published_on",
            FieldKind::Optional(Box::new(FieldKind::Scalar(ScalarKind::Date))),
        )
        .field(
            "tags",
            FieldKind::Optional(Box::new(FieldKind::Scalar(ScalarKind::Json))),
        )
        .field(
            "in_stock",
            FieldKind::Optional(Box::new(FieldKind::Scalar(ScalarKind::Bool))),
        )
        .field(
            "editions",
            FieldKind::Optional(Box::new(FieldKind::ListOfNested("book".to_string()))),
        )
}

fn library_store() -> Store<MemoryBackend> {
    let mut store = Store::new(MemoryBackend::new());
    store
        .register_schemas([author_schema(), book_schema()])
        .expect("schemas should register and resolve");
    store
}

fn jane() -> Record {
    Record::new().with("name", "Jane Austen").with(
        "active_years",
        Value::Tuple(vec![1580.into(), 1640.into()]),
    )
}

fn emma() -> Record {
    Record::new()
        .with("title", "Emma")
        .with("author", jane())
        .with("rating", 4.0)
        .with(
            "published_on",
            NaiveDate::from_ymd_opt(1815, 12, 23).expect("valid date"),
        )
        .with(
            "tags",
            Value::List(vec!["Classic".into(), "Romance".into()]),
        )
        .with("in_stock", true)
}

fn titles(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| {
            r.get("title")
                .and_then(Value::as_text)
                .expect("title field")
                .to_string()
        })
        .collect()
}

#[test]
fn insert_then_select_round_trips_every_field_shape() {
    init_tracing();
    let store = library_store();
    let original = emma();

    store
        .insert("book", &[original.clone()], None)
        .expect("insert should succeed");

    let got = store
        .select("book", &Select::all())
        .expect("select should succeed");
    assert_eq!(got.len(), 1);
    assert_eq!(got[0], original, "every field shape must round-trip exactly");

    let author = got[0]
        .get("author")
        .and_then(Value::as_record)
        .expect("author should come back as a record");
    assert_eq!(
        author.get("active_years"),
        Some(&Value::Tuple(vec![1580.into(), 1640.into()]))
    );
}

#[test]
fn nested_records_are_shared_and_independently_selectable() {
    let store = library_store();
    let persuasion = Record::new().with("title", "Persuasion").with("author", jane());
    store
        .insert("book", &[emma(), persuasion], None)
        .expect("insert");

    // One author hash, addressable by its own schema and key.
    let authors = store
        .select(
            "author",
            &Select::by_ids([Value::Text("Jane Austen".to_string())]),
        )
        .expect("select author");
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0], jane());
}

#[test]
fn updating_a_shared_nested_record_is_visible_through_every_parent() {
    let store = library_store();
    let persuasion = Record::new().with("title", "Persuasion").with("author", jane());
    store
        .insert("book", &[emma(), persuasion], None)
        .expect("insert");

    let corrected = Value::Tuple(vec![1775.into(), 1817.into()]);
    store
        .update(
            "author",
            &Value::Text("Jane Austen".to_string()),
            &Record::new().with("active_years", corrected.clone()),
            None,
        )
        .expect("update author");

    let books = store.select("book", &Select::all()).expect("select books");
    assert_eq!(books.len(), 2);
    for book in &books {
        let author = book
            .get("author")
            .and_then(Value::as_record)
            .expect("author record");
        assert_eq!(
            author.get("active_years"),
            Some(&corrected),
            "both parents must observe the shared update"
        );
    }
}

#[test]
fn pagination_windows_are_exact_and_in_insertion_order() {
    let store = library_store();
    for title in ["K1", "K2", "K3", "K4"] {
        store
            .insert("book", &[Record::new().with("title", title)], None)
            .expect("insert");
    }

    let page = store
        .select("book", &Select::all().skip(1).limit(2))
        .expect("paged select");
    assert_eq!(titles(&page), vec!["K2", "K3"]);

    let rest = store
        .select("book", &Select::all().skip(3))
        .expect("open-ended select");
    assert_eq!(titles(&rest), vec!["K4"]);
}

#[test]
fn explicit_ids_come_back_in_request_order_and_ignore_pagination() {
    let store = library_store();
    for title in ["K1", "K2", "K3"] {
        store
            .insert("book", &[Record::new().with("title", title)], None)
            .expect("insert");
    }

    let request = Select::by_ids([
        Value::Text("K3".to_string()),
        Value::Text("K1".to_string()),
    ])
    .skip(5)
    .limit(1);
    let got = store.select("book", &request).expect("select by ids");
    assert_eq!(
        titles(&got),
        vec!["K3", "K1"],
        "request order wins; skip and limit do not apply to explicit ids"
    );
}

#[test]
fn unknown_ids_are_silently_omitted() {
    let store = library_store();
    store
        .insert("book", &[Record::new().with("title", "K1")], None)
        .expect("insert");

    let got = store
        .select(
            "book",
            &Select::by_ids([
                Value::Text("ghost".to_string()),
                Value::Text("K1".to_string()),
            ]),
        )
        .expect("select");
    assert_eq!(titles(&got), vec!["K1"], "missing ids are not errors");
}

#[test]
fn delete_removes_the_parent_but_never_cascades() {
    let store = library_store();
    store.insert("book", &[emma()], None).expect("insert");

    store
        .delete("book", &[Value::Text("Emma".to_string())])
        .expect("delete");

    let books = store.select("book", &Select::all()).expect("select books");
    assert!(books.is_empty(), "deleted id must leave the index");

    let authors = store
        .select(
            "author",
            &Select::by_ids([Value::Text("Jane Austen".to_string())]),
        )
        .expect("select author");
    assert_eq!(authors.len(), 1, "nested record keeps its own lifecycle");
}

#[test]
fn call_ttl_expires_every_written_key() {
    let store = library_store();
    store
        .insert("book", &[emma()], Some(Duration::from_secs(2)))
        .expect("insert with ttl");

    assert_eq!(
        store.select("book", &Select::all()).expect("select").len(),
        1
    );

    store.backend().advance(Duration::from_secs(2));

    assert!(
        store.select("book", &Select::all()).expect("select").is_empty(),
        "record and index expire together"
    );
    assert!(
        store
            .select(
                "author",
                &Select::by_ids([Value::Text("Jane Austen".to_string())]),
            )
            .expect("select author")
            .is_empty(),
        "ttl propagates to nested writes in the same call"
    );
}

#[test]
fn store_default_ttl_applies_when_the_call_gives_none() {
    let mut store = Store::with_config(
        MemoryBackend::new(),
        StoreConfig::new().with_default_ttl(Duration::from_secs(1)),
    );
    store
        .register_schemas([author_schema(), book_schema()])
        .expect("register");

    store
        .insert("book", &[Record::new().with("title", "K1")], None)
        .expect("insert");
    store.backend().advance(Duration::from_secs(1));

    assert!(
        store.select("book", &Select::all()).expect("select").is_empty(),
        "default ttl fills in for calls without one"
    );
}

#[test]
fn update_merges_and_keeps_omitted_nested_pointers() {
    let store = library_store();
    store.insert("book", &[emma()], None).expect("insert");

    store
        .update(
            "book",
            &Value::Text("Emma".to_string()),
            &Record::new().with("rating", 5.0).with("in_stock", false),
            None,
        )
        .expect("update");

    let got = store
        .select("book", &Select::by_ids([Value::Text("Emma".to_string())]))
        .expect("select");
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].get("rating"), Some(&Value::Float(5.0)));
    assert_eq!(got[0].get("in_stock"), Some(&Value::Bool(false)));
    assert_eq!(
        got[0].get("author").and_then(Value::as_record),
        Some(&jane()),
        "fields omitted from the partial keep their values, pointers included"
    );
}

#[test]
fn column_selects_resolve_nested_fields_fully() {
    let store = library_store();
    store.insert("book", &[emma()], None).expect("insert");

    let got = store
        .select("book", &Select::all().columns(["title", "author"]))
        .expect("column select");
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].get("title"), Some(&Value::Text("Emma".to_string())));
    assert!(
        got[0].get("author").and_then(Value::as_record).is_some(),
        "a requested nested column is a record, never a raw pointer"
    );
    assert_eq!(
        got[0].get_or_null("rating"),
        Value::Null,
        "unrequested columns stay absent"
    );
}

#[test]
fn list_of_nested_round_trips_through_shared_keys() {
    let store = library_store();
    let first = Record::new().with("title", "Emma (1st)");
    let second = Record::new().with("title", "Emma (2nd)");
    let collected = Record::new()
        .with("title", "Emma, Collected")
        .with("editions", Value::List(vec![first.clone().into(), second.clone().into()]));

    store.insert("book", &[collected.clone()], None).expect("insert");

    let got = store
        .select(
            "book",
            &Select::by_ids([Value::Text("Emma, Collected".to_string())]),
        )
        .expect("select");
    assert_eq!(got.len(), 1);
    assert_eq!(got[0], collected, "list elements resolve in order");
}

#[test]
fn resolve_depth_bounds_pointer_chasing() {
    let mut store = Store::with_config(
        MemoryBackend::new(),
        StoreConfig::new().with_max_resolve_depth(1),
    );
    store
        .register_schemas([ModelSchema::new("node", "id")
            .field("id", FieldKind::Scalar(ScalarKind::Text))
            .field(
                "next",
                FieldKind::Optional(Box::new(FieldKind::Nested("node".to_string()))),
            )])
        .expect("register");

    let chain = Record::new().with("id", "a").with(
        "next",
        Record::new()
            .with("id", "b")
            .with("next", Record::new().with("id", "c")),
    );
    store.insert("node", &[chain], None).expect("insert");

    let got = store
        .select("node", &Select::by_ids([Value::Text("a".to_string())]))
        .expect("select");
    let b = got[0]
        .get("next")
        .and_then(Value::as_record)
        .expect("one hop resolves");
    assert_eq!(
        b.get_or_null("next"),
        Value::Null,
        "references past the depth bound decode as absent"
    );
}

#[test]
fn pointer_cycles_surface_as_errors_on_select() {
    let mut store = Store::new(MemoryBackend::new());
    store
        .register_schemas([ModelSchema::new("node", "id")
            .field("id", FieldKind::Scalar(ScalarKind::Text))
            .field(
                "next",
                FieldKind::Optional(Box::new(FieldKind::Nested("node".to_string()))),
            )])
        .expect("register");

    store
        .insert(
            "node",
            &[Record::new()
                .with("id", "a")
                .with("next", Record::new().with("id", "b"))],
            None,
        )
        .expect("insert chain");
    // Point b back at a, closing the loop through stored data.
    store
        .update(
            "node",
            &Value::Text("b".to_string()),
            &Record::new().with("next", Record::new().with("id", "a")),
            None,
        )
        .expect("update b");

    let err = store
        .select("node", &Select::by_ids([Value::Text("a".to_string())]))
        .expect_err("a -> b -> a must not decode");
    assert!(
        matches!(err, DbError::CyclicReference { ref key, .. } if key == "node:a"),
        "error should name the revisited key, got: {err}"
    );
}

#[test]
fn ttl_on_a_later_write_governs_a_shared_nested_record() {
    let store = library_store();
    store.insert("author", &[jane()], None).expect("insert author");
    store.insert("book", &[emma()], None).expect("insert book");

    store.backend().advance(Duration::from_secs(3_600));
    let authors = store
        .select(
            "author",
            &Select::by_ids([Value::Text("Jane Austen".to_string())]),
        )
        .expect("select author");
    assert_eq!(
        authors.len(),
        1,
        "a ttl-free parent write leaves the shared record unexpiring"
    );

    let persuasion = Record::new().with("title", "Persuasion").with("author", jane());
    store
        .insert("book", &[persuasion], Some(Duration::from_secs(2)))
        .expect("insert with ttl");
    store.backend().advance(Duration::from_secs(2));

    assert!(
        store
            .select(
                "author",
                &Select::by_ids([Value::Text("Jane Austen".to_string())]),
            )
            .expect("select author")
            .is_empty(),
        "a ttl-bearing write rewrites the shared record's expiry"
    );
}

#[test]
fn repeated_call_shapes_reuse_one_loaded_script() {
    let store = library_store();
    store
        .insert("book", &[Record::new().with("title", "K1")], None)
        .expect("first insert");
    let after_first = store.backend().load_count();

    store
        .insert("book", &[Record::new().with("title", "K2")], None)
        .expect("second insert");
    assert_eq!(
        store.backend().load_count(),
        after_first,
        "same-shape calls must hit the script cache"
    );

    store.select("book", &Select::all()).expect("first select");
    let after_select = store.backend().load_count();
    store.select("book", &Select::all()).expect("second select");
    assert_eq!(store.backend().load_count(), after_select);
}

#[test]
fn operations_require_a_resolved_registry() {
    let mut store = Store::new(MemoryBackend::new());
    store
        .register_schema(book_schema())
        .expect("single registration is fine unresolved");

    let err = store
        .insert("book", &[Record::new().with("title", "K1")], None)
        .expect_err("ops must not run before resolve");
    assert!(matches!(
        err,
        DbError::Schema(SchemaError::RegistryUnresolved)
    ));

    let err = store.resolve_schemas().expect_err("author is missing");
    assert!(matches!(
        err,
        DbError::Schema(SchemaError::UnresolvedReference { ref target, .. }) if target == "author"
    ));
}

#[test]
fn unregistered_models_are_rejected() {
    let store = library_store();
    let err = store
        .select("publisher", &Select::all())
        .expect_err("unknown model");
    assert!(matches!(err, DbError::NotRegistered(ref m) if m == "publisher"));
}
