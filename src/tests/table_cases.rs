use crate::res::config::ResConfig;
use crate::res::table::ResourceTable;
use crate::tests::fixtures::{package_chunk, simple_entry, table_chunk, type_chunk};
use crate::types::{ResourceId, Value, TYPE_INT_DEC, TYPE_STRING};
use crate::values::{Injectable, Str};
use crate::{DecodeError, ResourceFile};

/// Two locale variants plus a density-qualified one for the same
/// string, and an integer in a second package.
fn layered_table() -> Vec<u8> {
    let mut hdpi = ResConfig::DEFAULT;
    hdpi.density = 240;
    let strings = vec![
        type_chunk(
            1,
            &ResConfig::DEFAULT,
            &[Some(simple_entry(0, TYPE_STRING, 0))],
        ),
        type_chunk(
            1,
            &ResConfig::with_locale("de", ""),
            &[Some(simple_entry(0, TYPE_STRING, 1))],
        ),
        type_chunk(1, &hdpi, &[Some(simple_entry(0, TYPE_STRING, 2))]),
    ];
    let app = package_chunk(0x7F, "com.example.app", &["string"], &["greeting"], &strings);

    let framework_types = vec![type_chunk(
        1,
        &ResConfig::DEFAULT,
        &[Some(simple_entry(0, TYPE_INT_DEC, 400))],
    )];
    let framework = package_chunk(
        0x01,
        "android",
        &["integer"],
        &["config_longAnimTime"],
        &framework_types,
    );

    table_chunk(&["Hello", "Hallo", "Hello (hdpi)"], &[app, framework])
}

#[test]
fn dispatch_classifies_tables() {
    match ResourceFile::from_bytes(&layered_table()).unwrap() {
        ResourceFile::Table(table) => assert_eq!(table.packages().len(), 2),
        ResourceFile::Xml(_) => panic!("classified as xml"),
    }
}

#[test]
fn packages_keep_document_order_and_ids() {
    let table = ResourceTable::from_bytes(&layered_table()).unwrap();
    assert_eq!(table.packages()[0].name, "com.example.app");
    assert_eq!(table.packages()[1].name, "android");
    assert!(table.package(0x7F).is_some());
    assert!(table.package(0x01).is_some());
    assert!(table.package(0x02).is_none());
}

#[test]
fn locale_and_density_requests_pick_their_variants() {
    let table = ResourceTable::from_bytes(&layered_table()).unwrap();
    let id = ResourceId::new(0x7F010000);

    assert_eq!(
        table.get_resource(id, &ResConfig::DEFAULT).unwrap(),
        Value::Str("Hello".to_string())
    );
    assert_eq!(
        table
            .get_resource(id, &ResConfig::with_locale("de", "DE"))
            .unwrap(),
        Value::Str("Hallo".to_string())
    );

    let mut hdpi_request = ResConfig::DEFAULT;
    hdpi_request.density = 240;
    assert_eq!(
        table.get_resource(id, &hdpi_request).unwrap(),
        Value::Str("Hello (hdpi)".to_string())
    );
}

#[test]
fn cross_package_lookups_are_independent() {
    let table = ResourceTable::from_bytes(&layered_table()).unwrap();
    assert_eq!(
        table
            .get_resource(ResourceId::new(0x01010000), &ResConfig::DEFAULT)
            .unwrap(),
        Value::Int(400)
    );
    assert_eq!(
        table.resource_name(ResourceId::new(0x01010000)).as_deref(),
        Some("@android:integer/config_longAnimTime")
    );
}

#[test]
fn facades_resolve_against_a_decoded_table() {
    let data = layered_table();
    let table = ResourceTable::from_bytes(&data).unwrap();
    let config = ResConfig::with_locale("de", "");

    let mut label = Str::from_value("@0x7F010000");
    label.inject(&table, &config);
    assert_eq!(label.get().unwrap(), "Hallo");

    let mut by_name = Str::from_value("@com.example.app:string/greeting");
    by_name.inject(&table, &config);
    assert_eq!(by_name.get().unwrap(), "Hallo");
}

#[test]
fn table_decode_is_pure() {
    let data = layered_table();
    let table = ResourceTable::from_bytes(&data).unwrap();
    let id = ResourceId::new(0x7F010000);
    let before = table.get_resource(id, &ResConfig::DEFAULT);
    // A failing lookup must not disturb table state.
    let _ = table.get_resource(ResourceId::new(0x7F0100FF), &ResConfig::DEFAULT);
    let after = table.get_resource(id, &ResConfig::DEFAULT);
    assert_eq!(before, after);
}

#[test]
fn truncated_child_chunk_fails_the_decode() {
    let mut data = layered_table();
    // The global pool is the first child at offset 12; widen its
    // declared size past the table window.
    let declared = u32::from_le_bytes(data[16..20].try_into().unwrap());
    data[16..20].copy_from_slice(&(declared + 0x4000).to_le_bytes());
    assert!(matches!(
        ResourceTable::from_bytes(&data),
        Err(DecodeError::Truncated { .. })
    ));
}
