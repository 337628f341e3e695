//! Type registry tests: standard table, user types, ancestry on disk

use std::sync::Arc;

use neurodata_db::container::Container;
use neurodata_db::entity::Placement;
use neurodata_db::schema::{TypeRegistry, TypeSpec};
use neurodata_db::store::Value;
use neurodata_db::{ContainerReader, Error};
use tempfile::TempDir;

#[test]
fn test_standard_table() {
    let registry = TypeRegistry::standard();
    for name in [
        "TimeSeries",
        "AnnotationSeries",
        "IntervalSeries",
        "AbstractFeatureSeries",
        "ElectricalSeries",
        "SpatialSeries",
        "ImageSeries",
        "TwoPhotonSeries",
        "OpticalSeries",
        "RoiResponseSeries",
    ] {
        let ty = registry.resolve(name).unwrap();
        assert_eq!(ty.family(), "TimeSeries");
        assert_eq!(ty.ancestry().first().map(String::as_str), Some("TimeSeries"));
        assert_eq!(ty.ancestry().last().map(String::as_str), Some(name));
    }
    assert_eq!(
        registry.resolve("TwoPhotonSeries").unwrap().ancestry(),
        vec!["TimeSeries", "ImageSeries", "TwoPhotonSeries"]
    );
    assert!(registry.is_ancestor("TwoPhotonSeries", "ImageSeries").unwrap());
    assert!(!registry.is_ancestor("ImageSeries", "TwoPhotonSeries").unwrap());
}

#[test]
fn test_unknown_type_rejected_at_create() {
    let dir = TempDir::new().unwrap();
    let mut container = Container::builder(dir.path().join("unknown.nwb.json"))
        .description("unknown type")
        .create()
        .unwrap();
    assert!(matches!(
        container.create_timeseries("SpikeSeries", "s", Placement::Acquisition),
        Err(Error::UnknownType(name)) if name == "SpikeSeries"
    ));
    let module = container.create_module("m").unwrap();
    assert!(matches!(
        container.create_interface(module, "Spikes"),
        Err(Error::UnknownType(_))
    ));
}

#[test]
fn test_user_type_through_container() {
    let mut registry = TypeRegistry::standard();
    registry
        .register(
            "SpikeSeries",
            Some("ElectricalSeries"),
            TypeSpec::new().required(&["timestamps"]).optional(&["sorter"]),
        )
        .unwrap();
    assert!(matches!(
        registry.register("SpikeSeries", Some("TimeSeries"), TypeSpec::new()),
        Err(Error::AlreadyExists(_))
    ));
    let registry = Arc::new(registry);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("user_type.nwb.json");
    let mut container = Container::builder(&path)
        .description("user type")
        .registry(Arc::clone(&registry))
        .create()
        .unwrap();
    let id = container
        .create_timeseries("SpikeSeries", "spikes", Placement::Acquisition)
        .unwrap();
    container.set_field(id, "data", vec![1.0, 1.0]).unwrap();
    container.set_field(id, "electrode_idx", vec![3_i64]).unwrap();
    assert!(matches!(
        container.finalize(id),
        Err(Error::MissingRequiredField { field, .. }) if field == "timestamps"
    ));
    assert!(matches!(
        container.ignore_field(id, "timestamps"),
        Err(Error::OptionalFieldOnly { .. })
    ));
    container.series(id).unwrap().set_time(vec![0.1, 0.2]).unwrap();
    container.finalize(id).unwrap();
    container.close().unwrap();

    let reader = ContainerReader::open(&path).unwrap().with_registry(registry);
    let base = "acquisition/timeseries/spikes";
    assert_eq!(
        reader.attribute(base, "ancestry").unwrap(),
        Value::from(vec!["TimeSeries", "ElectricalSeries", "SpikeSeries"])
    );
    assert!(reader.is_a(base, "ElectricalSeries").unwrap());
    let missing = reader.attribute(base, "missing_fields").unwrap();
    assert!(missing.contains_text("sorter"));
    assert_eq!(
        reader.attribute(&format!("{base}/timestamps"), "unit").unwrap(),
        Value::from("Seconds")
    );
    reader.verify_entity(base, "SpikeSeries").unwrap();
    reader.verify_entity(base, "ElectricalSeries").unwrap();
}

#[test]
fn test_verify_rejects_unrelated_subtype() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("verify.nwb.json");
    let mut container = Container::builder(&path)
        .description("verify")
        .create()
        .unwrap();
    let id = container
        .create_timeseries("TimeSeries", "plain", Placement::StimulusTemplate)
        .unwrap();
    container.set_field(id, "data", vec![1.0]).unwrap();
    container.finalize(id).unwrap();
    container.close().unwrap();

    // stored as TimeSeries, so a subtype check fails on ancestry
    let mut registry = TypeRegistry::standard();
    registry
        .register("RichSeries", Some("TimeSeries"), TypeSpec::new().optional(&["extra"]))
        .unwrap();
    let reader = ContainerReader::open(&path)
        .unwrap()
        .with_registry(Arc::new(registry));
    let base = "stimulus/templates/plain";
    reader.verify_entity(base, "TimeSeries").unwrap();
    assert!(matches!(
        reader.verify_entity(base, "RichSeries"),
        Err(Error::MalformedEntity { .. })
    ));
}
