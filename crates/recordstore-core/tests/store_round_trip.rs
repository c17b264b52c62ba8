#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::DateTime;
use recordstore_core::{
    builder::{DatasetBuilder, NdArray},
    containers::{
        AnnotationSeries, IntervalSeries, RecordFile, RecordFileParams, TimeSeries,
        TimeSeriesParams, Timing, UnitParams, Units,
    },
    mapper::{MapError, ObjectMapper},
    schema::{CORE_NAMESPACE, TypeMap},
    storage::{
        StoreLocation,
        layout::{STORE_FORMAT_NAME, STORE_FORMAT_VERSION},
    },
    store_io::{OpenMode, StoreError, StoreIo},
    table::{ReferenceValidation, TableError},
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn session(identifier: &str) -> Result<RecordFile, Box<dyn std::error::Error>> {
    let start = DateTime::parse_from_rfc3339("2024-03-01T09:30:00+01:00")?;
    Ok(RecordFile::new(RecordFileParams::new(
        identifier,
        "round trip session",
        start,
    ))?)
}

async fn write_once(location: &StoreLocation, mode: OpenMode, file: &RecordFile) -> TestResult {
    let mut store = StoreIo::open(location.clone(), mode).await?;
    store.write(file, false).await?;
    store.close()?;
    Ok(())
}

async fn read_back(location: &StoreLocation) -> Result<RecordFile, StoreError> {
    let mut store = StoreIo::open(location.clone(), OpenMode::Read).await?;
    let file = store.read_as::<RecordFile>();
    store.close()?;
    file
}

#[tokio::test]
async fn ragged_unit_rows_survive_round_trip() -> TestResult {
    let tmp = TempDir::new()?;
    let location = StoreLocation::local(tmp.path().join("units.json"));

    let mut file = session("ragged")?;
    file.add_unit(UnitParams::new(vec![1.0, 2.0]).obs_intervals(vec![[0.0, 10.0]]))?;
    file.add_unit(UnitParams::new(vec![]).obs_intervals(vec![[5.0, 6.0]]))?;
    write_once(&location, OpenMode::WriteExclusive, &file).await?;

    let back = read_back(&location).await?;
    let units = back.units().expect("units table");
    assert_eq!(units.len(), 2);
    assert_eq!(units.unit_spike_times(0)?, vec![1.0, 2.0]);
    assert_eq!(units.unit_spike_times(1)?, Vec::<f64>::new());
    assert_eq!(units.unit_obs_intervals(0)?, vec![[0.0, 10.0]]);
    assert_eq!(units.unit_obs_intervals(1)?, vec![[5.0, 6.0]]);
    assert_eq!(units.table().ids(), &[0, 1]);
    assert_eq!(back.identifier(), "ragged");
    assert_eq!(back.session_start_time(), file.session_start_time());
    assert_eq!(back.file_create_date(), file.file_create_date());
    Ok(())
}

#[tokio::test]
async fn epochs_keep_tags_and_series_spans() -> TestResult {
    let tmp = TempDir::new()?;
    let location = StoreLocation::local(tmp.path().join("epochs.json"));

    let mut file = session("epochs")?;
    file.add_acquisition(TimeSeries::new(TimeSeriesParams::new(
        "speed",
        NdArray::from_floats(vec![0.0; 10]),
        "m/s",
        Timing::Rate {
            starting_time: 0.0,
            rate: 10.0,
        },
    ))?)?;
    file.add_epoch(0.0, 0.5, Vec::<String>::new(), &["/acquisition/speed"])?;
    file.add_epoch(0.5, 2.0, ["reward", "dark"], &["/acquisition/speed"])?;
    file.add_epoch(2.0, 3.0, Vec::<String>::new(), &[])?;
    write_once(&location, OpenMode::WriteExclusive, &file).await?;

    let back = read_back(&location).await?;
    let epochs = back.epochs().expect("epoch table");
    assert_eq!(epochs.len(), 3);
    assert_eq!(epochs.interval_times(1)?, (0.5, 2.0));
    assert!(epochs.interval_tags(0)?.is_empty());
    assert_eq!(epochs.interval_tags(1)?, ["reward", "dark"]);
    assert!(epochs.interval_tags(2)?.is_empty());
    let spans = epochs.interval_timeseries(1)?;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].path, "/acquisition/speed");
    assert_eq!((spans[0].idx_start, spans[0].count), (5, 5));
    assert!(epochs.interval_timeseries(2)?.is_empty());
    assert!(back.series_at(&spans[0].path).is_some());
    Ok(())
}

#[tokio::test]
async fn exclusive_create_keeps_existing_bytes() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("existing.json");
    let location = StoreLocation::local(&path);
    write_once(&location, OpenMode::WriteTruncate, &session("first")?).await?;
    let before = std::fs::read(&path)?;

    let err = StoreIo::open(location.clone(), OpenMode::WriteExclusive)
        .await
        .expect_err("store exists");
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
    assert_eq!(std::fs::read(&path)?, before);

    let missing = StoreLocation::local(tmp.path().join("missing.json"));
    for mode in [OpenMode::Read, OpenMode::Append] {
        let err = StoreIo::open(missing.clone(), mode).await.expect_err("missing");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
    Ok(())
}

#[tokio::test]
async fn cached_schema_reproduces_catalog() -> TestResult {
    let tmp = TempDir::new()?;
    let cached = StoreLocation::local(tmp.path().join("cached.json"));
    let mut store = StoreIo::open(cached.clone(), OpenMode::WriteTruncate).await?;
    store.write(&session("cached")?, true).await?;
    store.verify_schema_cache()?;
    store.close()?;

    let loaded = StoreIo::load_schema(&cached, &[CORE_NAMESPACE]).await?;
    let core = TypeMap::core();
    core.catalog().ensure_matches(&loaded)?;
    for ns in core.catalog().namespaces() {
        for type_name in ns.types.keys() {
            assert_eq!(
                loaded.resolve_fields(type_name)?,
                core.catalog().resolve_fields(type_name)?,
                "{type_name}"
            );
        }
    }

    let plain = StoreLocation::local(tmp.path().join("plain.json"));
    write_once(&plain, OpenMode::WriteTruncate, &session("plain")?).await?;
    let err = StoreIo::load_schema(&plain, &[CORE_NAMESPACE])
        .await
        .expect_err("no cache");
    assert!(matches!(err, StoreError::Schema { .. }));
    Ok(())
}

#[tokio::test]
async fn append_keeps_siblings_and_replaces_same_name() -> TestResult {
    let tmp = TempDir::new()?;
    let location = StoreLocation::local(tmp.path().join("append.json"));

    let mut first = session("append")?;
    let mut notes = AnnotationSeries::new("notes");
    notes.add_annotation(1.0, "start");
    first.add_acquisition(notes)?;
    write_once(&location, OpenMode::WriteTruncate, &first).await?;

    let mut second = session("append")?;
    let mut trials = IntervalSeries::new("trials");
    trials.add_interval(0.0, 2.5);
    second.add_acquisition(trials)?;
    write_once(&location, OpenMode::Append, &second).await?;

    let back = read_back(&location).await?;
    let names: Vec<_> = back.acquisition().names().collect();
    assert_eq!(names, ["notes", "trials"]);
    let notes = back
        .acquisition()
        .get_as::<AnnotationSeries>("notes")
        .expect("notes kept");
    assert_eq!(notes.annotations().collect::<Vec<_>>(), [(1.0, "start")]);

    let mut third = session("append")?;
    let mut notes = AnnotationSeries::new("notes");
    notes.add_annotation(3.0, "rewritten");
    third.add_acquisition(notes)?;
    write_once(&location, OpenMode::AppendOrCreate, &third).await?;

    let back = read_back(&location).await?;
    let notes = back
        .acquisition()
        .get_as::<AnnotationSeries>("notes")
        .expect("notes replaced");
    assert_eq!(notes.annotations().collect::<Vec<_>>(), [(3.0, "rewritten")]);
    let trials = back
        .acquisition()
        .get_as::<IntervalSeries>("trials")
        .expect("trials untouched");
    assert_eq!(trials.intervals(), vec![(0.0, 2.5)]);
    Ok(())
}

#[tokio::test]
async fn region_references_resolve_after_round_trip() -> TestResult {
    let tmp = TempDir::new()?;
    let location = StoreLocation::local(tmp.path().join("regions.json"));

    let mut file = session("regions")?;
    file.add_electrode([("location", "CA1".into()), ("x", 1.5.into())])?;
    file.add_unit(UnitParams::new(vec![0.5]).electrodes(vec![0]))?;
    let err = file
        .add_unit(UnitParams::new(vec![0.7]).electrodes(vec![3]))
        .expect_err("index past the electrode table");
    assert!(matches!(err, TableError::OutOfRangeReference { index: 3, .. }));
    write_once(&location, OpenMode::WriteExclusive, &file).await?;

    let back = read_back(&location).await?;
    let units = back.units().expect("units table");
    assert_eq!(units.len(), 1);
    let rows = units.table().resolve_region("electrodes", 0, &back)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("location"), Some("CA1".into()));
    assert_eq!(rows[0].get("x"), Some(1.5.into()));
    Ok(())
}

#[tokio::test]
async fn deferred_dangling_reference_fails_on_resolution_and_read() -> TestResult {
    let tmp = TempDir::new()?;
    let location = StoreLocation::local(tmp.path().join("dangling.json"));

    let mut file = session("dangling")?;
    file.add_electrode([("location", "CA3".into())])?;
    let mut units = Units::new(Units::NAME, "deferred units")
        .with_validation(ReferenceValidation::Deferred);
    units.add_unit(UnitParams::new(vec![0.5]).electrodes(vec![3]), None)?;
    let err = units
        .table()
        .resolve_region("electrodes", 0, &file)
        .expect_err("dangling index");
    assert!(matches!(err, TableError::CorruptIndex { .. }));
    file.set_units(units);
    write_once(&location, OpenMode::WriteExclusive, &file).await?;

    let err = read_back(&location).await.expect_err("dangling index");
    let StoreError::Map { source, .. } = err else {
        panic!("expected a mapping error, got {err}");
    };
    assert!(matches!(
        source.table_error(),
        Some(TableError::CorruptIndex { column, .. }) if column == "electrodes"
    ));
    Ok(())
}

#[tokio::test]
async fn corrupt_store_reports_every_problem() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("corrupt.json");

    let mut file = session("corrupt")?;
    file.add_unit(UnitParams::new(vec![1.0, 2.0]))?;
    file.add_unit(UnitParams::new(vec![3.0]))?;
    let map = TypeMap::core();
    let mut root = ObjectMapper::new(&map).to_builder(&file)?;
    root.group_at_or_create("units").set_dataset(DatasetBuilder::new(
        "spike_times_index",
        NdArray::from_ints(vec![3, 2]),
    ));
    assert!(root.remove("session_description"));
    let document = serde_json::json!({
        "format": STORE_FORMAT_NAME,
        "version": STORE_FORMAT_VERSION,
        "root": root,
    });
    std::fs::write(&path, serde_json::to_vec(&document)?)?;

    let err = read_back(&StoreLocation::local(&path))
        .await
        .expect_err("corrupt store");
    let StoreError::Map { source, .. } = err else {
        panic!("expected a mapping error, got {err}");
    };
    assert!(matches!(source, MapError::Aggregate { .. }));
    let leaves = source.leaves();
    assert!(leaves.len() >= 2, "{leaves:?}");
    assert!(matches!(
        source.table_error(),
        Some(TableError::CorruptIndex { column, .. }) if column == "spike_times"
    ));
    assert!(leaves.iter().any(|e| matches!(
        e,
        MapError::MissingField { field, .. } if field == "session_description"
    )));
    Ok(())
}

#[tokio::test]
async fn truncated_ragged_buffer_never_reads_back() -> TestResult {
    let tmp = TempDir::new()?;
    let mut file = session("truncated")?;
    file.add_unit(UnitParams::new(vec![1.0, 2.0]))?;
    file.add_unit(UnitParams::new(vec![3.0]))?;
    let map = TypeMap::core();
    let root = ObjectMapper::new(&map).to_builder(&file)?;
    let mut document = serde_json::json!({
        "format": STORE_FORMAT_NAME,
        "version": STORE_FORMAT_VERSION,
        "root": root,
    });
    let spikes = &mut document["root"]["groups"]["units"]["datasets"]["spike_times"]["array"];
    spikes["data"]["values"]
        .as_array_mut()
        .expect("spike values")
        .pop();

    let stale_shape = tmp.path().join("stale_shape.json");
    std::fs::write(&stale_shape, serde_json::to_vec(&document)?)?;
    let err = read_back(&StoreLocation::local(&stale_shape))
        .await
        .expect_err("shape names three values");
    assert!(matches!(err, StoreError::Decode { .. }), "{err}");

    document["root"]["groups"]["units"]["datasets"]["spike_times"]["array"]["shape"] =
        serde_json::json!([2]);
    let short_buffer = tmp.path().join("short_buffer.json");
    std::fs::write(&short_buffer, serde_json::to_vec(&document)?)?;
    let err = read_back(&StoreLocation::local(&short_buffer))
        .await
        .expect_err("index ends past the buffer");
    let StoreError::Map { source, .. } = err else {
        panic!("expected a mapping error, got {err}");
    };
    assert!(matches!(
        source.table_error(),
        Some(TableError::CorruptIndex { column, .. }) if column == "spike_times"
    ));
    Ok(())
}

#[tokio::test]
async fn read_only_store_rejects_writes() -> TestResult {
    let tmp = TempDir::new()?;
    let location = StoreLocation::local(tmp.path().join("readonly.json"));
    write_once(&location, OpenMode::WriteExclusive, &session("ro")?).await?;
    let before = std::fs::read(location.path())?;

    let mut store = StoreIo::open(location.clone(), OpenMode::Read).await?;
    let err = store
        .write(&session("other")?, true)
        .await
        .expect_err("read-only");
    assert!(matches!(err, StoreError::ReadOnly { .. }));
    assert!(store.is_open());
    store.close()?;
    assert_eq!(std::fs::read(location.path())?, before);
    Ok(())
}
