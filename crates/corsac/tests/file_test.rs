//! Integration tests for the TsFile format.

use corsac::{
    DataType, MeasurementSchema, Record, Tablet, TsFileConfig, TsFileError, TsFileReader,
    TsFileWriter, Value,
};
use tempfile::TempDir;

/// Helper function to generate test records for one device.
fn generate_records(
    device: &str,
    measurement: &str,
    start_ts: i64,
    interval: i64,
    count: usize,
) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let ts = start_ts + (i as i64) * interval;
            Record::new(device, ts).with_point(measurement, ts * 10)
        })
        .collect()
}

#[test]
fn test_write_read_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("roundtrip.corsac");

    // Write
    {
        let mut writer = TsFileWriter::new(&file_path).unwrap();
        writer
            .register_timeseries("root.sg.d1", MeasurementSchema::new("temperature", DataType::Double))
            .unwrap();
        writer
            .register_timeseries("root.sg.d1", MeasurementSchema::new("status", DataType::Boolean))
            .unwrap();

        for i in 0..3600i64 {
            let record = Record::new("root.sg.d1", i * 1_000)
                .with_point("temperature", 20.0 + (i as f64) * 0.01)
                .with_point("status", i % 2 == 0);
            writer.write_record(&record).unwrap();
        }

        let stats = writer.close().unwrap();
        assert_eq!(stats.total_points, 7200);
        assert_eq!(stats.device_count, 1);
        assert_eq!(stats.series_count, 2);
    }

    // Read and verify
    {
        let reader = TsFileReader::open(&file_path).unwrap();

        let temps = reader.read_points("root.sg.d1", "temperature").unwrap().unwrap();
        assert_eq!(temps.len(), 3600);
        for (i, (ts, value)) in temps.iter().enumerate() {
            assert_eq!(*ts, (i as i64) * 1_000, "Timestamp mismatch at index {}", i);
            match value {
                Value::Double(v) => {
                    let expected = 20.0 + (i as f64) * 0.01;
                    assert!(
                        (v - expected).abs() < f64::EPSILON,
                        "Value mismatch at index {}: expected {}, got {}",
                        i,
                        expected,
                        v
                    );
                }
                other => panic!("expected Double, got {:?}", other),
            }
        }

        let statuses = reader.read_points("root.sg.d1", "status").unwrap().unwrap();
        assert_eq!(statuses.len(), 3600);
        assert_eq!(statuses[0].1, Value::Boolean(true));
        assert_eq!(statuses[1].1, Value::Boolean(false));
    }
}

#[test]
fn test_all_data_types() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("types.corsac");

    // Write one series of each data type
    {
        let mut writer = TsFileWriter::new(&file_path).unwrap();
        let schemas = [
            ("s_bool", DataType::Boolean),
            ("s_i32", DataType::Int32),
            ("s_i64", DataType::Int64),
            ("s_f32", DataType::Float),
            ("s_f64", DataType::Double),
            ("s_text", DataType::Text),
            ("s_date", DataType::Date),
            ("s_blob", DataType::Blob),
            ("s_str", DataType::String),
        ];
        for (name, data_type) in &schemas {
            writer
                .register_timeseries("root.d", MeasurementSchema::new(*name, *data_type))
                .unwrap();
        }

        for i in 0..100i64 {
            let record = Record::new("root.d", i)
                .with_point("s_bool", i % 3 == 0)
                .with_point("s_i32", i as i32)
                .with_point("s_i64", i * 1_000_000)
                .with_point("s_f32", i as f32 * 0.5)
                .with_point("s_f64", i as f64 * 0.25)
                .with_point("s_text", Value::Text(format!("event-{}", i)))
                .with_point("s_date", Value::Date(19_000 + i as i32))
                .with_point("s_blob", Value::Blob(vec![i as u8, (i + 1) as u8]))
                .with_point("s_str", Value::String(format!("tag{}", i)));
            writer.write_record(&record).unwrap();
        }
        writer.close().unwrap();
    }

    // Read and verify each type
    {
        let reader = TsFileReader::open(&file_path).unwrap();

        let texts = reader.read_points("root.d", "s_text").unwrap().unwrap();
        assert_eq!(texts.len(), 100);
        assert_eq!(texts[42].1, Value::Text("event-42".to_string()));

        let blobs = reader.read_points("root.d", "s_blob").unwrap().unwrap();
        assert_eq!(blobs[10].1, Value::Blob(vec![10, 11]));

        let dates = reader.read_points("root.d", "s_date").unwrap().unwrap();
        assert_eq!(dates[5].1, Value::Date(19_005));

        let floats = reader.read_points("root.d", "s_f32").unwrap().unwrap();
        assert_eq!(floats[4].1, Value::Float(2.0));

        let ints = reader.read_points("root.d", "s_i32").unwrap().unwrap();
        assert_eq!(ints[99].1, Value::Int32(99));

        let longs = reader.read_points("root.d", "s_i64").unwrap().unwrap();
        assert_eq!(longs[7].1, Value::Int64(7_000_000));

        let strings = reader.read_points("root.d", "s_str").unwrap().unwrap();
        assert_eq!(strings[0].1, Value::String("tag0".to_string()));
    }
}

#[test]
fn test_out_of_order_rejected_across_flush() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("ordering.corsac");

    let mut writer = TsFileWriter::new(&file_path).unwrap();
    writer
        .register_timeseries("d1", MeasurementSchema::new("s1", DataType::Int64))
        .unwrap();

    for record in generate_records("d1", "s1", 0, 1, 1000) {
        writer.write_record(&record).unwrap();
    }
    writer.flush().unwrap();

    // The watermark survives the flush: ts 500 was consumed by the
    // flushed chunk and must stay rejected.
    let result = writer.write_record(&Record::new("d1", 500).with_point("s1", 1i64));
    match result {
        Err(TsFileError::OutOfOrderWrite { series, min_timestamp }) => {
            assert_eq!(series, "d1.s1");
            assert_eq!(min_timestamp, 1000);
        }
        other => panic!("expected OutOfOrderWrite, got {:?}", other),
    }

    // Equal to the last written timestamp is also out of order
    let result = writer.write_record(&Record::new("d1", 999).with_point("s1", 1i64));
    assert!(matches!(result, Err(TsFileError::OutOfOrderWrite { .. })));

    // Strictly greater is accepted
    writer
        .write_record(&Record::new("d1", 1000).with_point("s1", 1i64))
        .unwrap();

    let stats = writer.close().unwrap();
    assert_eq!(stats.total_points, 1001);

    let reader = TsFileReader::open(&file_path).unwrap();
    let points = reader.read_points("d1", "s1").unwrap().unwrap();
    assert_eq!(points.len(), 1001);
    assert_eq!(points[1000].0, 1000);
}

#[test]
fn test_rejected_row_leaves_prior_points_intact() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("partial.corsac");

    let mut writer = TsFileWriter::new(&file_path).unwrap();
    writer
        .register_timeseries("d1", MeasurementSchema::new("s1", DataType::Int32))
        .unwrap();

    writer
        .write_record(&Record::new("d1", 10).with_point("s1", 1i32))
        .unwrap();
    // Rejected whole-row: the failed write must not consume the timestamp
    assert!(writer
        .write_record(&Record::new("d1", 5).with_point("s1", 2i32))
        .is_err());
    writer
        .write_record(&Record::new("d1", 11).with_point("s1", 3i32))
        .unwrap();

    writer.close().unwrap();

    let reader = TsFileReader::open(&file_path).unwrap();
    let points = reader.read_points("d1", "s1").unwrap().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0], (10, Value::Int32(1)));
    assert_eq!(points[1], (11, Value::Int32(3)));
}

#[test]
fn test_schema_frozen_after_flush() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("frozen.corsac");

    let mut writer = TsFileWriter::new(&file_path).unwrap();
    writer
        .register_timeseries("d1", MeasurementSchema::new("s1", DataType::Int64))
        .unwrap();
    writer
        .register_timeseries("d2", MeasurementSchema::new("s1", DataType::Int64))
        .unwrap();

    writer
        .write_record(&Record::new("d1", 1).with_point("s1", 1i64))
        .unwrap();
    writer.flush_device("d1").unwrap();

    // d1 is frozen: no new measurements, by registration or auto-register
    let result = writer.register_timeseries("d1", MeasurementSchema::new("s2", DataType::Int64));
    match result {
        Err(TsFileError::SchemaFrozenViolation { device, measurement }) => {
            assert_eq!(device, "d1");
            assert_eq!(measurement, "s2");
        }
        other => panic!("expected SchemaFrozenViolation, got {:?}", other),
    }
    let result = writer.write_record(&Record::new("d1", 2).with_point("s9", 1i64));
    assert!(matches!(
        result,
        Err(TsFileError::SchemaFrozenViolation { .. })
    ));

    // Existing d1 series still writable, d2 still unfrozen
    writer
        .write_record(&Record::new("d1", 2).with_point("s1", 2i64))
        .unwrap();
    writer
        .register_timeseries("d2", MeasurementSchema::new("s2", DataType::Float))
        .unwrap();

    writer.close().unwrap();
}

#[test]
fn test_flush_of_empty_group_does_not_freeze() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("noop_flush.corsac");

    let mut writer = TsFileWriter::new(&file_path).unwrap();
    writer
        .register_timeseries("d1", MeasurementSchema::new("s1", DataType::Int64))
        .unwrap();

    // Nothing buffered, so this flush writes nothing and freezes nothing
    writer.flush().unwrap();
    writer
        .register_timeseries("d1", MeasurementSchema::new("s2", DataType::Int64))
        .unwrap();

    writer
        .write_record(&Record::new("d1", 1).with_point("s2", 5i64))
        .unwrap();
    let stats = writer.close().unwrap();
    assert_eq!(stats.total_points, 1);
    assert_eq!(stats.chunk_group_count, 1);
}

#[test]
fn test_auto_register_on_unfrozen_device() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("auto.corsac");

    let mut writer = TsFileWriter::new(&file_path).unwrap();

    // No registration at all: the first write creates the series from
    // the runtime type of the value.
    writer
        .write_record(&Record::new("d1", 1).with_point("s1", 2.5f64))
        .unwrap();

    // Later writes must match the inferred type
    let result = writer.write_record(&Record::new("d1", 2).with_point("s1", 7i32));
    match result {
        Err(TsFileError::TypeMismatch {
            measurement,
            expected,
            actual,
        }) => {
            assert_eq!(measurement, "s1");
            assert_eq!(expected, DataType::Double);
            assert_eq!(actual, DataType::Int32);
        }
        other => panic!("expected TypeMismatch, got {:?}", other),
    }

    writer
        .write_record(&Record::new("d1", 2).with_point("s1", 3.5f64))
        .unwrap();
    writer.close().unwrap();

    let reader = TsFileReader::open(&file_path).unwrap();
    let points = reader.read_points("d1", "s1").unwrap().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[1], (2, Value::Double(3.5)));
}

#[test]
fn test_tablet_roundtrip_with_nulls() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("tablet.corsac");

    // Write a tablet where s2 is null on odd rows
    {
        let mut writer = TsFileWriter::new(&file_path).unwrap();
        writer
            .register_timeseries("d1", MeasurementSchema::new("s1", DataType::Int64))
            .unwrap();
        writer
            .register_timeseries("d1", MeasurementSchema::new("s2", DataType::Double))
            .unwrap();

        let schemas = vec![
            MeasurementSchema::new("s1", DataType::Int64),
            MeasurementSchema::new("s2", DataType::Double),
        ];
        let mut tablet = Tablet::new("d1", schemas, 100).unwrap();
        for row in 0..100 {
            tablet.add_timestamp(row, row as i64).unwrap();
            tablet
                .add_value(row, "s1", &Value::Int64(row as i64 * 2))
                .unwrap();
            if row % 2 == 0 {
                tablet
                    .add_value(row, "s2", &Value::Double(row as f64))
                    .unwrap();
            }
        }
        writer.write_tablet(&tablet).unwrap();
        let stats = writer.close().unwrap();
        assert_eq!(stats.total_points, 150);
    }

    // Read and verify: null cells never materialize as points
    {
        let reader = TsFileReader::open(&file_path).unwrap();

        let s1 = reader.read_points("d1", "s1").unwrap().unwrap();
        assert_eq!(s1.len(), 100);

        let s2 = reader.read_points("d1", "s2").unwrap().unwrap();
        assert_eq!(s2.len(), 50);
        for (i, (ts, value)) in s2.iter().enumerate() {
            assert_eq!(*ts, (i as i64) * 2);
            assert_eq!(*value, Value::Double((i as f64) * 2.0));
        }
    }
}

#[test]
fn test_corrupted_file_detection() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("corrupt.corsac");

    // Write valid file
    {
        let mut writer = TsFileWriter::new(&file_path).unwrap();
        for record in generate_records("d1", "s1", 0, 1000, 100) {
            writer.write_record(&record).unwrap();
        }
        writer.close().unwrap();
    }

    // Corrupt the chunk data section (somewhere past the header)
    {
        let mut contents = std::fs::read(&file_path).unwrap();
        let corrupt_offset = 6 + 20;
        contents[corrupt_offset] ^= 0xFF;
        contents[corrupt_offset + 1] ^= 0xAA;
        std::fs::write(&file_path, &contents).unwrap();
    }

    // Try to open - should fail due to CRC mismatch
    let result = TsFileReader::open(&file_path);
    assert!(matches!(
        result,
        Err(TsFileError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_truncated_file_detection() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("truncated.corsac");

    {
        let mut writer = TsFileWriter::new(&file_path).unwrap();
        for record in generate_records("d1", "s1", 0, 1000, 100) {
            writer.write_record(&record).unwrap();
        }
        writer.close().unwrap();
    }

    // Chop off the tail, taking the footer with it
    {
        let contents = std::fs::read(&file_path).unwrap();
        std::fs::write(&file_path, &contents[..contents.len() - 25]).unwrap();
    }
    assert!(TsFileReader::open(&file_path).is_err());

    // A file shorter than header + footer can never be valid
    std::fs::write(&file_path, b"ACTF").unwrap();
    assert!(TsFileReader::open(&file_path).is_err());
}

#[test]
fn test_deep_index_many_series() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("deep_index.corsac");

    const NUM_DEVICES: usize = 12;
    const NUM_MEASUREMENTS: usize = 7;

    // Degree 2 forces several levels of internal index nodes on both
    // the device and measurement dimensions.
    let config = TsFileConfig::default().with_max_degree_of_index_node(2);

    // Write
    {
        let mut writer = TsFileWriter::with_config(&file_path, config).unwrap();
        for d in 0..NUM_DEVICES {
            let device = format!("root.sg.d{:02}", d);
            for m in 0..NUM_MEASUREMENTS {
                writer
                    .register_timeseries(
                        &device,
                        MeasurementSchema::new(format!("s{:02}", m), DataType::Int64),
                    )
                    .unwrap();
            }
            for i in 0..50i64 {
                let mut record = Record::new(&device, i);
                for m in 0..NUM_MEASUREMENTS {
                    record = record.with_point(format!("s{:02}", m), i + m as i64);
                }
                writer.write_record(&record).unwrap();
            }
        }
        let stats = writer.close().unwrap();
        assert_eq!(stats.device_count, NUM_DEVICES);
        assert_eq!(stats.series_count, NUM_DEVICES * NUM_MEASUREMENTS);
    }

    // Read and verify every series resolves through the deep tree
    {
        let reader = TsFileReader::open(&file_path).unwrap();

        for d in 0..NUM_DEVICES {
            let device = format!("root.sg.d{:02}", d);
            for m in 0..NUM_MEASUREMENTS {
                let measurement = format!("s{:02}", m);
                let meta = reader
                    .series_metadata(&device, &measurement)
                    .unwrap()
                    .unwrap_or_else(|| panic!("missing {}.{}", device, measurement));
                assert_eq!(meta.statistics.count, 50);
                assert_eq!(meta.statistics.min_timestamp, 0);
                assert_eq!(meta.statistics.max_timestamp, 49);

                let points = reader.read_points(&device, &measurement).unwrap().unwrap();
                assert_eq!(points.len(), 50);
                assert_eq!(points[49], (49, Value::Int64(49 + m as i64)));
            }
        }

        // Probes below, between, and above the key range all miss
        assert!(reader.lookup("root.sg.d00", "a_below").unwrap().is_none());
        assert!(reader.lookup("root.sg.d05", "s03x").unwrap().is_none());
        assert!(reader.lookup("root.sg.d99", "s00").unwrap().is_none());
        assert!(reader.lookup("aaa", "s00").unwrap().is_none());
        assert!(reader.lookup("zzz", "s00").unwrap().is_none());
    }
}

#[test]
fn test_devices_listing() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("devices.corsac");

    {
        let mut writer = TsFileWriter::new(&file_path).unwrap();
        // Insert out of lexical order; the file keeps them sorted
        for device in ["root.b", "root.a", "root.c"] {
            writer
                .write_record(&Record::new(device, 1).with_point("s1", 1i64))
                .unwrap();
        }
        writer.close().unwrap();
    }

    let reader = TsFileReader::open(&file_path).unwrap();
    assert_eq!(reader.devices().unwrap(), vec!["root.a", "root.b", "root.c"]);
}

#[test]
fn test_empty_file() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("empty.corsac");

    {
        let writer = TsFileWriter::new(&file_path).unwrap();
        let stats = writer.close().unwrap();
        assert_eq!(stats.total_points, 0);
        assert_eq!(stats.device_count, 0);
        assert_eq!(stats.series_count, 0);
        assert_eq!(stats.chunk_group_count, 0);
    }

    // An empty file is still a valid file
    {
        let reader = TsFileReader::open(&file_path).unwrap();
        assert!(reader.devices().unwrap().is_empty());
        assert!(reader.lookup("d1", "s1").unwrap().is_none());
        assert!(reader.read_points("d1", "s1").unwrap().is_none());
    }
}

#[test]
fn test_multiple_chunk_groups() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("groups.corsac");

    // A small group threshold forces several flushes during the write
    let config = TsFileConfig::default().with_chunk_group_size_bytes(4 * 1024);

    {
        let mut writer = TsFileWriter::with_config(&file_path, config).unwrap();
        for record in generate_records("d1", "s1", 0, 1, 5000) {
            writer.write_record(&record).unwrap();
        }
        let stats = writer.close().unwrap();
        assert_eq!(stats.total_points, 5000);
        assert!(
            stats.chunk_group_count > 1,
            "expected multiple chunk groups, got {}",
            stats.chunk_group_count
        );
    }

    {
        let reader = TsFileReader::open(&file_path).unwrap();

        let meta = reader.series_metadata("d1", "s1").unwrap().unwrap();
        assert!(meta.chunks.len() > 1);
        assert_eq!(meta.statistics.count, 5000);

        // Chunks concatenate back into one ordered series
        let points = reader.read_points("d1", "s1").unwrap().unwrap();
        assert_eq!(points.len(), 5000);
        for (i, (ts, _)) in points.iter().enumerate() {
            assert_eq!(*ts, i as i64);
        }
    }
}

#[test]
fn test_page_splitting() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("pages.corsac");

    // 95 points at 10 per page gives a multi-page chunk with a short tail
    let config = TsFileConfig::default().with_max_page_points(10);

    {
        let mut writer = TsFileWriter::with_config(&file_path, config).unwrap();
        for record in generate_records("d1", "s1", 0, 1, 95) {
            writer.write_record(&record).unwrap();
        }
        writer.close().unwrap();
    }

    let reader = TsFileReader::open(&file_path).unwrap();
    let points = reader.read_points("d1", "s1").unwrap().unwrap();
    assert_eq!(points.len(), 95);
    for (i, (ts, value)) in points.iter().enumerate() {
        assert_eq!(*ts, i as i64);
        assert_eq!(*value, Value::Int64((i as i64) * 10));
    }
}

#[test]
fn test_lookup_returns_leaf_region() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("region.corsac");

    {
        let mut writer = TsFileWriter::new(&file_path).unwrap();
        for record in generate_records("d1", "s1", 0, 1, 10) {
            writer.write_record(&record).unwrap();
        }
        writer.close().unwrap();
    }

    let reader = TsFileReader::open(&file_path).unwrap();
    let (start, end) = reader.lookup("d1", "s1").unwrap().unwrap();
    assert!(start < end);
    assert!(start >= reader.footer().meta_offset);
    assert!(end <= reader.footer().index_root_offset);
}
