//! File writer: schema registry, ordered ingestion, group flushing, and
//! file finalization.

use crate::data::{MeasurementSchema, Record, Tablet, Value};
use crate::error::{Result, TsFileError};
use crate::tsfile::chunk::SeriesMetadata;
use crate::tsfile::file::{write_file_header, BloomFilter, FileFooter};
use crate::tsfile::group::{AlignedChunkGroupWriter, ChunkGroupWriter, NonAlignedChunkGroupWriter};
use crate::tsfile::index::build_index_tree;
use crate::tsfile::io::PositionedWriter;
use crate::TsFileConfig;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Per-series schema and write watermark for a plain device.
#[derive(Debug)]
struct SeriesState {
    schema: MeasurementSchema,
    last_timestamp: Option<i64>,
}

/// Registered schema state of one device.
#[derive(Debug)]
enum DeviceState {
    /// Independent series; new measurements may be added until the
    /// first flush freezes the set.
    NonAligned {
        frozen: bool,
        series: BTreeMap<String, SeriesState>,
    },
    /// Fixed measurement set sharing one time axis.
    Aligned {
        schemas: Vec<MeasurementSchema>,
        index: HashMap<String, usize>,
        last_timestamp: Option<i64>,
    },
}

/// Summary returned by [`TsFileWriter::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsFileStats {
    /// Final file size in bytes.
    pub file_size: u64,
    /// Data points written, nulls excluded.
    pub total_points: u64,
    /// Devices with at least one flushed chunk group.
    pub device_count: usize,
    /// Timeseries with at least one flushed chunk.
    pub series_count: usize,
    /// Chunk groups written.
    pub chunk_group_count: u64,
}

/// Writes one file: header, chunk groups as they fill, then metadata,
/// index tree, bloom filter, and footer on close.
///
/// Timestamps must be strictly increasing per series (per shared time
/// axis for aligned devices), and the watermark survives flushes: data
/// cannot be backfilled behind an already-written chunk. A device's
/// measurement set freezes once its first chunk group is flushed.
#[derive(Debug)]
pub struct TsFileWriter {
    path: PathBuf,
    out: PositionedWriter<BufWriter<File>>,
    config: TsFileConfig,
    devices: BTreeMap<String, DeviceState>,
    groups: BTreeMap<String, ChunkGroupWriter>,
    series_metadata: BTreeMap<String, BTreeMap<String, SeriesMetadata>>,
    total_points: u64,
    chunk_group_count: u64,
}

impl TsFileWriter {
    /// Creates a file at `path` with the default configuration.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_config(path, TsFileConfig::default())
    }

    /// Creates a file at `path` with an explicit configuration.
    pub fn with_config<P: AsRef<Path>>(path: P, config: TsFileConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut out = PositionedWriter::new(BufWriter::new(file));
        write_file_header(&mut out)?;
        debug!("created tsfile at {}", path.display());
        Ok(Self {
            path,
            out,
            config,
            devices: BTreeMap::new(),
            groups: BTreeMap::new(),
            series_metadata: BTreeMap::new(),
            total_points: 0,
            chunk_group_count: 0,
        })
    }

    /// Registers one measurement of a plain device.
    ///
    /// # Errors
    ///
    /// `TsFileError::DuplicateSchema` if the measurement is already
    /// registered, `TsFileError::SchemaFrozenViolation` if the device
    /// has flushed, `TsFileError::AlignmentMismatch` if the device was
    /// registered as aligned.
    pub fn register_timeseries(&mut self, device: &str, schema: MeasurementSchema) -> Result<()> {
        match self.devices.get_mut(device) {
            None => {
                let mut series = BTreeMap::new();
                series.insert(
                    schema.name.clone(),
                    SeriesState {
                        schema,
                        last_timestamp: None,
                    },
                );
                self.devices.insert(
                    device.to_string(),
                    DeviceState::NonAligned {
                        frozen: false,
                        series,
                    },
                );
                Ok(())
            }
            Some(DeviceState::NonAligned { frozen, series }) => {
                if series.contains_key(&schema.name) {
                    return Err(TsFileError::DuplicateSchema(format!(
                        "{device}.{}",
                        schema.name
                    )));
                }
                if *frozen {
                    return Err(TsFileError::SchemaFrozenViolation {
                        device: device.to_string(),
                        measurement: schema.name,
                    });
                }
                series.insert(
                    schema.name.clone(),
                    SeriesState {
                        schema,
                        last_timestamp: None,
                    },
                );
                Ok(())
            }
            Some(DeviceState::Aligned { .. }) => Err(TsFileError::AlignmentMismatch(format!(
                "device {device} is aligned, register its measurements as a set"
            ))),
        }
    }

    /// Registers an aligned device with its full measurement set.
    ///
    /// # Errors
    ///
    /// `TsFileError::DuplicateSchema` if the device already exists or
    /// the set repeats a measurement name.
    pub fn register_aligned_timeseries(
        &mut self,
        device: &str,
        schemas: Vec<MeasurementSchema>,
    ) -> Result<()> {
        if self.devices.contains_key(device) {
            return Err(TsFileError::DuplicateSchema(device.to_string()));
        }
        let mut index = HashMap::with_capacity(schemas.len());
        for (slot, schema) in schemas.iter().enumerate() {
            if index.insert(schema.name.clone(), slot).is_some() {
                return Err(TsFileError::DuplicateSchema(format!(
                    "{device}.{}",
                    schema.name
                )));
            }
        }
        self.devices.insert(
            device.to_string(),
            DeviceState::Aligned {
                schemas,
                index,
                last_timestamp: None,
            },
        );
        Ok(())
    }

    /// Writes one record, atomically.
    ///
    /// The whole record is validated against schemas and watermarks
    /// before any point is applied; a rejected record changes nothing.
    /// Unknown measurements on an unfrozen plain device are registered
    /// on the fly from the value's type.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let points: Vec<(&str, &Value)> = record
            .points
            .iter()
            .map(|(m, v)| (m.as_str(), v))
            .collect();
        self.write_points(&record.device_id, record.timestamp, &points)
    }

    /// Writes a tablet row by row.
    ///
    /// Each row is validated and applied like a record; on error, rows
    /// before the offending one remain written.
    pub fn write_tablet(&mut self, tablet: &Tablet) -> Result<()> {
        let schemas = tablet.schemas();
        for row in 0..tablet.row_count() {
            let timestamp = tablet.timestamps()[row];
            let cells: Vec<(usize, Value)> = (0..schemas.len())
                .filter_map(|column| tablet.value_at(row, column).map(|v| (column, v)))
                .collect();
            let points: Vec<(&str, &Value)> = cells
                .iter()
                .map(|(column, value)| (schemas[*column].name.as_str(), value))
                .collect();
            self.write_points(tablet.device_id(), timestamp, &points)?;
        }
        Ok(())
    }

    fn write_points(&mut self, device: &str, timestamp: i64, points: &[(&str, &Value)]) -> Result<()> {
        let state = self
            .devices
            .entry(device.to_string())
            .or_insert_with(|| DeviceState::NonAligned {
                frozen: false,
                series: BTreeMap::new(),
            });

        match state {
            DeviceState::NonAligned { frozen, series } => {
                // Validate the whole row before touching any chunk.
                for (position, (measurement, value)) in points.iter().enumerate() {
                    if points[..position].iter().any(|(m, _)| m == measurement) {
                        return Err(TsFileError::OutOfOrderWrite {
                            series: format!("{device}.{measurement}"),
                            min_timestamp: timestamp + 1,
                        });
                    }
                    match series.get(*measurement) {
                        Some(state) => {
                            if value.data_type() != state.schema.data_type {
                                return Err(TsFileError::TypeMismatch {
                                    measurement: measurement.to_string(),
                                    expected: state.schema.data_type,
                                    actual: value.data_type(),
                                });
                            }
                            if let Some(last) = state.last_timestamp {
                                if timestamp <= last {
                                    warn!(
                                        "rejected out-of-order write to {}.{}: {} <= {}",
                                        device, measurement, timestamp, last
                                    );
                                    return Err(TsFileError::OutOfOrderWrite {
                                        series: format!("{device}.{measurement}"),
                                        min_timestamp: last + 1,
                                    });
                                }
                            }
                        }
                        None => {
                            if *frozen {
                                warn!(
                                    "rejected write to unknown measurement {}.{}: schema frozen after flush",
                                    device, measurement
                                );
                                return Err(TsFileError::SchemaFrozenViolation {
                                    device: device.to_string(),
                                    measurement: measurement.to_string(),
                                });
                            }
                        }
                    }
                }

                let group = match self
                    .groups
                    .entry(device.to_string())
                    .or_insert_with(|| {
                        ChunkGroupWriter::NonAligned(NonAlignedChunkGroupWriter::new(
                            device,
                            self.config.clone(),
                        ))
                    }) {
                    ChunkGroupWriter::NonAligned(group) => group,
                    ChunkGroupWriter::Aligned(_) => {
                        return Err(TsFileError::AlignmentMismatch(format!(
                            "chunk group for device {device} is aligned"
                        )))
                    }
                };
                for (measurement, value) in points {
                    let state = series.entry((*measurement).to_string()).or_insert_with(|| {
                        debug!(
                            "auto-registering timeseries {}.{} as {:?}",
                            device,
                            measurement,
                            value.data_type()
                        );
                        SeriesState {
                            schema: MeasurementSchema::new(*measurement, value.data_type()),
                            last_timestamp: None,
                        }
                    });
                    group.write(&state.schema, timestamp, value)?;
                    state.last_timestamp = Some(timestamp);
                    self.total_points += 1;
                }
            }

            DeviceState::Aligned {
                schemas,
                index,
                last_timestamp,
            } => {
                if let Some(last) = *last_timestamp {
                    if timestamp <= last {
                        warn!(
                            "rejected out-of-order write to aligned device {}: {} <= {}",
                            device, timestamp, last
                        );
                        return Err(TsFileError::OutOfOrderWrite {
                            series: device.to_string(),
                            min_timestamp: last + 1,
                        });
                    }
                }
                for (position, (measurement, value)) in points.iter().enumerate() {
                    if points[..position].iter().any(|(m, _)| m == measurement) {
                        return Err(TsFileError::OutOfOrderWrite {
                            series: format!("{device}.{measurement}"),
                            min_timestamp: timestamp + 1,
                        });
                    }
                    let slot = match index.get(*measurement) {
                        Some(slot) => *slot,
                        None => {
                            return Err(TsFileError::AlignmentMismatch(format!(
                                "measurement {measurement} is not registered for aligned device {device}"
                            )))
                        }
                    };
                    let expected = schemas[slot].data_type;
                    if value.data_type() != expected {
                        return Err(TsFileError::TypeMismatch {
                            measurement: measurement.to_string(),
                            expected,
                            actual: value.data_type(),
                        });
                    }
                }

                let group = match self
                    .groups
                    .entry(device.to_string())
                    .or_insert_with(|| {
                        ChunkGroupWriter::Aligned(AlignedChunkGroupWriter::new(
                            device,
                            schemas,
                            &self.config,
                        ))
                    }) {
                    ChunkGroupWriter::Aligned(group) => group,
                    ChunkGroupWriter::NonAligned(_) => {
                        return Err(TsFileError::AlignmentMismatch(format!(
                            "chunk group for device {device} is not aligned"
                        )))
                    }
                };
                let mut row: Vec<Option<&Value>> = vec![None; schemas.len()];
                for (measurement, value) in points {
                    if let Some(slot) = index.get(*measurement) {
                        row[*slot] = Some(*value);
                    }
                }
                group.write_row(timestamp, &row)?;
                *last_timestamp = Some(timestamp);
                self.total_points += points.len() as u64;
            }
        }

        self.maybe_flush(device)
    }

    fn maybe_flush(&mut self, device: &str) -> Result<()> {
        let should_flush = self
            .groups
            .get(device)
            .is_some_and(|group| group.buffered_size() >= self.config.chunk_group_size_bytes);
        if should_flush {
            self.flush_device(device)?;
        }
        Ok(())
    }

    /// Flushes the device's buffered chunk group, if any, and freezes
    /// its measurement set.
    pub fn flush_device(&mut self, device: &str) -> Result<()> {
        let group = match self.groups.remove(device) {
            Some(group) => group,
            None => return Ok(()),
        };
        let buffered = group.buffered_size();
        let offset = self.out.offset();
        let flushed = group.serialize_to(&mut self.out)?;
        debug!(
            "flushed chunk group for {}: {} chunks, ~{} bytes buffered, offset {}",
            device,
            flushed.len(),
            buffered,
            offset
        );
        for chunk in flushed {
            self.series_metadata
                .entry(device.to_string())
                .or_default()
                .entry(chunk.measurement.clone())
                .or_insert_with(|| SeriesMetadata::new(chunk.measurement.clone(), chunk.data_type))
                .push_chunk(chunk.metadata);
        }
        self.chunk_group_count += 1;
        if let Some(DeviceState::NonAligned { frozen, .. }) = self.devices.get_mut(device) {
            *frozen = true;
        }
        Ok(())
    }

    /// Flushes every buffered chunk group.
    ///
    /// Devices with nothing buffered are untouched; in particular their
    /// schemas do not freeze.
    pub fn flush(&mut self) -> Result<()> {
        let devices: Vec<String> = self.groups.keys().cloned().collect();
        for device in devices {
            self.flush_device(&device)?;
        }
        Ok(())
    }

    /// Flushes remaining data, writes the metadata region, index tree,
    /// bloom filter, and footer, and syncs the file.
    pub fn close(mut self) -> Result<TsFileStats> {
        self.flush()?;
        for device in self.devices.keys() {
            if !self.series_metadata.contains_key(device) {
                warn!("device {} registered but never written", device);
            }
        }

        let meta_offset = self.out.offset();
        let blobs: BTreeMap<String, Vec<SeriesMetadata>> =
            std::mem::take(&mut self.series_metadata)
                .into_iter()
                .map(|(device, series)| (device, series.into_values().collect()))
                .collect();

        let root = build_index_tree(&mut self.out, &blobs, self.config.max_degree_of_index_node)?;
        let index_root_offset = self.out.offset();
        root.write_to(&mut self.out)?;

        let bloom_offset = self.out.offset();
        let series_paths: Vec<String> = blobs
            .iter()
            .flat_map(|(device, series)| {
                series
                    .iter()
                    .filter(|blob| !blob.measurement.is_empty())
                    .map(move |blob| format!("{device}.{}", blob.measurement))
            })
            .collect();
        let mut bloom = BloomFilter::new(series_paths.len());
        for path in &series_paths {
            bloom.insert(path);
        }
        bloom.write_to(&mut self.out)?;
        self.out.flush()?;

        let file_crc32 = compute_file_crc(&self.path)?;
        let footer = FileFooter {
            meta_offset,
            index_root_offset,
            bloom_offset,
            file_crc32,
        };
        footer.write_to(&mut self.out)?;
        let file_size = self.out.offset();
        self.out.flush()?;
        let file = self
            .out
            .into_inner()
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;

        let stats = TsFileStats {
            file_size,
            total_points: self.total_points,
            device_count: blobs.len(),
            series_count: series_paths.len(),
            chunk_group_count: self.chunk_group_count,
        };
        debug!(
            "closed {}: {} bytes, {} points, {} devices, {} series, {} chunk groups",
            self.path.display(),
            stats.file_size,
            stats.total_points,
            stats.device_count,
            stats.series_count,
            stats.chunk_group_count
        );
        Ok(stats)
    }
}

fn compute_file_crc(path: &Path) -> Result<u32> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize())
}
