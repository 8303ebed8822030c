//! Multi-level metadata index tree.
//!
//! The index maps device and measurement names to the file region
//! holding their [`SeriesMetadata`] blobs. Leaves at the device level
//! point at measurement subtree roots; leaves at the measurement level
//! point directly into the blob region. Every level is sorted by name,
//! so a lookup descends with a floor search at internal nodes, an exact
//! search at the device leaf, and a floor search plus blob scan at the
//! measurement leaf.
//!
//! Construction is bottom-up: nodes are serialized as soon as a level
//! fills, and each promoted entry records the file offset its child was
//! written at. The returned root is the only node not yet on disk.

use crate::error::{Result, TsFileError};
use crate::tsfile::chunk::SeriesMetadata;
use crate::tsfile::io::{read_var_str, read_var_u32, write_var_str, write_var_u32, PositionedWriter};
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::io::{Read, Write};

/// Position of a node within the index tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MetadataIndexNodeType {
    /// Internal node of the device level.
    InternalDevice = 0,
    /// Leaf node of the device level; entries name devices.
    LeafDevice = 1,
    /// Internal node of a measurement subtree.
    InternalMeasurement = 2,
    /// Leaf node of a measurement subtree; entries point at blobs.
    LeafMeasurement = 3,
}

impl MetadataIndexNodeType {
    /// Parses a node type from its on-disk byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MetadataIndexNodeType::InternalDevice),
            1 => Some(MetadataIndexNodeType::LeafDevice),
            2 => Some(MetadataIndexNodeType::InternalMeasurement),
            3 => Some(MetadataIndexNodeType::LeafMeasurement),
            _ => None,
        }
    }

    /// Whether nodes of this type key their entries by device name.
    pub fn is_device_level(&self) -> bool {
        matches!(
            self,
            MetadataIndexNodeType::InternalDevice | MetadataIndexNodeType::LeafDevice
        )
    }
}

/// One child pointer inside an index node.
///
/// The variant records which namespace the key belongs to, so a device
/// name can never be compared against a measurement name by accident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataIndexEntry {
    /// Points at a device subtree (or, from an internal device node, at
    /// a deeper device node).
    Device {
        /// Device name.
        device: String,
        /// File offset of the child.
        offset: u64,
    },
    /// Points at a measurement node or blob region.
    Measurement {
        /// First measurement name covered by the child.
        measurement: String,
        /// File offset of the child.
        offset: u64,
    },
}

impl MetadataIndexEntry {
    /// The name this entry sorts and searches by.
    pub fn compare_key(&self) -> &str {
        match self {
            MetadataIndexEntry::Device { device, .. } => device,
            MetadataIndexEntry::Measurement { measurement, .. } => measurement,
        }
    }

    /// File offset of the child this entry points at.
    pub fn offset(&self) -> u64 {
        match self {
            MetadataIndexEntry::Device { offset, .. } => *offset,
            MetadataIndexEntry::Measurement { offset, .. } => *offset,
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_var_str(self.compare_key(), writer)?;
        writer.write_all(&self.offset().to_le_bytes())?;
        Ok(())
    }
}

/// One node of the metadata index tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataIndexNode {
    children: Vec<MetadataIndexEntry>,
    end_offset: u64,
    node_type: MetadataIndexNodeType,
}

impl MetadataIndexNode {
    /// Creates an empty node.
    pub fn new(node_type: MetadataIndexNodeType) -> Self {
        Self {
            children: Vec::new(),
            end_offset: 0,
            node_type,
        }
    }

    /// Position of this node within the tree.
    pub fn node_type(&self) -> MetadataIndexNodeType {
        self.node_type
    }

    /// Child entries in key order.
    pub fn children(&self) -> &[MetadataIndexEntry] {
        &self.children
    }

    /// File offset just past the last child's data.
    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    /// Appends a child entry. Keys must be added in sorted order.
    pub fn add_entry(&mut self, entry: MetadataIndexEntry) {
        self.children.push(entry);
    }

    /// Whether the node has reached the configured fan-out.
    pub fn is_full(&self, max_degree: usize) -> bool {
        self.children.len() >= max_degree
    }

    /// Key of the first child, used as this node's promotion key.
    pub fn first_key(&self) -> Option<&str> {
        self.children.first().map(|e| e.compare_key())
    }

    fn seal(&mut self, end_offset: u64) {
        self.end_offset = end_offset;
    }

    /// Finds the child covering `key`, with the end offset of the
    /// child's region.
    ///
    /// With `exact` set, only a child whose key equals `key` matches;
    /// otherwise the floor child is returned. A key sorting below every
    /// child clamps to the leftmost entry rather than missing, and the
    /// caller detects the miss one level down when the leaf holds no
    /// exact match.
    pub fn get_child_index_entry(
        &self,
        key: &str,
        exact: bool,
    ) -> Option<(&MetadataIndexEntry, u64)> {
        if self.children.is_empty() {
            return None;
        }
        let index = self.binary_search_in_children(key, exact)?;
        let child_end_offset = if index + 1 < self.children.len() {
            self.children[index + 1].offset()
        } else {
            self.end_offset
        };
        Some((&self.children[index], child_end_offset))
    }

    fn binary_search_in_children(&self, key: &str, exact: bool) -> Option<usize> {
        let mut low: i64 = 0;
        let mut high: i64 = self.children.len() as i64 - 1;
        while low <= high {
            let mid = (low + high) / 2;
            match self.children[mid as usize].compare_key().cmp(key) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid - 1,
                Ordering::Equal => return Some(mid as usize),
            }
        }
        if exact {
            None
        } else if low == 0 {
            Some(0)
        } else {
            Some(low as usize - 1)
        }
    }

    /// Serializes the node.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Child count
        write_var_u32(self.children.len() as u32, writer)?;
        // Entries: key + child offset each
        for child in &self.children {
            child.write_to(writer)?;
        }
        // End offset (8 bytes)
        writer.write_all(&self.end_offset.to_le_bytes())?;
        // Node type (1 byte)
        writer.write_all(&[self.node_type as u8])?;
        Ok(())
    }

    /// Deserializes a node.
    ///
    /// # Errors
    ///
    /// Returns `TsFileError::MalformedIndex` on an unknown node type
    /// byte.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let child_count = read_var_u32(reader)? as usize;
        let mut raw_children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let key = read_var_str(reader)?;
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            raw_children.push((key, u64::from_le_bytes(buf)));
        }
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        let end_offset = u64::from_le_bytes(buf);
        let mut type_buf = [0u8; 1];
        reader.read_exact(&mut type_buf)?;
        let node_type = MetadataIndexNodeType::from_u8(type_buf[0]).ok_or_else(|| {
            TsFileError::MalformedIndex(format!("unknown index node type {}", type_buf[0]))
        })?;
        let children = raw_children
            .into_iter()
            .map(|(key, offset)| {
                if node_type.is_device_level() {
                    MetadataIndexEntry::Device {
                        device: key,
                        offset,
                    }
                } else {
                    MetadataIndexEntry::Measurement {
                        measurement: key,
                        offset,
                    }
                }
            })
            .collect();
        Ok(Self {
            children,
            end_offset,
            node_type,
        })
    }
}

fn entry_for(node_type: MetadataIndexNodeType, key: &str, offset: u64) -> MetadataIndexEntry {
    if node_type.is_device_level() {
        MetadataIndexEntry::Device {
            device: key.to_string(),
            offset,
        }
    } else {
        MetadataIndexEntry::Measurement {
            measurement: key.to_string(),
            offset,
        }
    }
}

/// Collapses a queue of sibling nodes level by level until one root
/// remains, serializing each level as it is consumed. The returned root
/// is not written.
fn generate_root<W: Write>(
    out: &mut PositionedWriter<W>,
    mut queue: VecDeque<MetadataIndexNode>,
    node_type: MetadataIndexNodeType,
    max_degree: usize,
) -> Result<MetadataIndexNode> {
    while queue.len() > 1 {
        let level_size = queue.len();
        let mut current = MetadataIndexNode::new(node_type);
        for _ in 0..level_size {
            let node = match queue.pop_front() {
                Some(node) => node,
                None => break,
            };
            if current.is_full(max_degree) {
                current.seal(out.offset());
                queue.push_back(current);
                current = MetadataIndexNode::new(node_type);
            }
            let first_key = node.first_key().ok_or_else(|| {
                TsFileError::MalformedIndex("empty node in index construction".to_string())
            })?;
            current.add_entry(entry_for(node_type, first_key, out.offset()));
            node.write_to(out)?;
        }
        current.seal(out.offset());
        queue.push_back(current);
    }
    Ok(queue
        .pop_front()
        .unwrap_or_else(|| MetadataIndexNode::new(node_type)))
}

/// Writes one device's [`SeriesMetadata`] blobs and builds its
/// measurement subtree, returning the unserialized subtree root.
fn build_measurement_subtree<W: Write>(
    out: &mut PositionedWriter<W>,
    series: &[SeriesMetadata],
    max_degree: usize,
) -> Result<MetadataIndexNode> {
    let mut queue = VecDeque::new();
    let mut current = MetadataIndexNode::new(MetadataIndexNodeType::LeafMeasurement);
    for blob in series {
        if current.is_full(max_degree) {
            current.seal(out.offset());
            queue.push_back(current);
            current = MetadataIndexNode::new(MetadataIndexNodeType::LeafMeasurement);
        }
        current.add_entry(MetadataIndexEntry::Measurement {
            measurement: blob.measurement.clone(),
            offset: out.offset(),
        });
        blob.write_to(out)?;
    }
    current.seal(out.offset());
    queue.push_back(current);
    generate_root(
        out,
        queue,
        MetadataIndexNodeType::InternalMeasurement,
        max_degree,
    )
}

/// Writes the metadata region and index tree for all devices.
///
/// Blobs and subtree nodes go out device by device in sorted order,
/// then the device level. With at most `max_degree` devices the root is
/// a single [`MetadataIndexNodeType::LeafDevice`] pointing straight at
/// the measurement subtree roots. The returned root node is left for
/// the caller to serialize; its end offset equals the position it will
/// be written at.
pub fn build_index_tree<W: Write>(
    out: &mut PositionedWriter<W>,
    devices: &BTreeMap<String, Vec<SeriesMetadata>>,
    max_degree: usize,
) -> Result<MetadataIndexNode> {
    // A fan-out below 2 cannot terminate the level collapse.
    let max_degree = max_degree.max(2);
    let mut device_roots = Vec::with_capacity(devices.len());
    for (device, series) in devices {
        let subtree_root = build_measurement_subtree(out, series, max_degree)?;
        device_roots.push((device.clone(), subtree_root));
    }

    if device_roots.len() <= max_degree {
        let mut root = MetadataIndexNode::new(MetadataIndexNodeType::LeafDevice);
        for (device, subtree_root) in device_roots {
            root.add_entry(MetadataIndexEntry::Device {
                device,
                offset: out.offset(),
            });
            subtree_root.write_to(out)?;
        }
        root.seal(out.offset());
        return Ok(root);
    }

    let mut queue = VecDeque::new();
    let mut current = MetadataIndexNode::new(MetadataIndexNodeType::LeafDevice);
    for (device, subtree_root) in device_roots {
        if current.is_full(max_degree) {
            current.seal(out.offset());
            queue.push_back(current);
            current = MetadataIndexNode::new(MetadataIndexNodeType::LeafDevice);
        }
        current.add_entry(MetadataIndexEntry::Device {
            device,
            offset: out.offset(),
        });
        subtree_root.write_to(out)?;
    }
    current.seal(out.offset());
    queue.push_back(current);

    let mut root = generate_root(out, queue, MetadataIndexNodeType::InternalDevice, max_degree)?;
    root.seal(out.offset());
    Ok(root)
}
