//! Writer configuration.
//!
//! All sizing thresholds are carried in an explicit [`TsFileConfig`] passed
//! to the writer and index builder at construction time; there is no
//! ambient or global configuration state.

/// Default fan-out bound for metadata index nodes.
pub const DEFAULT_MAX_DEGREE_OF_INDEX_NODE: usize = 256;

/// Default maximum number of points per page.
pub const DEFAULT_MAX_PAGE_POINTS: u32 = 1024;

/// Default maximum encoded size of a page: 64 KiB.
pub const DEFAULT_MAX_PAGE_BYTES: usize = 64 * 1024;

/// Default chunk group flush threshold: 64 MB.
pub const DEFAULT_CHUNK_GROUP_SIZE_BYTES: usize = 64 * 1024 * 1024;

/// Configuration for a Corsac file writer.
#[derive(Debug, Clone)]
pub struct TsFileConfig {
    /// Maximum number of children per metadata index node.
    ///
    /// When a node reaches this many entries during index construction a
    /// sibling node is started and promoted to the parent level.
    /// Default: 256.
    pub max_degree_of_index_node: usize,

    /// Maximum number of points buffered in one page.
    ///
    /// A page is sealed as soon as it holds this many points.
    /// Default: 1024.
    pub max_page_points: u32,

    /// Maximum encoded byte size of one page.
    ///
    /// A page whose buffers reach this size is sealed even below the point
    /// limit. Default: 64 KiB.
    pub max_page_bytes: usize,

    /// Flush threshold for a chunk group.
    ///
    /// Once the buffered size of all chunks in a device's active group
    /// meets or exceeds this, the group is sealed and written out.
    /// Default: 64 MB.
    pub chunk_group_size_bytes: usize,
}

impl Default for TsFileConfig {
    fn default() -> Self {
        Self {
            max_degree_of_index_node: DEFAULT_MAX_DEGREE_OF_INDEX_NODE,
            max_page_points: DEFAULT_MAX_PAGE_POINTS,
            max_page_bytes: DEFAULT_MAX_PAGE_BYTES,
            chunk_group_size_bytes: DEFAULT_CHUNK_GROUP_SIZE_BYTES,
        }
    }
}

impl TsFileConfig {
    /// Creates a new configuration with custom index node fan-out.
    ///
    /// Values below 2 are clamped: the level-collapse of index
    /// construction cannot terminate with a fan-out of 1.
    pub fn with_max_degree_of_index_node(mut self, degree: usize) -> Self {
        self.max_degree_of_index_node = degree.max(2);
        self
    }

    /// Creates a new configuration with custom page point limit.
    pub fn with_max_page_points(mut self, points: u32) -> Self {
        self.max_page_points = points.max(1);
        self
    }

    /// Creates a new configuration with custom page byte limit.
    pub fn with_max_page_bytes(mut self, bytes: usize) -> Self {
        self.max_page_bytes = bytes;
        self
    }

    /// Creates a new configuration with custom chunk group flush threshold.
    pub fn with_chunk_group_size_bytes(mut self, bytes: usize) -> Self {
        self.chunk_group_size_bytes = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TsFileConfig::default();
        assert_eq!(config.max_degree_of_index_node, 256);
        assert_eq!(config.max_page_points, 1024);
        assert_eq!(config.max_page_bytes, 64 * 1024);
        assert_eq!(config.chunk_group_size_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_builder_chain() {
        let config = TsFileConfig::default()
            .with_max_degree_of_index_node(4)
            .with_max_page_points(32)
            .with_max_page_bytes(1024)
            .with_chunk_group_size_bytes(4096);
        assert_eq!(config.max_degree_of_index_node, 4);
        assert_eq!(config.max_page_points, 32);
        assert_eq!(config.max_page_bytes, 1024);
        assert_eq!(config.chunk_group_size_bytes, 4096);
    }

    #[test]
    fn test_degenerate_limits_clamped() {
        let config = TsFileConfig::default()
            .with_max_degree_of_index_node(0)
            .with_max_page_points(0);
        assert_eq!(config.max_degree_of_index_node, 2);
        assert_eq!(config.max_page_points, 1);
    }
}
