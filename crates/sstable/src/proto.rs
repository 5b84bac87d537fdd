//! Wire messages for the `meta` file and the index entries.
//!
//! Both are prost messages with stable field tags, so fields added by later
//! versions are skipped by older readers (additive forward compatibility)
//! and the encoding is deterministic for a given message.

/// Per-table metadata, written once to the `meta` file when the writer
/// closes. `version` is always the first field; a reader checks it before
/// trusting anything else.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetaData {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(uint64, tag = "2")]
    pub num_records: u64,
    /// Records whose value is the empty null sentinel.
    #[prost(uint64, tag = "3")]
    pub null_values: u64,
    /// First key written; empty for an empty table.
    #[prost(bytes = "vec", tag = "4")]
    pub min_key: ::prost::alloc::vec::Vec<u8>,
    /// Last key written; empty for an empty table.
    #[prost(bytes = "vec", tag = "5")]
    pub max_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "6")]
    pub data_bytes: u64,
    #[prost(uint64, tag = "7")]
    pub index_bytes: u64,
    /// Always `data_bytes + index_bytes`.
    #[prost(uint64, tag = "8")]
    pub total_bytes: u64,
}

/// One index record: locates a key's value in the data file and pins its
/// content with a CRC-64/ISO checksum.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IndexEntry {
    #[prost(bytes = "vec", tag = "1")]
    pub key: ::prost::alloc::vec::Vec<u8>,
    /// Starting offset of the value's record in the data file.
    #[prost(uint64, tag = "2")]
    pub value_offset: u64,
    /// CRC-64/ISO of the value bytes as written.
    #[prost(uint64, tag = "3")]
    pub checksum: u64,
}
