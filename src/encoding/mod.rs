//! On-disk encoding: varints, record key namespaces, and the node and
//! value record codecs.
//!
//! Everything persisted by the tree round-trips through this module. The
//! formats are self-describing (length-prefixed fields) and carry no
//! pointers; the node's sequence number is the store key and never appears
//! in the record body.

pub mod keyspace;
pub mod record;
pub mod varint;

pub use keyspace::{
    decode_internal_key, encode_internal_key, encode_last_seq, is_reserved_key, node_key,
    parse_last_seq, INTERNAL_KEY_PREFIX, LAST_SEQ_KEY, RESERVED_KEY_PREFIX,
};
pub use record::{NodeRecord, ValueEnvelope};
pub use varint::{
    get_varint, get_varint_i64, put_varint, put_varint_i64, varint_len, zigzag_decode,
    zigzag_encode,
};
