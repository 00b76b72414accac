//! Record key namespaces.
//!
//! Four kinds of record share the one store keyspace, told apart by their
//! leading byte:
//!
//! - node records: ASCII base-10 of the signed sequence (`-` or a digit)
//! - user values: `k` followed by the user key
//! - reserved application records: `*` followed by caller-chosen bytes
//! - metadata: `#` (currently only the last-sequence counter)
//!
//! The leading bytes are pairwise distinct, so each namespace can be
//! range-scanned on its own and no record of one kind can shadow another.

use eyre::{ensure, Result};

/// Prefix byte of user-value record keys.
pub const INTERNAL_KEY_PREFIX: u8 = b'k';

/// Prefix byte of reserved application records.
pub const RESERVED_KEY_PREFIX: u8 = b'*';

/// Metadata key holding the last allocated sequence, ASCII decimal.
pub const LAST_SEQ_KEY: &[u8] = b"##LAST_SEQ_KEY";

/// Store key of a node record: the decimal encoding of its sequence.
pub fn node_key(seq: i64) -> Vec<u8> {
    seq.to_string().into_bytes()
}

/// Store key of the value record for `user_key`.
pub fn encode_internal_key(user_key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(user_key.len() + 1);
    out.push(INTERNAL_KEY_PREFIX);
    out.extend_from_slice(user_key);
    out
}

/// Recovers the user key from an internal key.
pub fn decode_internal_key(internal_key: &[u8]) -> Result<&[u8]> {
    ensure!(
        internal_key.first() == Some(&INTERNAL_KEY_PREFIX),
        "not an internal key: missing '{}' prefix",
        INTERNAL_KEY_PREFIX as char
    );
    Ok(&internal_key[1..])
}

/// True when `key` lives in the reserved application namespace.
pub fn is_reserved_key(key: &[u8]) -> bool {
    key.first() == Some(&RESERVED_KEY_PREFIX)
}

/// Parses the ASCII-decimal last-sequence metadata value.
pub fn parse_last_seq(raw: &[u8]) -> Result<i64> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| eyre::eyre!("last-seq metadata is not ASCII: {:?}", raw))?;
    text.parse::<i64>()
        .map_err(|_| eyre::eyre!("last-seq metadata is not a decimal integer: {:?}", text))
}

/// Encodes the last-sequence metadata value.
pub fn encode_last_seq(seq: i64) -> Vec<u8> {
    seq.to_string().into_bytes()
}
