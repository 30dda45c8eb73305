//! RFC 6455 §5.3 payload masking.

/// XOR `data` in place with the 4-byte `mask`, cycling the key across the buffer.
///
/// Per RFC 6455 §5.3: `transformed-octet-i = original-octet-i XOR masking-key-octet-(i MOD 4)`.
pub(crate) fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Same transform, word-at-a-time for throughput on larger payloads.
///
/// Falls back to the byte loop once fewer than 4 bytes remain.
pub(crate) fn apply_mask_fast32(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes(chunk.try_into().unwrap());
        chunk.copy_from_slice(&(word ^ mask_u32).to_ne_bytes());
    }
    let rem = chunks.into_remainder();
    for (i, byte) in rem.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}
