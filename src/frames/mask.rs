/// XOR `payload` in place with `mask_key`, cycling the key every 4 bytes.
///
/// Applying the same key twice restores the original bytes.
pub(crate) fn mask(payload: &mut [u8], mask_key: [u8; 4]) {
    let mut words = payload.chunks_exact_mut(4);
    for word in &mut words {
        for (b, k) in word.iter_mut().zip(mask_key) {
            *b ^= k;
        }
    }
    // tail is always aligned to the start of the key
    for (b, k) in words.into_remainder().iter_mut().zip(mask_key) {
        *b ^= k;
    }
}
