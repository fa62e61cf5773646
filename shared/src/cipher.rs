//! Keyed response cipher for the server list wire format.
//!
//! Browse responses are obfuscated with a byte stream derived from the
//! fixed per-game key and the 8-character validation token the client
//! supplied in its request. The transform is a plain XOR against an
//! RC4-style keystream, so it is deterministic and self-inverse: a client
//! holding the same key and its own token runs the identical transform to
//! recover the payload.

/// Obfuscates `payload` under `key` and the client's validation token.
pub fn encode(key: &[u8], validate: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut state = schedule(key, validate);
    let mut out = Vec::with_capacity(payload.len());

    let (mut i, mut j) = (0usize, 0usize);
    for &byte in payload {
        i = (i + 1) & 0xff;
        j = (j + state[i] as usize) & 0xff;
        state.swap(i, j);
        let k = state[(state[i] as usize + state[j] as usize) & 0xff];
        out.push(byte ^ k);
    }

    out
}

/// Inverse of [`encode`]; the keystream XOR is symmetric.
pub fn decode(key: &[u8], validate: &[u8], payload: &[u8]) -> Vec<u8> {
    encode(key, validate, payload)
}

/// Key scheduling over the concatenation of key and validation token.
fn schedule(key: &[u8], validate: &[u8]) -> [u8; 256] {
    let mut seed = Vec::with_capacity(key.len() + validate.len());
    seed.extend_from_slice(key);
    seed.extend_from_slice(validate);
    if seed.is_empty() {
        seed.push(0);
    }

    let mut state = [0u8; 256];
    for (i, slot) in state.iter_mut().enumerate() {
        *slot = i as u8;
    }

    let mut j = 0usize;
    for i in 0..256 {
        j = (j + state[i] as usize + seed[i % seed.len()] as usize) & 0xff;
        state.swap(i, j);
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CIPHER_KEY;

    #[test]
    fn roundtrip_recovers_payload() {
        let payload = b"\x0a\x00\x00\x05\x69\x87\x01\x00hostname\x00\x00";
        let encoded = encode(CIPHER_KEY, b"fkT>_2Cr", payload);

        assert_ne!(encoded, payload.to_vec());
        assert_eq!(decode(CIPHER_KEY, b"fkT>_2Cr", &encoded), payload.to_vec());
    }

    #[test]
    fn transform_is_deterministic() {
        let payload = b"server list bytes";
        let a = encode(CIPHER_KEY, b"AAAAAAAA", payload);
        let b = encode(CIPHER_KEY, b"AAAAAAAA", payload);

        assert_eq!(a, b);
    }

    #[test]
    fn token_changes_the_stream() {
        let payload = b"server list bytes";
        let a = encode(CIPHER_KEY, b"AAAAAAAA", payload);
        let b = encode(CIPHER_KEY, b"BBBBBBBB", payload);

        assert_ne!(a, b);
    }

    #[test]
    fn key_changes_the_stream() {
        let payload = b"server list bytes";
        let a = encode(b"pXL838", b"AAAAAAAA", payload);
        let b = encode(b"hW6m9a", b"AAAAAAAA", payload);

        assert_ne!(a, b);
    }

    #[test]
    fn empty_payload_stays_empty() {
        assert!(encode(CIPHER_KEY, b"AAAAAAAA", b"").is_empty());
    }

    #[test]
    fn length_is_preserved() {
        for len in [1usize, 7, 64, 1000] {
            let payload = vec![0xabu8; len];
            assert_eq!(encode(CIPHER_KEY, b"12345678", &payload).len(), len);
        }
    }
}
