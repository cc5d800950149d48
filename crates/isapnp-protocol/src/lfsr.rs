//! The PnP linear-feedback shift register.
//!
//! One recurrence drives both the 32-byte initiation key and the checksum
//! byte that trails every serial identifier.

use crate::registers::{INITIATION_KEY_LEN, LFSR_SEED, SERIAL_ID_LEN};

/// Advance the LFSR by one step.
///
/// The new state is `state >> 1` with bit 7 set to
/// `state[0] ^ state[1] ^ input_bit[0]`. Only bit 0 of `input_bit` is used.
#[inline]
pub const fn advance(state: u8, input_bit: u8) -> u8 {
    let next = state >> 1;
    let feedback = (state ^ next ^ input_bit) & 0x01;
    next | (feedback << 7)
}

/// The initiation key, produced by 32 input-free steps from [`LFSR_SEED`].
pub const fn initiation_key() -> [u8; INITIATION_KEY_LEN] {
    let mut key = [0u8; INITIATION_KEY_LEN];
    let mut state = LFSR_SEED;
    let mut i = 0;
    while i < INITIATION_KEY_LEN {
        key[i] = state;
        state = advance(state, 0);
        i += 1;
    }
    key
}

/// Checksum over the 8 identifier bytes, each shifted in LSB first.
pub const fn checksum(identifier: &[u8; SERIAL_ID_LEN]) -> u8 {
    let mut state = LFSR_SEED;
    let mut i = 0;
    while i < SERIAL_ID_LEN {
        let mut byte = identifier[i];
        let mut bit = 0;
        while bit < 8 {
            state = advance(state, byte);
            byte >>= 1;
            bit += 1;
        }
        i += 1;
    }
    state
}

/// The initiation key as a constant.
pub const INITIATION_KEY: [u8; INITIATION_KEY_LEN] = initiation_key();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_starts_with_seed() {
        assert_eq!(INITIATION_KEY[0], LFSR_SEED);
        assert_eq!(INITIATION_KEY[1], 0xB5);
        assert_eq!(INITIATION_KEY[31], 0x39);
    }

    #[test]
    fn test_advance_ignores_upper_input_bits() {
        for state in 0..=u8::MAX {
            assert_eq!(advance(state, 0xFE), advance(state, 0x00));
            assert_eq!(advance(state, 0xFF), advance(state, 0x01));
        }
    }

    #[test]
    fn test_checksum_known_card() {
        let id = [0xAB, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE];
        assert_eq!(checksum(&id), 0xF2);
    }
}
