//! NFMC backoff tempos.
//!
//! Network-friendly congestion mitigation: delayed reconnect retries use a
//! per-device pseudo-random tempo seeded from the SIM identity, so a mass
//! outage does not produce a synchronized reconnect storm. Each tempo is
//!
//! ```text
//! tempo[i] = (base[i] == 0 ? identity_low : identity mod base[i]) + base[i]
//! ```
//!
//! over 7 operator-configured base values. The 64-bit modulo is computed by
//! the portable shift-and-subtract routine below; network-side NFMC
//! interoperability depends on reproducing its exact results, so it is kept
//! verbatim rather than replaced with native `%`.

/// Number of tempo slots cycled round-robin.
pub const TEMPO_SLOTS: usize = 7;

/// Unsigned 64-bit modulo via shift-and-subtract.
///
/// Aligns the divisor left under the dividend, then subtracts while shifting
/// back right. `b == 0` returns `a` unchanged (the tempo formula handles the
/// zero-base case before calling).
pub fn modulo_u64(a: u64, b: u64) -> u64 {
    if b == 0 || a < b {
        return a;
    }

    let mut remainder = a;
    let mut divisor = b;
    while divisor <= remainder >> 1 {
        divisor <<= 1;
    }
    while divisor >= b {
        if remainder >= divisor {
            remainder -= divisor;
        }
        divisor >>= 1;
    }
    remainder
}

/// The 7 precomputed retry tempos for one SIM identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NfmcTempos {
    tempos: [u64; TEMPO_SLOTS],
}

impl NfmcTempos {
    /// Compute the tempo table from a 64-bit SIM identity and the operator
    /// base values. Pure: identical inputs yield identical tempos.
    pub fn compute(identity: u64, bases: &[u64; TEMPO_SLOTS]) -> Self {
        let identity_low = identity & 0xFFFF_FFFF;
        let mut tempos = [0u64; TEMPO_SLOTS];
        for (tempo, &base) in tempos.iter_mut().zip(bases.iter()) {
            *tempo = if base == 0 {
                identity_low
            } else {
                modulo_u64(identity, base) + base
            };
        }
        NfmcTempos { tempos }
    }

    /// Tempo at a slot, in seconds.
    pub fn slot(&self, index: usize) -> u64 {
        self.tempos[index % TEMPO_SLOTS]
    }
}

/// Fold a SIM identity string (ICCID/IMSI digits) into the 64-bit identity
/// the tempo computation is seeded from.
pub fn identity_from_digits(digits: &str) -> u64 {
    digits
        .bytes()
        .filter(u8::is_ascii_digit)
        .fold(0u64, |acc, d| {
            acc.wrapping_mul(10).wrapping_add(u64::from(d - b'0'))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulo_matches_native() {
        // Native % as the oracle across value shapes.
        let cases = [
            (0u64, 1u64),
            (1, 1),
            (17, 5),
            (5, 17),
            (u64::MAX, 3),
            (u64::MAX, u64::MAX),
            (u64::MAX - 1, u64::MAX),
            (0x1234_5678_9ABC_DEF0, 60),
            (0x1234_5678_9ABC_DEF0, 0xFFFF_FFFF),
            (1 << 63, (1 << 31) + 1),
        ];
        for (a, b) in cases {
            assert_eq!(modulo_u64(a, b), a % b, "a={a} b={b}");
        }
    }

    #[test]
    fn test_modulo_zero_divisor_returns_dividend() {
        assert_eq!(modulo_u64(42, 0), 42);
    }

    #[test]
    fn test_tempos_idempotent() {
        let bases = [60, 120, 240, 480, 960, 1920, 3840];
        let first = NfmcTempos::compute(0xDEAD_BEEF_CAFE_F00D, &bases);
        let second = NfmcTempos::compute(0xDEAD_BEEF_CAFE_F00D, &bases);
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_base_yields_identity_low() {
        let bases = [0u64; TEMPO_SLOTS];
        let identity = 0xAAAA_BBBB_1234_5678u64;
        let tempos = NfmcTempos::compute(identity, &bases);
        for i in 0..TEMPO_SLOTS {
            assert_eq!(tempos.slot(i), 0x1234_5678);
        }
    }

    #[test]
    fn test_tempo_formula() {
        let bases = [60, 0, 100, 1, 7, 3600, 86400];
        let identity = 123_456_789_012_345u64;
        let tempos = NfmcTempos::compute(identity, &bases);
        for (i, &base) in bases.iter().enumerate() {
            let expected = if base == 0 {
                identity & 0xFFFF_FFFF
            } else {
                identity % base + base
            };
            assert_eq!(tempos.slot(i), expected, "slot {i}");
        }
    }

    #[test]
    fn test_slot_wraps_round_robin() {
        let bases = [10, 20, 30, 40, 50, 60, 70];
        let tempos = NfmcTempos::compute(99, &bases);
        assert_eq!(tempos.slot(7), tempos.slot(0));
        assert_eq!(tempos.slot(9), tempos.slot(2));
    }

    #[test]
    fn test_identity_from_digits() {
        assert_eq!(identity_from_digits("123"), 123);
        assert_eq!(identity_from_digits("89 88 21"), 898821);
        // Longer than u64 wraps instead of panicking.
        let _ = identity_from_digits("89882112345678901234567890");
    }
}
