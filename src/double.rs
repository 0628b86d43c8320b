//! Portable serialisation of doubles for the inter-shard wire.
//!
//! The mantissa is encoded as a base-256 number, which round-trips without
//! loss as long as both ends have a power-of-two float radix. All the
//! radix- and precision-dependent constants live in this module.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;

// Only binary floating point is supported on the wire.
const _RADIX_IS_TWO: () = assert!(f64::RADIX == 2);

const MAX_MANTISSA_BYTES: usize = (f64::MANTISSA_DIGITS as usize + 7 + 7) / 8;

/// Decompose a positive finite `v` into `m * 2^exp` with `m` in `[0.5, 1.0)`.
fn frexp(v: f64) -> (f64, i32) {
    let bits = v.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // Subnormal: scale into the normal range first.
        let scaled = v * f64::from_bits(0x43f0_0000_0000_0000); // 2^64
        let (m, e) = frexp(scaled);
        (m, e - 64)
    } else {
        let m = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
        (m, biased - 1022)
    }
}

/// `v * 2^e`, overflowing to infinity and underflowing gradually to zero.
fn ldexp(mut v: f64, mut e: i32) -> f64 {
    while e > 1023 {
        v *= f64::from_bits(0x7fe0_0000_0000_0000); // 2^1023
        e -= 1023;
    }
    while e < -1022 {
        v *= f64::from_bits(0x0010_0000_0000_0000); // 2^-1022
        e += 1022;
    }
    v * f64::from_bits(((e + 1023) as u64) << 52)
}

/// Normalise `v` into `[1.0, 256.0)` and return the base-256 exponent.
fn base256ify(v: &mut f64) -> i32 {
    let (m, mut exp) = frexp(*v);
    exp -= 1;
    *v = ldexp(m, (exp & 7) + 1);
    exp >> 3
}

fn max_base256() -> (f64, i32) {
    let mut m = f64::MAX;
    let e = base256ify(&mut m);
    (m, e)
}

/// Serialise a finite double to a variable-length byte string.
///
/// First byte layout:
///   bit 7     negative flag
///   bits 4..6 mantissa length - 1
///   bits 0..3 0-13 -> exponent + 7
///             14   -> exponent given by the next byte
///             15   -> exponent given by the next 2 bytes, lsb first
///
/// Then the mantissa as base-256 digits, most significant first. Zero is
/// encoded as two NUL bytes and decoded specially.
pub fn serialise_double(v: f64) -> Result<Vec<u8>, Error> {
    if v == 0.0 {
        return Ok(vec![0, 0]);
    }

    let negative = v < 0.0;
    let mut v = v.abs();
    let exp = base256ify(&mut v);

    let mut result = Vec::with_capacity(11);
    if (-7..=6).contains(&exp) {
        let mut b = (exp + 7) as u8;
        if negative {
            b |= 0x80;
        }
        result.push(b);
    } else if (-128..127).contains(&exp) {
        result.push(if negative { 0x8e } else { 0x0e });
        result.push((exp + 128) as u8);
    } else if (-32768..=32767).contains(&exp) {
        result.push(if negative { 0x8f } else { 0x0f });
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, (exp + 32768) as u16);
        result.extend_from_slice(&buf);
    } else {
        return Err(Error::Network(
            "insane exponent in floating point number".to_string(),
        ));
    }

    let mantissa_start = result.len();
    let mut maxbytes = MAX_MANTISSA_BYTES.min(8);
    loop {
        let byte = v as u8;
        result.push(byte);
        v -= f64::from(byte);
        v *= 256.0;
        maxbytes -= 1;
        if v == 0.0 || maxbytes == 0 {
            break;
        }
    }

    let n = result.len() - mantissa_start;
    if n > 1 {
        result[0] |= ((n - 1) as u8) << 4;
    }

    Ok(result)
}

/// Decode a double from the front of `p`, consuming the bytes it used.
///
/// Magnitudes beyond the representable range decode to infinity of the
/// recorded sign. Exponent underflow is left unhandled and quietly
/// produces zero.
pub fn unserialise_double(p: &mut &[u8]) -> Result<f64, Error> {
    if p.len() < 2 {
        return Err(Error::Network(
            "bad encoded double: insufficient data".to_string(),
        ));
    }
    let first = p[0];
    if first == 0 && p[1] == 0 {
        *p = &p[2..];
        return Ok(0.0);
    }
    *p = &p[1..];

    let negative = first & 0x80 != 0;
    let mantissa_len = (((first >> 4) & 0x07) + 1) as usize;

    let mut exp = i32::from(first & 0x0f);
    if exp >= 14 {
        if exp == 15 {
            if p.len() < 2 {
                return Err(Error::Network(
                    "bad encoded double: short large exponent".to_string(),
                ));
            }
            exp = i32::from(LittleEndian::read_u16(&p[..2])) - 32768;
            *p = &p[2..];
        } else {
            // The initial length check guarantees one byte is still here.
            exp = i32::from(p[0]) - 128;
            *p = &p[1..];
        }
    } else {
        exp -= 7;
    }

    if p.len() < mantissa_len {
        return Err(Error::Network(
            "bad encoded double: short mantissa".to_string(),
        ));
    }
    let mantissa = &p[..mantissa_len];
    *p = &p[mantissa_len..];

    let (max_mantissa, max_exp) = max_base256();
    if exp > max_exp || (exp == max_exp && f64::from(mantissa[0]) > max_mantissa) {
        return Ok(if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }

    let mut v = 0.0;
    for &digit in mantissa.iter().rev() {
        v = v / 256.0 + f64::from(digit);
    }
    if exp != 0 {
        v = ldexp(v, exp * 8);
    }

    if negative {
        v = -v;
    }
    Ok(v)
}

#[cfg(test)]
mod tests {

    use super::{serialise_double, unserialise_double};
    use proptest::prelude::*;
    use proptest::test_runner::Config;

    fn roundtrip(v: f64) -> f64 {
        let bytes = serialise_double(v).unwrap();
        let mut p = &bytes[..];
        let got = unserialise_double(&mut p).unwrap();
        assert!(p.is_empty(), "{} left {} bytes unread", v, p.len());
        got
    }

    #[test]
    fn zero_is_two_nul_bytes() {
        assert_eq!(serialise_double(0.0).unwrap(), vec![0, 0]);
        assert_eq!(roundtrip(0.0), 0.0);
    }

    #[test]
    fn small_integers() {
        // 1.0 fits in a single mantissa byte with exponent zero.
        assert_eq!(serialise_double(1.0).unwrap(), vec![0x07, 0x01]);
        // -2.0 additionally sets the sign bit.
        assert_eq!(serialise_double(-2.0).unwrap(), vec![0x87, 0x02]);
        assert_eq!(roundtrip(1.0), 1.0);
        assert_eq!(roundtrip(-2.0), -2.0);
    }

    #[test]
    fn extremes_roundtrip() {
        for v in &[
            f64::MAX,
            f64::MIN,
            f64::MIN_POSITIVE,
            f64::EPSILON,
            5e-324, // smallest subnormal
            1.0 / 3.0,
            std::f64::consts::PI,
        ] {
            assert_eq!(roundtrip(*v).to_bits(), v.to_bits(), "{}", v);
        }
    }

    #[test]
    fn overflowing_exponent_decodes_to_infinity() {
        // Exponent field 15: two-byte exponent, here the maximum 32767.
        let bytes = [0x0f, 0xff, 0xff, 0x01];
        let mut p = &bytes[..];
        assert_eq!(unserialise_double(&mut p).unwrap(), f64::INFINITY);
        let bytes = [0x8f, 0xff, 0xff, 0x01];
        let mut p = &bytes[..];
        assert_eq!(unserialise_double(&mut p).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn underflowing_exponent_decodes_to_zero() {
        let bytes = [0x0f, 0x00, 0x00, 0x01];
        let mut p = &bytes[..];
        assert_eq!(unserialise_double(&mut p).unwrap(), 0.0);
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(unserialise_double(&mut &[][..]).is_err());
        assert!(unserialise_double(&mut &[0x07][..]).is_err());
        // Advertises a two-byte exponent but only carries one.
        assert!(unserialise_double(&mut &[0x0f, 0x00][..]).is_err());
        // Advertises two mantissa bytes but only carries one.
        assert!(unserialise_double(&mut &[0x17, 0x01][..]).is_err());
    }

    proptest! {
        #![proptest_config(Config {
            max_global_rejects: 1_000_000,
            ..Config::with_cases(100_000)
        })]
        #[test]
        fn roundtrip_is_bit_exact(v in any::<f64>()) {
            prop_assume!(v.is_finite() && v != 0.0);
            prop_assert_eq!(roundtrip(v).to_bits(), v.to_bits());
        }
    }
}
