use std::io::Write;

use crate::error::Error;

pub fn write_vint(write: &mut dyn Write, mut value: u64) -> Result<u32, std::io::Error> {
    let mut count = 1;
    while (value & !0x7F) != 0 {
        write.write_all(&[((value & 0x7F) | 0x80) as u8])?;
        value >>= 7;
        count += 1;
    }
    write.write_all(&[value as u8])?;
    Ok(count)
}

pub fn read_vint(buf: &[u8], pos: &mut usize) -> Result<u64, Error> {
    let mut res: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = match buf.get(*pos) {
            Some(b) => *b,
            None => return Err(Error::Database("truncated vint".to_string())),
        };
        *pos += 1;
        res |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(res);
        }
        shift += 7;
    }
}

#[cfg(test)]
mod tests {

    use super::read_vint;
    use super::write_vint;
    use proptest::prelude::*;
    use proptest::test_runner::Config;

    proptest! {
        #![proptest_config(Config::with_cases(100_000))]
        #[test]
        fn read_write_correct(num in any::<u64>()) {
            let mut buf = Vec::new();
            write_vint(&mut buf, num).unwrap();
            let mut pos = 0;
            assert!(num == read_vint(&buf, &mut pos).unwrap());
            assert!(pos == buf.len());
        }
    }
}
