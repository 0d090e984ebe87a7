use super::*;
use hex_literal::hex;

#[test]
fn boundaries() {
    // Each pair of values straddles a change in encoded length
    let table: &[(u64, usize)] = &[
        (0, 1),
        (0x7F, 1),
        (0x80, 2),
        (0x3FFF, 2),
        (0x4000, 3),
        (0x1F_FFFF, 3),
        (0x20_0000, 4),
        (0xFFF_FFFF, 4),
        (0x1000_0000, 5),
        (0x7_FFFF_FFFF, 5),
        (0x8_0000_0000, 6),
        (0x3FF_FFFF_FFFF, 6),
        (0x400_0000_0000, 7),
        (0x1_FFFF_FFFF_FFFF, 7),
        (0x2_0000_0000_0000, 8),
        (0xFF_FFFF_FFFF_FFFF, 8),
        (0x100_0000_0000_0000, 9),
        (0x7FFF_FFFF_FFFF_FFFF, 9),
        (0x8000_0000_0000_0000, 10),
        (u64::MAX, 10),
    ];

    let mut last = 0;
    for (value, len) in table {
        assert_eq!(encoding_len(*value), *len, "encoding_len({value:#x})");
        assert_eq!(emit(*value).len(), *len, "emit({value:#x})");
        assert!(*len >= last);
        last = *len;
    }
}

#[test]
fn vectors() {
    // RFC 6256, Section 2.1
    assert_eq!(*emit(0), hex!("00"));
    assert_eq!(*emit(1), hex!("01"));
    assert_eq!(*emit(0x7F), hex!("7f"));
    assert_eq!(*emit(0x80), hex!("8100"));
    assert_eq!(*emit(0xABC), hex!("953c"));
    assert_eq!(*emit(0x1234), hex!("a434"));
    assert_eq!(*emit(0x4234), hex!("818434"));
    assert_eq!(*emit(1 << 63), hex!("81808080808080808000"));
    assert_eq!(*emit(u64::MAX), hex!("81ffffffffffffffff7f"));
}

#[test]
fn short_buffer() {
    let mut buf = [0u8; 2];
    assert_eq!(
        encode(0x4000, &mut buf),
        Err(Error::BufferTooSmall {
            needed: 3,
            available: 2
        })
    );
    assert_eq!(encode(0x3FFF, &mut buf), Ok(2));
    assert_eq!(buf, hex!("ff7f"));

    let mut empty = [0u8; 0];
    assert!(encode(0, &mut empty).is_err());
}
