/// Set bit `bit` of `x` on if `toggle` is true, otherwise off.
pub fn bit(bit: u64, x: u64, toggle: bool) -> u64 {
    if toggle {
        x | (1 << bit)
    } else {
        x & !(1 << bit)
    }
}

/// Test whether bit `bit` of `x` is set.
pub fn test_bit(bit: u64, x: u64) -> bool {
    (x >> bit) & 1 == 1
}

/// Pack a 48-bit hardware address into the low bytes of a `u64`.
pub fn mac_of_bytes(addr: [u8; 6]) -> u64 {
    addr.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

/// Unpack the low 48 bits of `addr` into network byte order.
pub fn bytes_of_mac(addr: u64) -> [u8; 6] {
    let mut arr = [0; 6];
    for (i, b) in arr.iter_mut().enumerate() {
        *b = ((addr >> (8 * (5 - i))) & 0xff) as u8;
    }
    arr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_round_trip() {
        let mac = 0x00163e000001;
        assert_eq!(mac_of_bytes(bytes_of_mac(mac)), mac);
        assert_eq!(bytes_of_mac(mac), [0x00, 0x16, 0x3e, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn bit_toggling() {
        assert!(test_bit(3, bit(3, 0, true)));
        assert!(!test_bit(3, bit(3, 0xff, false)));
    }
}
