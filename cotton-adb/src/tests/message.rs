use super::*;

#[test]
fn command_codes_are_fourcc() {
    assert_eq!(&A_CNXN.to_le_bytes(), b"CNXN");
    assert_eq!(&A_OPEN.to_le_bytes(), b"OPEN");
    assert_eq!(&A_OKAY.to_le_bytes(), b"OKAY");
    assert_eq!(&A_CLSE.to_le_bytes(), b"CLSE");
    assert_eq!(&A_WRTE.to_le_bytes(), b"WRTE");
    assert_eq!(&A_SYNC.to_le_bytes(), b"SYNC");
}

#[test]
fn command_from_code() {
    for c in [
        Command::Sync,
        Command::Connect,
        Command::Open,
        Command::Okay,
        Command::Close,
        Command::Write,
    ] {
        assert_eq!(Command::from_code(c.code()), Some(c));
    }
    assert_eq!(Command::from_code(0x12345678), None);
}

#[test]
fn checksum_wraps() {
    assert_eq!(checksum(&[]), 0);
    assert_eq!(checksum(&[1, 2, 3]), 6);
    assert_eq!(checksum(&[0xFF; 4]), 0x3FC);
    assert_eq!(checksum_update(0xFFFF_FFFF, &[2]), 1);
}

#[test]
fn checksum_in_pieces() {
    let data = b"shell:ls -l\0";
    let sum = checksum_update(checksum(&data[..5]), &data[5..]);
    assert_eq!(sum, checksum(data));
}

#[test]
fn new_message_invariants() {
    let m = Message::new(Command::Open, 1, 0, b"tcp:4567\0");
    assert_eq!(m.command, A_OPEN);
    assert_eq!(m.magic, A_OPEN ^ 0xFFFF_FFFF);
    assert_eq!(m.data_length, 9);
    assert_eq!(m.data_check, checksum(b"tcp:4567\0"));
    assert!(m.is_valid());
    assert_eq!(m.command(), Some(Command::Open));
    assert!(m.verify(b"tcp:4567\0"));
    assert!(!m.verify(b"tcp:4568\0"));
    assert!(!m.verify(b"tcp:4567"));
}

#[test]
fn empty_message() {
    let m = Message::new(Command::Okay, 3, 7, &[]);
    assert_eq!(m.data_length, 0);
    assert_eq!(m.data_check, 0);
    assert!(m.verify(&[]));
}

#[test]
fn wire_layout() {
    let m = Message::new(Command::Write, 0x0102_0304, 5, &[10, 20]);
    let b = m.to_bytes();
    assert_eq!(&b[0..4], b"WRTE");
    assert_eq!(&b[4..8], &[4, 3, 2, 1]);
    assert_eq!(&b[8..12], &[5, 0, 0, 0]);
    assert_eq!(&b[12..16], &[2, 0, 0, 0]);
    assert_eq!(&b[16..20], &[30, 0, 0, 0]);
    assert_eq!(&b[20..24], &(A_WRTE ^ 0xFFFF_FFFF).to_le_bytes());
}

#[test]
fn header_survives_the_wire() {
    let payload = b"host::microbridge\0";
    let m = Message::new(Command::Connect, 0x0100_0000, 4096, payload);
    let parsed = Message::from_bytes(&m.to_bytes()).unwrap();
    assert_eq!(parsed, m);
    assert!(parsed.is_valid());
    assert!(parsed.verify(payload));
}

#[test]
fn from_bytes_wrong_size() {
    let b = Message::new(Command::Okay, 1, 2, &[]).to_bytes();
    assert!(Message::from_bytes(&b[..23]).is_none());
    let mut long = [0u8; 25];
    long[..24].copy_from_slice(&b);
    assert!(Message::from_bytes(&long).is_none());
}

#[test]
fn bad_magic_detected() {
    let mut b = Message::new(Command::Okay, 1, 2, &[]).to_bytes();
    b[20] ^= 1;
    let m = Message::from_bytes(&b).unwrap();
    assert!(!m.is_valid());
}
