use super::*;

#[test]
fn empty_table() {
    let t = DeviceTable::new();
    assert!(t.addresses().is_empty());
    assert_eq!(t.free_address(), Some(1));
    assert!(t.get(0).is_none());
    assert!(t.get(1).is_none());
    assert!(t.get(200).is_none());
}

#[test]
fn enumerate_and_promote() {
    let mut t = DeviceTable::default();
    let d = t.begin_enumeration(UsbSpeed::Full12);
    assert_eq!(d.address, 0);
    assert_eq!(d.control.max_packet_size, 8);
    d.control.max_packet_size = 64;
    d.class = 0xFF;

    let d = t.promote(1).unwrap();
    assert_eq!(d.address, 1);
    assert_eq!(d.control.max_packet_size, 64);
    assert!(t.get(0).is_none());
    assert_eq!(t.get(1).unwrap().class, 0xFF);
    assert_eq!(t.free_address(), Some(2));
    assert!(t.addresses().contains(1));
}

#[test]
fn table_exhaustion() {
    let mut t = DeviceTable::new();
    for a in 1..=MAX_DEVICES as u8 {
        t.begin_enumeration(UsbSpeed::Full12);
        t.promote(a).unwrap();
    }
    assert_eq!(t.free_address(), None);
}

#[test]
fn promote_without_device() {
    let mut t = DeviceTable::new();
    assert_eq!(t.promote(1).err(), Some(UsbError::NoSuchDevice));
}

#[test]
fn promote_to_bad_address() {
    let mut t = DeviceTable::new();
    t.begin_enumeration(UsbSpeed::Low1_5);
    assert_eq!(t.promote(0).err(), Some(UsbError::NoFreeAddress));
    assert_eq!(
        t.promote(MAX_DEVICES as u8 + 1).err(),
        Some(UsbError::NoFreeAddress)
    );
    assert!(t.get(0).is_some());
}

#[test]
fn clear_reports_addresses() {
    let mut t = DeviceTable::new();
    t.begin_enumeration(UsbSpeed::Full12);
    t.promote(2).unwrap();
    t.begin_enumeration(UsbSpeed::Full12);
    let gone = t.clear();
    assert_eq!(gone.iter().collect::<Vec<_>>(), vec![2]);
    assert!(!gone.contains(0));
    assert!(t.get(0).is_none());
    assert!(t.addresses().is_empty());
}

#[test]
fn address_set() {
    let mut s = AddressSet::new();
    assert!(s.is_empty());
    s.insert(3);
    s.insert(9);
    assert!(s.contains(3));
    assert!(!s.contains(9));
    assert!(!s.contains(2));
    assert_eq!(s.iter().collect::<Vec<_>>(), vec![3]);
}
