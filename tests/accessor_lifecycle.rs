//! Stand-alone accessor behavior: lifecycle, conversions, push-type reads,
//! void semantics and decorators against the in-memory dummy backend.

use reghal::backend::dummy::TransferKind;
use reghal::transfer::{TransferElementHandle, TransferType};
use reghal::{
    Access, AccessModeFlags, Backend, ChannelInfo, DataValidity, Device, DummyBackend,
    RegisterCatalogue, RegisterInfo, TransportType, VersionNumber,
};
use std::sync::Arc;

fn catalogue() -> RegisterCatalogue {
    let mut catalogue = RegisterCatalogue::new();
    catalogue.add_register(RegisterInfo::new_1d(
        "/ADC/GAIN",
        1,
        0,
        0x00,
        18,
        4,
        true,
        Access::ReadWrite,
    ));
    catalogue.add_register(RegisterInfo::new_1d(
        "/ADC/DATA",
        4,
        0,
        0x10,
        32,
        0,
        true,
        Access::ReadWrite,
    ));
    catalogue.add_register(RegisterInfo::new_1d(
        "/BOARD/STATUS",
        1,
        0,
        0x20,
        32,
        0,
        false,
        Access::ReadOnly,
    ));
    catalogue.add_register(RegisterInfo::new_1d(
        "/BOARD/TRIGGER",
        1,
        0,
        0x24,
        0,
        0,
        false,
        Access::WriteOnly,
    ));
    catalogue.add_register(
        RegisterInfo::new_1d("/IRQ/COUNT", 1, 0, 0x28, 32, 0, false, Access::ReadOnly)
            .with_interrupt(1, 2),
    );
    catalogue.add_register(
        RegisterInfo::new_1d("/IRQ/EVENT", 1, 0, 0x2C, 0, 0, false, Access::ReadOnly)
            .with_interrupt(1, 3),
    );
    catalogue.add_register(RegisterInfo::new_2d(
        "/DAQ/SAMPLES",
        4,
        0,
        0x40,
        32,
        vec![
            ChannelInfo::fixed_point(16, 0, true),
            ChannelInfo {
                bit_offset: 16,
                transport: TransportType::FixedPoint,
                width: 16,
                fractional_bits: 0,
                signed: false,
            },
        ],
        Access::ReadWrite,
    ));
    catalogue
}

fn open_device() -> (Arc<DummyBackend>, Device) {
    let backend = Arc::new(DummyBackend::new("lifecycle", catalogue()));
    let device = Device::new(backend.clone());
    device.open().unwrap();
    (backend, device)
}

#[test]
fn test_fixed_point_write_read_round_trip() {
    let (backend, device) = open_device();
    let mut gain = device.scalar::<f64>("/ADC/GAIN", AccessModeFlags::empty()).unwrap();

    gain.set_and_write(-3.125).unwrap();
    // -3.125 * 2^4 = -50, masked to 18 bits
    assert_eq!(backend.peek_word(0, 0).unwrap(), (-50i32 as u32) & 0x3FFFF);
    assert_eq!(gain.read_value().unwrap(), -3.125);

    // writing far beyond the range saturates at the descriptor maximum
    gain.set_and_write(1e9).unwrap();
    assert_eq!(gain.read_value().unwrap(), 8191.9375);
}

#[test]
fn test_version_numbers_are_monotonic_and_start_null() {
    let (_backend, device) = open_device();
    let mut first = device
        .scalar::<i32>("/ADC/DATA", AccessModeFlags::empty())
        .unwrap();
    let second = device
        .scalar::<i32>("/ADC/DATA", AccessModeFlags::empty())
        .unwrap();

    assert_eq!(first.version_number(), VersionNumber::null());
    assert_eq!(second.version_number(), VersionNumber::null());

    // repeated catalogue lookups describe the same register identically
    let catalogue = device.register_catalogue();
    assert_eq!(
        catalogue.get_register(&"/ADC/DATA".into()).unwrap(),
        catalogue.get_register(&"/ADC/DATA".into()).unwrap()
    );

    first.read().unwrap();
    let v1 = first.version_number();
    assert!(v1 > VersionNumber::null());

    first.read().unwrap();
    assert!(first.version_number() > v1);
}

#[test]
fn test_one_d_slice_with_offset() {
    let (backend, device) = open_device();
    for (index, value) in [5u32, 6, 7, 8].into_iter().enumerate() {
        backend.poke_word(0, 0x10 + 4 * index as u64, value).unwrap();
    }

    let mut tail = device
        .one_d::<i32>("/ADC/DATA", 2, 2, AccessModeFlags::empty())
        .unwrap();
    assert_eq!(tail.len(), 2);
    tail.read().unwrap();
    assert_eq!(tail.to_vec(), vec![7, 8]);

    // out-of-range slices are caller bugs
    assert!(device
        .one_d::<i32>("/ADC/DATA", 4, 2, AccessModeFlags::empty())
        .unwrap_err()
        .is_logic());
    assert!(device
        .one_d::<i32>("/ADC/DATA", 0, 4, AccessModeFlags::empty())
        .unwrap_err()
        .is_logic());
}

#[test]
fn test_raw_access_mode_requires_the_raw_word_type() {
    let (backend, device) = open_device();
    backend.poke_word(0, 0, (-50i32 as u32) & 0x3FFFF).unwrap();

    let mut raw = device.scalar::<i32>("/ADC/GAIN", AccessModeFlags::RAW).unwrap();
    raw.read().unwrap();
    assert_eq!(raw.get(), -50 & 0x3FFFF);

    let mut cooked = device.scalar::<f64>("/ADC/GAIN", AccessModeFlags::empty()).unwrap();
    cooked.read().unwrap();
    assert_eq!(cooked.get(), -3.125);

    let err = device
        .scalar::<f64>("/ADC/GAIN", AccessModeFlags::RAW)
        .unwrap_err();
    assert!(err.is_logic());
    assert!(err.to_string().contains("raw"));
}

#[test]
fn test_read_only_and_write_only_enforcement() {
    let (_backend, device) = open_device();

    let mut status = device
        .scalar::<u32>("/BOARD/STATUS", AccessModeFlags::empty())
        .unwrap();
    assert!(status.is_read_only());
    assert!(status.write().unwrap_err().is_logic());
    status.read().unwrap();

    // the trigger register carries no data, so a typed accessor is refused
    assert!(device
        .scalar::<i32>("/BOARD/TRIGGER", AccessModeFlags::empty())
        .unwrap_err()
        .is_logic());
}

#[test]
fn test_transfer_failure_marks_buffer_faulty_and_latches_backend() {
    let (backend, device) = open_device();
    let mut data = device
        .scalar::<i32>("/ADC/DATA", AccessModeFlags::empty())
        .unwrap();

    data.read().unwrap();
    assert_eq!(data.data_validity(), DataValidity::Ok);
    let version_before = data.version_number();

    backend.fail_all_reads(true);
    let err = data.read().unwrap_err();
    assert!(err.is_runtime());
    assert_eq!(data.data_validity(), DataValidity::Faulty);
    assert_eq!(data.version_number(), version_before);
    assert!(!backend.is_functional());

    backend.fail_all_reads(false);
    // still latched until recovery
    assert!(data.read().unwrap_err().is_runtime());
    device.recover().unwrap();
    data.read().unwrap();
    assert_eq!(data.data_validity(), DataValidity::Ok);
}

#[test]
fn test_double_pre_read_is_a_logic_error() {
    let (_backend, device) = open_device();
    let data = device
        .scalar::<i32>("/ADC/DATA", AccessModeFlags::empty())
        .unwrap();

    let element = data.high_level_element();
    element.lock().pre_read(TransferType::Read).unwrap();
    let err = element.lock().pre_read(TransferType::Read).unwrap_err();
    assert!(err.is_logic());
    assert!(err.to_string().contains("preRead"));
    element.lock().post_read(TransferType::Read, false).unwrap();
}

#[test]
fn test_push_accessor_blocking_and_polling() {
    let (backend, device) = open_device();
    let mut count = device
        .scalar::<u32>("/IRQ/COUNT", AccessModeFlags::WAIT_FOR_NEW_DATA)
        .unwrap();

    // nothing pending yet
    assert!(!count.read_non_blocking().unwrap());

    backend.poke_word(0, 0x28, 7).unwrap();
    backend.trigger_interrupt(1, 2);
    assert_eq!(count.read_value().unwrap(), 7);
    let first_version = count.version_number();

    // two pending deliveries, read_latest drains them in one go
    backend.poke_word(0, 0x28, 8).unwrap();
    backend.trigger_interrupt(1, 2);
    backend.poke_word(0, 0x28, 9).unwrap();
    backend.trigger_interrupt(1, 2);

    backend.clear_transfer_log();
    assert!(count.read_latest().unwrap());
    assert_eq!(count.get(), 9);
    assert!(count.version_number() > first_version);
    assert_eq!(
        backend
            .transfer_log()
            .iter()
            .filter(|r| r.kind == TransferKind::Read)
            .count(),
        1
    );

    assert!(!count.read_latest().unwrap());
    assert_eq!(count.data_validity(), DataValidity::Ok);
}

#[test]
fn test_void_accessor_semantics() {
    let (backend, device) = open_device();

    // synchronous void accessor on a writeable register: write-only trigger
    let mut trigger = device
        .void_accessor("/BOARD/TRIGGER", AccessModeFlags::empty())
        .unwrap();
    assert!(!trigger.is_readable());
    assert!(!trigger.is_read_only());
    assert!(trigger.read().unwrap_err().is_logic());
    assert!(trigger.read_non_blocking().unwrap_err().is_logic());
    assert!(trigger.read_latest().unwrap_err().is_logic());

    backend.clear_transfer_log();
    trigger.write().unwrap();
    let log = backend.transfer_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, TransferKind::Write);
    assert_eq!(log[0].address, 0x24);
    assert_eq!(log[0].n_words, 0, "void writes carry no payload");

    // a synchronous void accessor for a non-writeable register is refused
    assert!(device
        .void_accessor("/BOARD/STATUS", AccessModeFlags::empty())
        .unwrap_err()
        .is_logic());

    // push-type void accessor wakes up once per interrupt
    let mut event = device
        .void_accessor("/IRQ/EVENT", AccessModeFlags::WAIT_FOR_NEW_DATA)
        .unwrap();
    assert!(!event.read_non_blocking().unwrap());
    backend.trigger_interrupt(1, 3);
    event.read().unwrap();
    assert!(event.version_number() > VersionNumber::null());
    assert!(event.write().unwrap_err().is_logic());
}

#[test]
fn test_two_d_demultiplexing() {
    let (backend, device) = open_device();
    // each word holds one signed and one unsigned 16-bit channel
    for (block, (low, high)) in [(0i32, 100u32), (-5, 200), (7, 300), (-32768, 65535)]
        .iter()
        .enumerate()
    {
        let word = ((*low as u16) as u32) | (high << 16);
        backend.poke_word(0, 0x40 + 4 * block as u64, word).unwrap();
    }

    let mut samples = device.two_d::<i32>("/DAQ/SAMPLES", AccessModeFlags::empty()).unwrap();
    assert_eq!(samples.n_channels(), 2);
    assert_eq!(samples.n_elements_per_channel(), 4);

    samples.read().unwrap();
    assert_eq!(samples.channel_to_vec(0), vec![0, -5, 7, -32768]);
    assert_eq!(samples.channel_to_vec(1), vec![100, 200, 300, 65535]);

    // write back through the same layout
    samples.set(0, 0, -1);
    samples.set(1, 0, 42);
    samples.write().unwrap();
    assert_eq!(backend.peek_word(0, 0x40).unwrap(), 0x002A_FFFF);
}

#[test]
fn test_cast_decorator_checks_ranges_both_ways() {
    let (backend, device) = open_device();
    backend.poke_word(0, 0x10, 300).unwrap();

    let mut narrow = device
        .scalar::<i32>("/ADC/DATA", AccessModeFlags::empty())
        .unwrap()
        .cast::<u8>();

    let err = narrow.read().unwrap_err();
    assert!(err.is_numeric_cast());
    assert_eq!(narrow.data_validity(), DataValidity::Faulty);

    backend.poke_word(0, 0x10, 99).unwrap();
    narrow.read().unwrap();
    assert_eq!(narrow.get(), 99u8);
    assert_eq!(narrow.data_validity(), DataValidity::Ok);

    narrow.set(255);
    narrow.write().unwrap();
    assert_eq!(backend.peek_word(0, 0x10).unwrap(), 255);
}

#[test]
fn test_write_destructively_behaves_like_write() {
    let (backend, device) = open_device();
    let mut data = device
        .one_d::<i32>("/ADC/DATA", 0, 0, AccessModeFlags::empty())
        .unwrap();
    data.set_from(&[9, 8, 7, 6]).unwrap();
    data.write_destructively().unwrap();
    assert_eq!(backend.peek_word(0, 0x10).unwrap(), 9);
    assert_eq!(backend.peek_word(0, 0x1C).unwrap(), 6);
}

#[test]
fn test_missing_register_is_a_logic_error() {
    let (_backend, device) = open_device();
    assert!(device
        .scalar::<i32>("/NO/SUCH/REGISTER", AccessModeFlags::empty())
        .unwrap_err()
        .is_logic());
}
