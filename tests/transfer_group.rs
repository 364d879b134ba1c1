//! Transfer-group coalescing and error-consolidation behavior against the
//! in-memory dummy backend.

use reghal::backend::dummy::TransferKind;
use reghal::{
    Access, AccessModeFlags, Backend, DataValidity, Device, DummyBackend, RegisterCatalogue,
    RegisterInfo, TransferGroup,
};
use std::sync::Arc;

fn overlap_catalogue() -> RegisterCatalogue {
    let mut catalogue = RegisterCatalogue::new();
    catalogue.add_register(RegisterInfo::new_1d(
        "/MOD/A",
        4,
        0,
        0,
        32,
        0,
        true,
        Access::ReadWrite,
    ));
    catalogue.add_register(RegisterInfo::new_1d(
        "/MOD/B",
        2,
        0,
        8,
        32,
        0,
        true,
        Access::ReadWrite,
    ));
    catalogue
}

fn spread_catalogue() -> RegisterCatalogue {
    let mut catalogue = RegisterCatalogue::new();
    catalogue.add_register(RegisterInfo::new_1d(
        "/R/A",
        1,
        0,
        0x0,
        32,
        0,
        true,
        Access::ReadWrite,
    ));
    catalogue.add_register(RegisterInfo::new_1d(
        "/R/B",
        1,
        0,
        0x100,
        32,
        0,
        true,
        Access::ReadWrite,
    ));
    catalogue.add_register(RegisterInfo::new_1d(
        "/R/C",
        1,
        0,
        0x200,
        32,
        0,
        true,
        Access::ReadWrite,
    ));
    catalogue
}

fn open_device(catalogue: RegisterCatalogue) -> (Arc<DummyBackend>, Device) {
    static TRACING: std::sync::Once = std::sync::Once::new();
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });

    let backend = Arc::new(DummyBackend::new("groupdev", catalogue));
    let device = Device::new(backend.clone());
    device.open().unwrap();
    (backend, device)
}

#[test]
fn test_overlapping_accessors_coalesce_into_one_read() {
    let (backend, device) = open_device(overlap_catalogue());
    for (offset, value) in [(0, 10), (4, 11), (8, 12), (12, 13)] {
        backend.poke_word(0, offset, value).unwrap();
    }

    let a = device
        .one_d::<i32>("/MOD/A", 0, 0, AccessModeFlags::empty())
        .unwrap();
    let b = device
        .one_d::<i32>("/MOD/B", 0, 0, AccessModeFlags::empty())
        .unwrap();

    let mut group = TransferGroup::new();
    group.add(&a).unwrap();
    group.add(&b).unwrap();
    assert_eq!(group.n_hardware_elements(), 1);

    backend.clear_transfer_log();
    group.read().unwrap();

    let log = backend.transfer_log();
    assert_eq!(log.len(), 1, "expected exactly one coalesced read");
    assert_eq!(log[0].kind, TransferKind::Read);
    assert_eq!(log[0].address, 0);
    assert_eq!(log[0].n_words, 4);

    assert_eq!(a.to_vec(), vec![10, 11, 12, 13]);
    assert_eq!(b.to_vec(), vec![12, 13]);
    assert_eq!(a.data_validity(), DataValidity::Ok);
    assert_eq!(b.data_validity(), DataValidity::Ok);
}

#[test]
fn test_partially_overlapping_accessors_merge_into_a_spanning_read() {
    let mut catalogue = RegisterCatalogue::new();
    catalogue.add_register(RegisterInfo::new_1d(
        "/MOD/HEAD",
        3,
        0,
        0,
        32,
        0,
        true,
        Access::ReadWrite,
    ));
    catalogue.add_register(RegisterInfo::new_1d(
        "/MOD/TAIL",
        2,
        0,
        8,
        32,
        0,
        true,
        Access::ReadWrite,
    ));
    let (backend, device) = open_device(catalogue);
    for (offset, value) in [(0u64, 20u32), (4, 21), (8, 22), (12, 23)] {
        backend.poke_word(0, offset, value).unwrap();
    }

    // head covers [0, 12), tail covers [8, 16): neither contains the other,
    // so a fresh element spanning [0, 16) must replace both
    let head = device
        .one_d::<i32>("/MOD/HEAD", 0, 0, AccessModeFlags::empty())
        .unwrap();
    let tail = device
        .one_d::<i32>("/MOD/TAIL", 0, 0, AccessModeFlags::empty())
        .unwrap();

    let mut group = TransferGroup::new();
    group.add(&head).unwrap();
    group.add(&tail).unwrap();
    assert_eq!(group.n_hardware_elements(), 1);

    backend.clear_transfer_log();
    group.read().unwrap();

    let log = backend.transfer_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].address, 0);
    assert_eq!(log[0].n_words, 4);
    assert_eq!(head.to_vec(), vec![20, 21, 22]);
    assert_eq!(tail.to_vec(), vec![22, 23]);
}

#[test]
fn test_group_write_shares_the_coalesced_block() {
    let (backend, device) = open_device(overlap_catalogue());

    let mut a = device
        .one_d::<i32>("/MOD/A", 0, 0, AccessModeFlags::empty())
        .unwrap();
    let mut b = device
        .one_d::<i32>("/MOD/B", 0, 0, AccessModeFlags::empty())
        .unwrap();

    let mut group = TransferGroup::new();
    group.add(&a).unwrap();
    group.add(&b).unwrap();

    a.set_from(&[1, 2, 3, 4]).unwrap();
    b.set_from(&[30, 40]).unwrap();

    backend.clear_transfer_log();
    group.write().unwrap();

    assert_eq!(
        backend
            .transfer_log()
            .iter()
            .filter(|r| r.kind == TransferKind::Write)
            .count(),
        1
    );
    // B's elements alias A's tail and were encoded last
    assert_eq!(backend.peek_word(0, 0).unwrap(), 1);
    assert_eq!(backend.peek_word(0, 4).unwrap(), 2);
    assert_eq!(backend.peek_word(0, 8).unwrap(), 30);
    assert_eq!(backend.peek_word(0, 12).unwrap(), 40);
}

#[test]
fn test_distinct_registers_keep_distinct_leaves() {
    let (backend, device) = open_device(spread_catalogue());
    backend.poke_word(0, 0x0, 1).unwrap();
    backend.poke_word(0, 0x100, 2).unwrap();
    backend.poke_word(0, 0x200, 3).unwrap();

    let a = device.scalar::<i32>("/R/A", AccessModeFlags::empty()).unwrap();
    let b = device.scalar::<i32>("/R/B", AccessModeFlags::empty()).unwrap();
    let c = device.scalar::<i32>("/R/C", AccessModeFlags::empty()).unwrap();

    let mut group = TransferGroup::new();
    group.add(&a).unwrap();
    group.add(&b).unwrap();
    group.add(&c).unwrap();
    assert_eq!(group.n_hardware_elements(), 3);

    backend.clear_transfer_log();
    group.read().unwrap();
    assert_eq!(backend.transfer_log().len(), 3);
    assert_eq!((a.get(), b.get(), c.get()), (1, 2, 3));
}

#[test]
fn test_runtime_error_propagates_after_all_post_phases() {
    let (backend, device) = open_device(spread_catalogue());
    backend.fail_reads_at(0, 0x100);

    let a = device.scalar::<i32>("/R/A", AccessModeFlags::empty()).unwrap();
    let b = device.scalar::<i32>("/R/B", AccessModeFlags::empty()).unwrap();
    let c = device.scalar::<i32>("/R/C", AccessModeFlags::empty()).unwrap();

    let mut group = TransferGroup::new();
    group.add(&a).unwrap();
    group.add(&b).unwrap();
    group.add(&c).unwrap();

    let err = group.read().unwrap_err();
    assert!(err.is_runtime());
    assert!(err.to_string().contains("simulated read failure"));

    // the whole cycle is marked faulty, including the accessor whose leaf
    // transferred before the failure
    assert_eq!(a.data_validity(), DataValidity::Faulty);
    assert_eq!(b.data_validity(), DataValidity::Faulty);
    assert_eq!(c.data_validity(), DataValidity::Faulty);

    // the backend latched the fault and needs recovery
    assert!(!backend.is_functional());
    let err = group.read().unwrap_err();
    assert!(err.is_runtime());

    backend.clear_failures();
    device.recover().unwrap();
    group.read().unwrap();
    assert_eq!(a.data_validity(), DataValidity::Ok);
}

#[test]
fn test_read_only_group_rejects_write_without_touching_backend() {
    let mut catalogue = spread_catalogue();
    catalogue.add_register(RegisterInfo::new_1d(
        "/R/STATUS",
        1,
        0,
        0x300,
        32,
        0,
        true,
        Access::ReadOnly,
    ));
    let (backend, device) = open_device(catalogue);

    let rw = device.scalar::<i32>("/R/A", AccessModeFlags::empty()).unwrap();
    let ro = device
        .scalar::<i32>("/R/STATUS", AccessModeFlags::empty())
        .unwrap();

    let mut group = TransferGroup::new();
    group.add(&rw).unwrap();
    group.add(&ro).unwrap();
    assert!(group.is_read_only());

    backend.clear_transfer_log();
    let err = group.write().unwrap_err();
    assert!(err.is_logic());
    assert!(err.to_string().contains("read-only"));
    assert!(backend.transfer_log().is_empty());

    // the group is still fully usable for reading
    group.read().unwrap();
}

#[test]
fn test_wait_for_new_data_accessor_is_rejected() {
    let mut catalogue = spread_catalogue();
    catalogue.add_register(
        RegisterInfo::new_1d("/IRQ/DATA", 1, 0, 0x400, 32, 0, true, Access::ReadOnly)
            .with_interrupt(1, 2),
    );
    let (_backend, device) = open_device(catalogue);

    let push = device
        .scalar::<i32>("/IRQ/DATA", AccessModeFlags::WAIT_FOR_NEW_DATA)
        .unwrap();
    let plain = device.scalar::<i32>("/R/A", AccessModeFlags::empty()).unwrap();

    let mut group = TransferGroup::new();
    group.add(&plain).unwrap();

    let err = group.add(&push).unwrap_err();
    assert!(err.is_logic());
    assert!(err.to_string().contains("wait_for_new_data"));
    assert_eq!(group.n_hardware_elements(), 1);

    // the membership flag was not set: a second attempt fails for the same
    // reason, not with "already in a group"
    let err = group.add(&push).unwrap_err();
    assert!(err.to_string().contains("wait_for_new_data"));
}

#[test]
fn test_accessor_cannot_join_two_groups() {
    let (_backend, device) = open_device(spread_catalogue());
    let a = device.scalar::<i32>("/R/A", AccessModeFlags::empty()).unwrap();

    let mut first = TransferGroup::new();
    first.add(&a).unwrap();

    let mut second = TransferGroup::new();
    let err = second.add(&a).unwrap_err();
    assert!(err.is_logic());
    assert!(err.to_string().contains("already in a TransferGroup"));
    assert_eq!(second.n_hardware_elements(), 0);
    assert_eq!(first.n_hardware_elements(), 1);
}

#[test]
fn test_same_register_accessors_share_one_leaf() {
    let (backend, device) = open_device(spread_catalogue());
    backend.poke_word(0, 0x0, 123).unwrap();

    let first = device.scalar::<i32>("/R/A", AccessModeFlags::empty()).unwrap();
    let second = device.scalar::<i32>("/R/A", AccessModeFlags::empty()).unwrap();

    let mut group = TransferGroup::new();
    group.add(&first).unwrap();
    group.add(&second).unwrap();
    assert_eq!(group.n_hardware_elements(), 1);

    backend.clear_transfer_log();
    group.read().unwrap();
    assert_eq!(backend.transfer_log().len(), 1);
    assert_eq!(first.get(), 123);
    assert_eq!(second.get(), 123);
}

#[test]
fn test_copy_decorator_in_a_group_materializes_after_the_transfer() {
    let (backend, device) = open_device(spread_catalogue());
    backend.poke_word(0, 0x100, 55).unwrap();

    let source = device.scalar::<i32>("/R/B", AccessModeFlags::empty()).unwrap();
    let copy = source.to_copy();

    let mut group = TransferGroup::new();
    group.add(&copy).unwrap();
    assert!(group.is_read_only());

    group.read().unwrap();
    assert_eq!(copy.get(), 55);
    assert_eq!(copy.data_validity(), DataValidity::Ok);

    backend.poke_word(0, 0x100, 56).unwrap();
    group.read().unwrap();
    assert_eq!(copy.get(), 56);
}

#[test]
fn test_numeric_cast_error_surfaces_after_runtime_checks() {
    let (backend, device) = open_device(spread_catalogue());
    backend.poke_word(0, 0x0, 300).unwrap();
    backend.poke_word(0, 0x100, 7).unwrap();

    let narrow = device
        .scalar::<i32>("/R/A", AccessModeFlags::empty())
        .unwrap()
        .cast::<u8>();
    let plain = device.scalar::<i32>("/R/B", AccessModeFlags::empty()).unwrap();

    let mut group = TransferGroup::new();
    group.add(&narrow).unwrap();
    group.add(&plain).unwrap();

    // 300 does not fit into u8: the transfer succeeds, the decode reports a
    // cast error, and the unaffected member still updates
    let err = group.read().unwrap_err();
    assert!(err.is_numeric_cast());
    assert_eq!(plain.get(), 7);

    // once the value fits, the same group reads cleanly
    backend.poke_word(0, 0x0, 200).unwrap();
    group.read().unwrap();
    assert_eq!(narrow.get(), 200u8);
}

#[test]
fn test_each_leaf_transfers_at_most_once_per_cycle() {
    let (backend, device) = open_device(overlap_catalogue());

    let a = device
        .one_d::<i32>("/MOD/A", 0, 0, AccessModeFlags::empty())
        .unwrap();
    let a_again = device
        .one_d::<i32>("/MOD/A", 0, 0, AccessModeFlags::empty())
        .unwrap();
    let b = device
        .one_d::<i32>("/MOD/B", 0, 0, AccessModeFlags::empty())
        .unwrap();

    let mut group = TransferGroup::new();
    group.add(&a).unwrap();
    group.add(&a_again).unwrap();
    group.add(&b).unwrap();

    for _ in 0..3 {
        backend.clear_transfer_log();
        group.read().unwrap();
        assert_eq!(backend.transfer_log().len(), 1);
    }
}
