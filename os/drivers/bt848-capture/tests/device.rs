mod common;

use bt848_capture::{
    CaptureDevice, CaptureEnable, CaptureError, CaptureGeometry, DeviceConfig, FieldPrograms,
    FrameInfo, InterruptStatus, IrqOutcome, SlotFault, SlotState,
};
use bt848_risc::{
    BusAddress, CaptureRequest, CompileError, PixelFormat, VideoStandard, risc_status,
};
use common::{Call, FakeBus, FakeEngine, complete_frame, device, layout, request, start};
use kernel_sync::{Interrupted, SpinWaitQueue};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

const FBUS: InterruptStatus = InterruptStatus::new().with_fbus(true);

/// Trampoline word holding the odd capture target.
const CAPTURE_ODD_TARGET: usize = 5;

fn queue_all(device: &common::Device, slots: impl IntoIterator<Item = usize>) {
    for slot in slots {
        device.request_capture(slot, request(), &layout(slot)).unwrap();
    }
}

#[test]
fn first_request_while_idle_becomes_active() {
    let (device, engine) = device(DeviceConfig::new().with_slots(4));
    queue_all(&device, 0..4);

    assert_eq!(device.active_slot(), Some(0));
    assert!(device.start_pending());
    assert_eq!(device.queue_depth(), 3);
    for slot in 0..4 {
        assert_eq!(device.slot_state(slot), Ok(SlotState::Grabbing));
    }

    // Nothing is spliced in before the start interrupt.
    let idle = device.trampoline_links().frame_odd_return.as_u32();
    assert_eq!(device.trampoline_words()[CAPTURE_ODD_TARGET], idle);
    assert_eq!(
        engine.last_arm(),
        Some(Call::Arm(CaptureEnable::fields(true, false)))
    );

    start(&device, &engine);
    assert!(!device.start_pending());
    assert_eq!(device.active_slot(), Some(0));
    assert_eq!(device.queue_depth(), 3);
    assert_ne!(device.trampoline_words()[CAPTURE_ODD_TARGET], idle);
    let geometry = CaptureGeometry::new(VideoStandard::Ntsc.timing(), &request());
    assert!(engine.state().calls.contains(&Call::Geometry(geometry)));
}

#[test]
fn completion_advances_the_queue() {
    let (device, engine) = device(DeviceConfig::new().with_slots(3));
    queue_all(&device, 0..3);
    start(&device, &engine);

    let bound = device.trampoline_words()[CAPTURE_ODD_TARGET];
    complete_frame(&device, &engine);
    assert_eq!(device.slot_state(0), Ok(SlotState::Done));
    assert_eq!(device.active_slot(), Some(1));
    assert_eq!(device.queue_depth(), 1);
    assert_ne!(device.trampoline_words()[CAPTURE_ODD_TARGET], bound);

    assert_eq!(
        device.completion_wait(0),
        Ok(FrameInfo {
            field: 1,
            sequence: 0
        })
    );
    assert_eq!(device.slot_state(0), Ok(SlotState::Unused));

    complete_frame(&device, &engine);
    complete_frame(&device, &engine);
    assert_eq!(device.active_slot(), None);
    assert_eq!(device.completion_wait(2).map(|i| i.sequence), Ok(2));
    assert_eq!(engine.last_arm(), Some(Call::Disarm));
    assert_eq!(device.stats().frames, 3);

    let idle = device.trampoline_links().frame_odd_return.as_u32();
    assert_eq!(device.trampoline_words()[CAPTURE_ODD_TARGET], idle);
}

#[test]
fn requesting_a_grabbing_slot_is_busy() {
    let (device, _engine) = device(DeviceConfig::new());
    queue_all(&device, [0]);
    assert_eq!(
        device.request_capture(0, request(), &layout(0)),
        Err(CaptureError::Busy)
    );
    assert_eq!(device.queue_depth(), 0);
    assert_eq!(device.active_slot(), Some(0));
}

#[test]
fn validation_and_capacity_leave_the_slot_unused() {
    let (device, _engine) = device(DeviceConfig::new().with_program_words(16));

    let tiny = CaptureRequest::new(PixelFormat::Rgb24, 8, 8);
    let err = device.request_capture(0, tiny, &layout(0)).unwrap_err();
    assert!(err.is_validation());

    let err = device.request_capture(0, request(), &layout(0)).unwrap_err();
    assert!(err.is_capacity());
    assert_eq!(device.slot_state(0), Ok(SlotState::Unused));
    assert_eq!(device.active_slot(), None);

    assert_eq!(
        device.request_capture(9, request(), &layout(0)),
        Err(CaptureError::InvalidSlot(9))
    );
}

#[test]
fn short_buffer_is_rejected() {
    let (device, _engine) = device(DeviceConfig::new());
    let short = bt848_risc::BufferLayout::contiguous(BusAddress::new(0x1000_0000), 4096).unwrap();
    assert!(matches!(
        device.request_capture(0, request(), &short),
        Err(CaptureError::Compile(CompileError::BufferTooSmall { .. }))
    ));
    assert!(device.request_capture(0, request(), &layout(0)).is_ok());
}

#[test]
fn faults_recover_until_the_threshold() {
    let (device, engine) = device(DeviceConfig::new().with_slots(2).with_fault_threshold(5));
    queue_all(&device, 0..2);
    start(&device, &engine);
    engine.take_calls();

    for _ in 0..4 {
        engine.raise(FBUS);
        assert_eq!(device.handle_interrupt(), IrqOutcome::Handled);
    }
    assert!(!device.needs_restart());
    assert_eq!(device.slot_state(0), Ok(SlotState::Grabbing));
    assert_eq!(device.stats().recoveries, 4);
    let base = engine
        .state()
        .calls
        .iter()
        .filter(|c| matches!(c, Call::ProgramBase(_)))
        .count();
    assert_eq!(base, 4);

    engine.raise(FBUS);
    device.handle_interrupt();
    assert!(device.needs_restart());
    assert_eq!(device.slot_state(0), Ok(SlotState::Error));
    assert_eq!(device.slot_state(1), Ok(SlotState::Error));
    assert_eq!(device.queue_depth(), 0);
    assert_eq!(device.active_slot(), None);
    assert_eq!(engine.state().mask, 0);

    let offline = device.completion_wait(0).unwrap_err();
    assert!(offline.is_fatal());
    assert_eq!(
        offline,
        CaptureError::Fault(SlotFault::DeviceOffline {
            faults: 5,
            status: FBUS.into_bits()
        })
    );
    assert_eq!(
        device.request_capture(0, request(), &layout(0)),
        Err(CaptureError::NeedsRestart)
    );

    // Masked: further events are not ours.
    engine.raise(FBUS);
    assert_eq!(device.handle_interrupt(), IrqOutcome::NotOurs);

    device.restart().unwrap();
    assert!(!device.needs_restart());
    assert_eq!(engine.state().mask, InterruptStatus::ENABLED.into_bits());
    device.request_capture(0, request(), &layout(0)).unwrap();
    assert_eq!(device.active_slot(), Some(0));
}

#[test]
fn fifo_resync_and_target_abort_are_faults() {
    let (device, engine) = device(DeviceConfig::new().with_fault_threshold(1));
    queue_all(&device, [0]);
    start(&device, &engine);

    engine.raise(InterruptStatus::new().with_fdsr(true).with_ftrgt(true));
    assert_eq!(device.handle_interrupt(), IrqOutcome::Handled);
    assert_eq!(device.stats().faults, 1);
    assert!(device.needs_restart());
    assert_eq!(device.slot_state(0), Ok(SlotState::Error));
}

#[test]
fn completed_frame_resets_the_fault_streak() {
    let (device, engine) = device(DeviceConfig::new().with_slots(3).with_fault_threshold(3));
    queue_all(&device, 0..3);
    start(&device, &engine);

    for _ in 0..2 {
        engine.raise(FBUS);
        device.handle_interrupt();
    }
    complete_frame(&device, &engine);
    for _ in 0..2 {
        engine.raise(FBUS);
        device.handle_interrupt();
    }
    assert!(!device.needs_restart());
    assert_eq!(device.stats().faults, 4);
}

#[test]
fn cancelling_a_queued_slot_leaves_the_trampoline_alone() {
    let (device, engine) = device(DeviceConfig::new().with_slots(3));
    queue_all(&device, 0..3);
    start(&device, &engine);
    let words = device.trampoline_words();
    engine.take_calls();

    device.cancel(1).unwrap();
    assert_eq!(device.trampoline_words(), words);
    assert!(engine.take_calls().is_empty());
    assert_eq!(device.slot_state(0), Ok(SlotState::Grabbing));
    assert_eq!(device.active_slot(), Some(0));
    assert_eq!(device.queue_depth(), 1);
    assert_eq!(
        device.completion_wait(1),
        Err(CaptureError::Fault(SlotFault::Cancelled))
    );

    complete_frame(&device, &engine);
    assert_eq!(device.active_slot(), Some(2));
}

#[test]
fn cancelling_the_active_slot_disarms_first() {
    let (device, engine) = device(DeviceConfig::new().with_slots(2));
    queue_all(&device, 0..2);
    start(&device, &engine);
    let before = device.trampoline_words()[CAPTURE_ODD_TARGET];
    engine.take_calls();

    device.cancel(0).unwrap();
    assert_eq!(engine.take_calls().first(), Some(&Call::Disarm));
    assert_eq!(device.slot_state(0), Ok(SlotState::Error));
    assert_eq!(device.active_slot(), Some(1));
    assert_ne!(device.trampoline_words()[CAPTURE_ODD_TARGET], before);
    assert_eq!(device.cancel(0), Err(CaptureError::NotQueued));
}

#[test]
fn cancel_all_fails_everything() {
    let (device, engine) = device(DeviceConfig::new().with_slots(3));
    queue_all(&device, 0..3);
    start(&device, &engine);

    device.cancel_all();
    for slot in 0..3 {
        assert_eq!(device.slot_state(slot), Ok(SlotState::Error));
    }
    assert_eq!(device.active_slot(), None);
    assert!(!device.start_pending());
    assert_eq!(engine.last_arm(), Some(Call::Disarm));
    assert!(!device.needs_restart());
}

#[test]
fn observed_states_follow_the_life_cycle() {
    let (device, engine) = device(DeviceConfig::new().with_fault_threshold(1));
    let mut seen = vec![device.slot_state(0).unwrap()];
    let mut observe = |device: &common::Device| seen.push(device.slot_state(0).unwrap());

    device.request_capture(0, request(), &layout(0)).unwrap();
    observe(&device);
    start(&device, &engine);
    observe(&device);
    complete_frame(&device, &engine);
    observe(&device);
    device.completion_wait(0).unwrap();
    observe(&device);
    device.request_capture(0, request(), &layout(0)).unwrap();
    observe(&device);
    engine.raise(FBUS);
    device.handle_interrupt();
    observe(&device);
    device.completion_wait(0).unwrap_err();
    observe(&device);

    for pair in seen.windows(2) {
        assert!(
            pair[0] == pair[1] || pair[0].can_become(pair[1]),
            "{:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
    assert!(seen.contains(&SlotState::Done));
    assert!(seen.contains(&SlotState::Error));
}

#[test]
fn interrupt_storm_takes_the_device_offline() {
    let (device, engine) = device(DeviceConfig::new().with_irq_loop_limit(4));
    queue_all(&device, [0]);
    engine.state().sticky = InterruptStatus::new().with_vsync(true).into_bits();

    assert_eq!(device.handle_interrupt(), IrqOutcome::Storm);
    assert!(device.needs_restart());
    assert_eq!(device.stats().storms, 1);
    assert_eq!(device.stats().interrupts, 4);
    assert_eq!(
        device.completion_wait(0),
        Err(CaptureError::Fault(SlotFault::InterruptStorm))
    );
}

#[test]
fn spurious_interrupts_are_not_ours() {
    let (device, engine) = device(DeviceConfig::new());
    assert_eq!(device.handle_interrupt(), IrqOutcome::NotOurs);
    engine.raise(InterruptStatus::new().with_gpint(true));
    assert_eq!(device.handle_interrupt(), IrqOutcome::NotOurs);
}

#[test]
fn lock_events_are_counted_only() {
    let (device, engine) = device(DeviceConfig::new());
    queue_all(&device, [0]);
    engine.raise(InterruptStatus::new().with_hlock(true).with_fmtchg(true));
    assert_eq!(device.handle_interrupt(), IrqOutcome::Handled);
    assert_eq!(device.stats().lock_events, 1);
    assert_eq!(device.slot_state(0), Ok(SlotState::Grabbing));
    assert!(device.start_pending());
}

#[test]
fn completion_wait_blocks_until_the_interrupt() {
    let (device, engine) = device(DeviceConfig::new());
    let device = Arc::new(device);
    queue_all(&device, [0]);

    let waiter = {
        let device = Arc::clone(&device);
        thread::spawn(move || device.completion_wait(0))
    };
    thread::yield_now();
    start(&device, &engine);
    complete_frame(&device, &engine);

    assert_eq!(waiter.join().unwrap().map(|i| i.sequence), Ok(0));
    assert_eq!(device.slot_state(0), Ok(SlotState::Unused));
}

#[test]
fn interrupted_wait_keeps_the_slot() {
    let (device, _engine) = device(DeviceConfig::new());
    assert_eq!(device.completion_wait(0), Err(CaptureError::NotQueued));

    queue_all(&device, [0]);
    device.wait_queue().interrupt();
    assert_eq!(
        device.completion_wait(0),
        Err(CaptureError::Interrupted(Interrupted))
    );
    assert_eq!(device.slot_state(0), Ok(SlotState::Grabbing));
}

#[test]
fn overlay_and_capture_are_exclusive() {
    let (device, engine) = device(DeviceConfig::new());
    let overlay = FieldPrograms {
        odd: BusAddress::new(0x0700_0000),
        even: BusAddress::new(0x0700_1000),
    };
    device.set_overlay(Some(overlay)).unwrap();
    assert_eq!(
        device.trampoline_words()[CAPTURE_ODD_TARGET],
        overlay.odd.as_u32()
    );
    assert_eq!(
        engine.last_arm(),
        Some(Call::Arm(CaptureEnable::fields(true, false)))
    );
    assert_eq!(
        device.request_capture(0, request(), &layout(0)),
        Err(CaptureError::OverlayActive)
    );

    device.set_overlay(None).unwrap();
    queue_all(&device, [0]);
    assert_eq!(device.set_overlay(Some(overlay)), Err(CaptureError::Busy));
}

#[test]
fn vbi_frames_wake_readers() {
    let (device, engine) = device(DeviceConfig::new());
    let vbi = FieldPrograms {
        odd: BusAddress::new(0x0800_0000),
        even: BusAddress::new(0x0800_1000),
    };
    device.enable_vbi(vbi).unwrap();
    assert_eq!(
        engine.last_arm(),
        Some(Call::Arm(CaptureEnable::fields(false, true)))
    );
    assert_eq!(device.trampoline_words()[3], vbi.odd.as_u32());
    assert_eq!(device.trampoline_words()[9], vbi.even.as_u32());

    assert_eq!(device.consume_vbi(100), 100);
    engine.raise_risc(risc_status::VBI_DONE);
    device.handle_interrupt();
    assert_eq!(device.vbi_wait(0), Ok(1));
    assert_eq!(device.consume_vbi(0), 0);
    assert_eq!(device.stats().vbi_frames, 1);

    device.disable_vbi();
    assert_eq!(engine.last_arm(), Some(Call::Disarm));
    let links = device.trampoline_links();
    assert_eq!(device.trampoline_words()[3], links.vbi_odd_return.as_u32());
}

#[test]
fn pal_programs_the_pll() {
    let engine = FakeEngine::default();
    let config = DeviceConfig::new().with_standard(VideoStandard::PalBdghi);
    let _device: common::Device =
        CaptureDevice::new(engine.clone(), &FakeBus::new(), config, SpinWaitQueue::new()).unwrap();

    let calls = engine.take_calls();
    assert!(calls.iter().any(|c| matches!(c, Call::Pll(Some(_)))));
    assert!(calls.contains(&Call::SelectPll));
    assert!(calls.contains(&Call::Reset));
}

#[test]
fn unlocked_pll_keeps_the_device_down() {
    let engine = FakeEngine::default();
    engine.state().pll_unlocked = true;
    let config = DeviceConfig::new().with_standard(VideoStandard::PalBdghi);
    let result: Result<common::Device, _> =
        CaptureDevice::new(engine.clone(), &FakeBus::new(), config, SpinWaitQueue::new());
    assert_eq!(result.err(), Some(CaptureError::PllUnlocked));
    assert!(!engine.take_calls().contains(&Call::SelectPll));
}

#[test]
fn standard_changes_only_while_idle() {
    let (device, engine) = device(DeviceConfig::new());
    device.set_standard(VideoStandard::PalBdghi).unwrap();
    assert_eq!(device.standard(), VideoStandard::PalBdghi);
    let idle = CaptureGeometry::idle(VideoStandard::PalBdghi.timing());
    assert!(engine.take_calls().contains(&Call::Geometry(idle)));

    queue_all(&device, [0]);
    assert_eq!(
        device.set_standard(VideoStandard::Ntsc),
        Err(CaptureError::Busy)
    );
}

#[test]
fn failed_standard_change_keeps_the_old_standard() {
    let (device, engine) = device(DeviceConfig::new());
    engine.state().pll_unlocked = true;
    assert_eq!(
        device.set_standard(VideoStandard::PalBdghi),
        Err(CaptureError::PllUnlocked)
    );
    assert_eq!(device.standard(), VideoStandard::Ntsc);
    assert!(device.needs_restart());

    let pal = CaptureGeometry::idle(VideoStandard::PalBdghi.timing());
    let calls = engine.take_calls();
    assert!(!calls.contains(&Call::Geometry(pal)));
    assert!(!calls.contains(&Call::SelectPll));
    assert_eq!(
        device.request_capture(0, request(), &layout(0)),
        Err(CaptureError::NeedsRestart)
    );

    engine.state().pll_unlocked = false;
    device.restart().unwrap();
    assert_eq!(device.standard(), VideoStandard::Ntsc);
    device.request_capture(0, request(), &layout(0)).unwrap();
}

static SETTLE_WAITS: AtomicU32 = AtomicU32::new(0);

fn slow_settle(ms: u32) {
    SETTLE_WAITS.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(u64::from(ms)));
}

#[test]
fn pll_settles_with_the_device_unlocked() {
    let engine = FakeEngine::default();
    engine.state().delay = Some(slow_settle);
    let config = DeviceConfig::new().with_pll_lock_polls(50);
    let device: common::Device =
        CaptureDevice::new(engine.clone(), &FakeBus::new(), config, SpinWaitQueue::new()).unwrap();
    engine.state().pll_unlocked = true;

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let change = s.spawn(|| {
            let result = device.set_standard(VideoStandard::PalBdghi);
            done.store(true, Ordering::SeqCst);
            result
        });
        while SETTLE_WAITS.load(Ordering::SeqCst) < 2 {
            thread::yield_now();
        }

        // Interrupts and queries go through while the clock settles.
        assert!(device.needs_restart());
        assert_eq!(device.handle_interrupt(), IrqOutcome::NotOurs);
        assert!(!done.load(Ordering::SeqCst));

        assert_eq!(change.join().unwrap(), Err(CaptureError::PllUnlocked));
    });
    assert_eq!(SETTLE_WAITS.load(Ordering::SeqCst), 50);
}
