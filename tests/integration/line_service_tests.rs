//! LineService integration tests.
//!
//! Drive full batches through the service with the mock bus standing in for
//! the controller, and check registers, events, prints and snapshots.

use inspectline::app::commands::LineCommand;
use inspectline::app::events::{LineEvent, LineSnapshot, LineStatus};
use inspectline::error::{Error, ErrorClass, LabelError, PrintError, ValidationError};
use inspectline::production::{BoxOutcome, BoxSubState, RunDescriptor, RunStatus};

use crate::mock_hw::*;

fn count(events: &[LineEvent], wanted: &LineEvent) -> usize {
    events.iter().filter(|e| *e == wanted).count()
}

// ── Start ─────────────────────────────────────────────────────

#[test]
fn start_resets_registers_and_commands_conveyor() {
    let line = TestLine::new();
    line.bus.poke(INDICATOR, 2);
    line.bus.poke(COMPLETE, 1);
    line.bus.poke(ACCEPTED, 9);

    let snap = line.service.start(TestLine::descriptor(), 3).unwrap();

    assert_eq!(snap.status, LineStatus::WaitingForConveyor);
    assert_eq!(snap.requested, 3);
    assert_eq!(snap.remaining, 3);
    assert_eq!(snap.current_ordinal, Some(1));
    assert_eq!(snap.current_code.as_deref(), Some("CODE-1"));
    assert_eq!(line.bus.peek(CONVEYOR), 1);
    assert_eq!(line.bus.peek(ACCEPTED), 0);
    assert_eq!(line.bus.peek(INDICATOR), 0);
    assert_eq!(line.bus.peek(COMPLETE), 0);
    assert_eq!(line.events(), vec![LineEvent::RunStarted { quantity: 3 }]);
}

#[test]
fn start_rejects_bad_requests_without_touching_the_bus() {
    let line = TestLine::new();

    let err = line.service.start(TestLine::descriptor(), 0).unwrap_err();
    assert_eq!(err, Error::Validation(ValidationError::ZeroQuantity));
    assert_eq!(err.class(), ErrorClass::Terminal);

    let err = line.service.start(TestLine::descriptor(), 10_001).unwrap_err();
    assert_eq!(
        err,
        Error::Validation(ValidationError::QuantityTooLarge {
            requested: 10_001,
            max: 10_000
        })
    );

    let err = line
        .service
        .start(RunDescriptor::new("Marie", "  ", "custom"), 2)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Validation(ValidationError::MissingDescriptor(_))
    ));

    assert!(line.bus.calls().is_empty());
    assert_eq!(line.service.snapshot(), LineSnapshot::idle());
}

#[test]
fn start_while_active_is_refused() {
    let line = TestLine::running(2);
    let err = line.service.start(TestLine::descriptor(), 1).unwrap_err();
    assert_eq!(err, Error::Validation(ValidationError::RunAlreadyActive));
    assert_eq!(line.service.snapshot().requested, 2);
}

#[test]
fn label_failure_leaves_line_idle() {
    let line = TestLine::new();
    line.code_failure.store(true, std::sync::atomic::Ordering::SeqCst);

    let err = line.service.start(TestLine::descriptor(), 2).unwrap_err();
    assert_eq!(err, Error::Label(LabelError::Exhausted));
    assert!(err.is_retryable());
    assert!(line.bus.writes().is_empty());
    assert_eq!(line.service.snapshot().status, LineStatus::Idle);
}

#[test]
fn start_bus_failure_does_not_install_run() {
    let line = TestLine::new();
    line.bus.set_offline(true);

    let err = line.service.start(TestLine::descriptor(), 2).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(line.service.snapshot().status, LineStatus::Idle);
    assert!(line.storage.raw("line", "run").is_none());
}

#[test]
fn preset_command_uses_configured_quantity() {
    let line = TestLine::new();
    let snap = line
        .service
        .handle_command(LineCommand::Start {
            descriptor: RunDescriptor::new("Marie", "Acme", "P1"),
            quantity: None,
        })
        .unwrap();
    assert_eq!(snap.requested, 10);
}

// ── Conveyor acknowledgment ───────────────────────────────────

#[test]
fn waits_until_line_acknowledges() {
    let line = TestLine::new();
    line.service.start(TestLine::descriptor(), 2).unwrap();

    // The run command itself is not an acknowledgment.
    let snap = line.service.poll().unwrap();
    assert_eq!(snap.status, LineStatus::WaitingForConveyor);
    assert_eq!(snap.sub_state, None);

    line.bus.poke(CONVEYOR, 5);
    let snap = line.service.poll().unwrap();
    assert_eq!(snap.status, LineStatus::Running);
    assert_eq!(snap.sub_state, Some(BoxSubState::AwaitingProximity1));
    assert!(line.events().contains(&LineEvent::ConveyorAcknowledged));
    assert!(line.service.summary().line_started_at.is_some());
}

// ── Happy path ────────────────────────────────────────────────

#[test]
fn box_moves_through_print_and_scan_stations() {
    let line = TestLine::running(2);

    line.bus.poke(PROXIMITY_1, 1);
    let snap = line.service.poll().unwrap();
    assert_eq!(snap.sub_state, Some(BoxSubState::AwaitingProximity2));
    assert_eq!(line.printer.jobs(), vec!["labels/CODE-1.png".to_string()]);
    assert_eq!(line.bus.peek(PROXIMITY_1), 0);

    line.bus.poke(PROXIMITY_2, 1);
    let snap = line.service.poll().unwrap();
    assert_eq!(snap.sub_state, Some(BoxSubState::AwaitingScan));
    assert_eq!(snap.scan_time_remaining_secs, Some(5.0));
    assert_eq!(line.bus.peek(PROXIMITY_2), 0);

    line.bus.poke(SCANNER, 1);
    let snap = line.service.poll().unwrap();
    assert_eq!(snap.sub_state, Some(BoxSubState::AwaitingProximity1));
    assert_eq!(snap.accepted, 1);
    assert_eq!(snap.current_ordinal, Some(2));
    assert_eq!(line.bus.peek(ACCEPTED), 1);
    assert_eq!(line.bus.peek(INDICATOR), 1);
    assert_eq!(line.bus.peek(SCANNER), 0);
    assert!(line
        .events()
        .contains(&LineEvent::BoxAccepted { ordinal: 1, accepted: 1 }));
}

#[test]
fn full_batch_completes() {
    let line = TestLine::running(2);
    line.pass_box();
    line.pass_box();

    let snap = line.service.snapshot();
    assert_eq!(snap.status, LineStatus::Completed);
    assert_eq!(snap.sub_state, None);
    assert_eq!(snap.accepted, 2);
    assert_eq!(snap.remaining, 0);
    assert_eq!(snap.current_ordinal, None);
    assert!(!snap.can_restart);

    assert_eq!(line.bus.peek(COMPLETE), 1);
    assert_eq!(line.bus.peek(CONVEYOR), 0);
    assert_eq!(line.bus.peek(ACCEPTED), 2);
    assert_eq!(
        line.printer.jobs(),
        vec!["labels/CODE-1.png".to_string(), "labels/CODE-2.png".to_string()]
    );
    assert_eq!(
        count(
            &line.events(),
            &LineEvent::RunCompleted { accepted: 2, rejected: 0 }
        ),
        1
    );
}

#[test]
fn completed_run_holds_and_allows_new_start() {
    let line = TestLine::running(1);
    line.pass_box();
    line.bus.clear_calls();
    let before = line.events().len();

    for _ in 0..3 {
        assert_eq!(line.service.poll().unwrap().status, LineStatus::Completed);
    }
    assert!(line.bus.calls().is_empty());
    assert_eq!(line.events().len(), before);

    let snap = line.service.start(TestLine::descriptor(), 2).unwrap();
    assert_eq!(snap.status, LineStatus::WaitingForConveyor);
}

#[test]
fn scan_in_same_poll_as_expiry_is_accepted() {
    let line = TestLine::running(2);
    line.box_to_scanner();
    line.clock.advance_secs(6);
    line.bus.poke(SCANNER, 1);

    let snap = line.service.poll().unwrap();
    assert_eq!(snap.status, LineStatus::Running);
    assert_eq!(snap.accepted, 1);
    assert_eq!(snap.rejected, 0);
}

// ── Sampling ──────────────────────────────────────────────────

#[test]
fn only_the_awaited_sensor_is_read() {
    let line = TestLine::running(2);
    line.bus.clear_calls();
    line.service.poll().unwrap();
    assert_eq!(line.bus.reads(), vec![PROXIMITY_1]);

    line.bus.poke(PROXIMITY_1, 1);
    line.service.poll().unwrap();
    line.bus.clear_calls();
    line.service.poll().unwrap();
    assert_eq!(line.bus.reads(), vec![PROXIMITY_2]);
}

#[test]
fn idle_polls_are_side_effect_free() {
    let line = TestLine::running(2);
    let first = line.service.poll().unwrap();
    line.bus.clear_calls();
    let before = line.events().len();

    for _ in 0..5 {
        assert_eq!(line.service.poll().unwrap(), first);
    }
    assert!(line.bus.writes().is_empty());
    assert_eq!(line.events().len(), before);
    assert!(line.printer.jobs().is_empty());
}

// ── Reject and restart ────────────────────────────────────────

#[test]
fn box_inside_window_is_not_rejected() {
    let line = TestLine::running(2);
    line.box_to_scanner();
    line.clock.advance_ms(4_999);

    let snap = line.service.poll().unwrap();
    assert_eq!(snap.sub_state, Some(BoxSubState::AwaitingScan));
    assert_eq!(snap.scan_time_remaining_secs, Some(0.001));
}

#[test]
fn missed_scan_stops_line() {
    let line = TestLine::running(2);
    line.box_to_scanner();
    line.clock.advance_secs(5);

    let snap = line.service.poll().unwrap();
    assert_eq!(snap.status, LineStatus::Stopped);
    assert_eq!(snap.rejected, 1);
    assert_eq!(snap.accepted, 0);
    assert_eq!(snap.current_ordinal, Some(1));
    assert!(snap.can_restart);
    assert_eq!(snap.scan_time_remaining_secs, None);
    assert_eq!(line.bus.peek(INDICATOR), 2);
    assert_eq!(line.bus.peek(CONVEYOR), 0);
    assert!(line
        .events()
        .contains(&LineEvent::BoxRejected { ordinal: 1, rejected: 1 }));

    // Stays stopped until an operator restarts.
    line.clock.advance_secs(60);
    line.bus.poke(SCANNER, 1);
    assert_eq!(line.service.poll().unwrap().status, LineStatus::Stopped);
}

#[test]
fn restart_reissues_code_and_resumes() {
    let line = TestLine::running(2);
    line.box_to_scanner();
    line.clock.advance_secs(5);
    line.service.poll().unwrap();

    let snap = line.service.restart().unwrap();
    assert_eq!(snap.status, LineStatus::Running);
    assert_eq!(snap.sub_state, Some(BoxSubState::AwaitingProximity1));
    assert_eq!(snap.current_ordinal, Some(1));
    assert_eq!(snap.current_code.as_deref(), Some("CODE-3"));
    assert_eq!(line.bus.peek(CONVEYOR), 1);
    assert_eq!(line.bus.peek(INDICATOR), 0);
    assert!(line.events().contains(&LineEvent::RunRestarted { ordinal: 1 }));

    line.pass_box();
    line.pass_box();
    let snap = line.service.snapshot();
    assert_eq!(snap.status, LineStatus::Completed);
    assert_eq!(snap.accepted, 2);
    assert_eq!(snap.rejected, 1);
    assert_eq!(
        line.printer.jobs(),
        vec![
            "labels/CODE-1.png".to_string(),
            "labels/CODE-3.png".to_string(),
            "labels/CODE-2.png".to_string(),
        ]
    );

    let report = String::from_utf8(line.service.report().unwrap()).unwrap();
    assert!(report.contains("Accepted boxes:   2"));
    assert!(report.contains("Rejected boxes:   1"));
    assert!(report.contains("CODE-1"));
    assert!(report.contains("CODE-3"));
}

#[test]
fn restart_outside_stopped_is_refused() {
    let line = TestLine::new();
    assert_eq!(
        line.service.restart().unwrap_err(),
        Error::Validation(ValidationError::NoActiveRun)
    );

    let line = TestLine::running(1);
    line.pass_box();
    assert_eq!(
        line.service.restart().unwrap_err(),
        Error::Validation(ValidationError::NotStopped(RunStatus::Completed))
    );
}

// ── Overlap ───────────────────────────────────────────────────

#[test]
fn early_box_is_queued_and_printed_after_scan() {
    let line = TestLine::running(3);
    line.box_to_scanner();

    line.bus.poke(PROXIMITY_1, 1);
    let snap = line.service.poll().unwrap();
    assert!(snap.overlap_pending);
    assert_eq!(snap.sub_state, Some(BoxSubState::AwaitingScan));
    assert!(line.events().contains(&LineEvent::OverlapDetected { ordinal: 2 }));

    // Once latched the print-station sensor is no longer sampled.
    line.bus.clear_calls();
    line.service.poll().unwrap();
    assert!(!line.bus.reads().contains(&PROXIMITY_1));

    line.bus.poke(SCANNER, 1);
    let snap = line.service.poll().unwrap();
    assert!(!snap.overlap_pending);
    assert_eq!(snap.current_ordinal, Some(2));
    assert_eq!(snap.sub_state, Some(BoxSubState::AwaitingProximity2));
    assert_eq!(line.bus.peek(PROXIMITY_1), 0);
    assert_eq!(
        line.printer.jobs(),
        vec!["labels/CODE-1.png".to_string(), "labels/CODE-2.png".to_string()]
    );
}

#[test]
fn overlap_on_last_box_is_ignored() {
    let line = TestLine::running(1);
    line.box_to_scanner();
    line.bus.poke(PROXIMITY_1, 1);
    assert!(!line.service.poll().unwrap().overlap_pending);

    line.bus.poke(SCANNER, 1);
    assert_eq!(line.service.poll().unwrap().status, LineStatus::Completed);
}

#[test]
fn reject_drops_queued_box() {
    let line = TestLine::running(3);
    line.box_to_scanner();
    line.bus.poke(PROXIMITY_1, 1);
    line.service.poll().unwrap();

    line.clock.advance_secs(5);
    let snap = line.service.poll().unwrap();
    assert_eq!(snap.status, LineStatus::Stopped);
    assert!(!snap.overlap_pending);
    assert_eq!(line.printer.jobs().len(), 1);
}

// ── Accepted counter ──────────────────────────────────────────

#[test]
fn drifted_counter_is_rewritten() {
    let line = TestLine::running(2);
    line.pass_box();
    line.box_to_scanner();
    line.bus.poke(ACCEPTED, 7);

    line.service.poll().unwrap();
    assert_eq!(line.bus.peek(ACCEPTED), 1);
    assert!(line
        .events()
        .contains(&LineEvent::CounterDrift { register: 7, expected: 1 }));
    assert_eq!(line.service.snapshot().accepted, 1);
}

// ── Faults ────────────────────────────────────────────────────

#[test]
fn bus_outage_leaves_run_untouched() {
    let line = TestLine::running(2);
    line.box_to_scanner();
    let before = line.service.snapshot();

    line.bus.set_offline(true);
    line.bus.poke(SCANNER, 1);
    let err = line.service.poll().unwrap_err();
    assert_eq!(err.class(), ErrorClass::Retryable);
    assert_eq!(line.service.snapshot(), before);

    line.bus.heal();
    assert_eq!(line.service.poll().unwrap().accepted, 1);
}

#[test]
fn failed_write_is_retried_without_double_counting() {
    let line = TestLine::running(2);
    line.box_to_scanner();
    line.bus.poke(SCANNER, 1);
    line.bus.fail_writes_to(INDICATOR);

    assert!(line.service.poll().unwrap_err().is_retryable());
    assert_eq!(line.service.snapshot().accepted, 0);
    assert_eq!(line.service.snapshot().sub_state, Some(BoxSubState::AwaitingScan));

    line.bus.heal();
    let snap = line.service.poll().unwrap();
    assert_eq!(snap.accepted, 1);
    assert_eq!(line.bus.peek(ACCEPTED), 1);
    assert_eq!(
        count(
            &line.events(),
            &LineEvent::BoxAccepted { ordinal: 1, accepted: 1 }
        ),
        1
    );
}

#[test]
fn printer_failure_keeps_box_at_print_station() {
    let line = TestLine::running(2);
    line.printer.set_offline(true);
    line.bus.poke(PROXIMITY_1, 1);
    line.bus.clear_calls();

    let err = line.service.poll().unwrap_err();
    assert_eq!(err, Error::Print(PrintError::Offline));
    assert!(line.bus.writes().is_empty());
    assert_eq!(line.bus.peek(PROXIMITY_1), 1);
    assert_eq!(
        line.service.snapshot().sub_state,
        Some(BoxSubState::AwaitingProximity1)
    );
    assert!(line.events().contains(&LineEvent::PrintFailed { ordinal: 1 }));

    line.printer.set_offline(false);
    let snap = line.service.poll().unwrap();
    assert_eq!(snap.sub_state, Some(BoxSubState::AwaitingProximity2));
    assert_eq!(line.printer.jobs(), vec!["labels/CODE-1.png".to_string()]);
}

#[test]
fn storage_failure_does_not_fail_the_tick() {
    let line = TestLine::running(2);
    line.storage
        .read_only
        .store(true, std::sync::atomic::Ordering::SeqCst);
    line.pass_box();
    assert_eq!(line.service.snapshot().accepted, 1);
}

// ── Reset ─────────────────────────────────────────────────────

#[test]
fn reset_clears_everything() {
    let line = TestLine::running(2);
    line.pass_box();

    let snap = line.service.reset().unwrap();
    assert_eq!(snap, LineSnapshot::idle());
    for addr in [CONVEYOR, PROXIMITY_1, PROXIMITY_2, SCANNER, ACCEPTED, COMPLETE, INDICATOR] {
        assert_eq!(line.bus.peek(addr), 0, "register {addr}");
    }
    assert!(line.storage.raw("line", "run").is_none());
    assert_eq!(line.events().last(), Some(&LineEvent::RunReset));
    assert_eq!(
        line.service.report().unwrap_err(),
        Error::Validation(ValidationError::NoActiveRun)
    );
}

#[test]
fn reset_keeps_run_when_bus_is_down() {
    let line = TestLine::running(2);
    line.bus.set_offline(true);

    assert!(line.service.reset().unwrap_err().is_retryable());
    assert_eq!(line.service.snapshot().status, LineStatus::Running);
    assert!(line.storage.raw("line", "run").is_some());
}

// ── Summary ───────────────────────────────────────────────────

#[test]
fn summary_reports_codes_and_registers() {
    let line = TestLine::running(2);
    line.pass_box();
    let summary = line.service.summary();

    let tokens: Vec<&str> = summary.boxes.iter().map(|b| b.code.token.as_str()).collect();
    assert_eq!(tokens, ["CODE-1", "CODE-2"]);
    assert_eq!(summary.boxes[0].outcome, BoxOutcome::Accepted);
    assert!(summary.boxes[0].resolved_at.is_some());
    assert_eq!(summary.boxes[1].outcome, BoxOutcome::Pending);
    assert_eq!(summary.boxes[1].resolved_at, None);
    assert!(summary.rejected_history.is_empty());
    assert_eq!(summary.scan_deadline, None);
    assert_eq!(summary.descriptor, Some(TestLine::descriptor()));
    assert_eq!(summary.registers.len(), 7);
    let conveyor = summary
        .registers
        .iter()
        .find(|r| r.address == CONVEYOR)
        .unwrap();
    assert_eq!(conveyor.value, Some(5));

    line.bus.set_offline(true);
    let summary = line.service.summary();
    assert!(summary.registers.iter().all(|r| r.value.is_none()));
    assert_eq!(summary.snapshot.status, LineStatus::Running);
}

#[test]
fn summary_keeps_stopped_box_pending() {
    let line = TestLine::running(2);
    line.box_to_scanner();
    line.clock.advance_secs(5);
    line.service.poll().unwrap();

    let summary = line.service.summary();
    assert_eq!(summary.snapshot.status, LineStatus::Stopped);
    assert_eq!(summary.boxes[0].outcome, BoxOutcome::Pending);
    assert_eq!(summary.boxes[0].code.token, "CODE-1");
    assert_eq!(summary.rejected_history.len(), 1);
    assert_eq!(summary.rejected_history[0].outcome, BoxOutcome::Rejected);
    assert_eq!(summary.rejected_history[0].code.token, "CODE-1");

    line.service.restart().unwrap();
    let summary = line.service.summary();
    assert_eq!(summary.boxes[0].outcome, BoxOutcome::Pending);
    assert_eq!(summary.boxes[0].code.token, "CODE-3");
    assert_eq!(summary.rejected_history.len(), 1);
}
