//! Execution control scenarios: first-line stop, breakpoints, stepping,
//! watches, call tracing.

use crate::common::{session, spawn_debuggee, FuncDef, Op, Program};
use linehook::debugger::variable::Value;
use linehook::debugger::watch::WatchMode;
use linehook::protocol::{IncomingMessage, OutgoingMessage};
use linehook::Config;

const APP: &str = "/work/app.vx";

fn straight_line_program() -> std::sync::Arc<Program> {
    Program::new(vec![FuncDef::new(
        "main",
        APP,
        1,
        vec![
            Op::Line(1),
            Op::Assign("x", Value::Int(1)),
            Op::Line(2),
            Op::Assign("x", Value::Int(2)),
            Op::Line(3),
            Op::Line(4),
        ],
    )])
}

#[test]
fn test_stops_at_first_line_then_runs_to_completion() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(
        debugger.clone(),
        1,
        "MainThread",
        straight_line_program(),
        "main",
    );

    let (stack, thread_name) = client.expect_line();
    assert_eq!(thread_name, "MainThread");
    assert_eq!(stack[0].file, APP);
    assert_eq!(stack[0].line, 1);
    assert_eq!(stack[0].function, "main");

    client.cont();
    worker.join().unwrap().unwrap();

    debugger.program_exited(0, "program finished");
    let (status, _) = client.expect_exit();
    assert_eq!(status, 0);
    client.assert_silent();
}

#[test]
fn test_breakpoint_stops_and_resumes() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(
        debugger.clone(),
        1,
        "MainThread",
        straight_line_program(),
        "main",
    );

    client.expect_stop_at(APP, 1);
    client.set_breakpoint(APP, 3);
    client.cont();

    client.expect_stop_at(APP, 3);
    client.cont();

    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
    client.assert_silent();
}

#[test]
fn test_temporary_breakpoint_fires_once() {
    let program = Program::new(vec![FuncDef::new(
        "main",
        APP,
        1,
        vec![
            Op::Line(1),
            // three passes over the same line
            Op::Line(4),
            Op::Line(5),
            Op::Line(4),
            Op::Line(5),
            Op::Line(4),
            Op::Line(5),
        ],
    )]);
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", program, "main");

    client.expect_stop_at(APP, 1);
    client.send(IncomingMessage::RequestBreakpoint {
        filename: APP.to_string(),
        line: 4,
        temporary: true,
        condition: None,
        set_breakpoint: true,
    });
    client.cont();

    // fires on the first pass only, then deletes itself
    client.expect_stop_at(APP, 4);
    client.cont();

    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
    client.assert_silent();
}

#[test]
fn test_breakpoint_disabled_over_the_wire_never_fires() {
    let program = Program::new(vec![FuncDef::new(
        "main",
        APP,
        1,
        vec![Op::Line(1), Op::Line(3), Op::Line(4), Op::Line(3), Op::Line(4)],
    )]);
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", program, "main");

    client.expect_stop_at(APP, 1);
    client.set_breakpoint(APP, 3);
    client.send(IncomingMessage::RequestBreakpointState {
        filename: APP.to_string(),
        line: 3,
        enabled: Some(false),
        ignore_count: None,
    });
    client.cont();

    // both passes over line 3 run through the disabled breakpoint
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
    client.assert_silent();
}

#[test]
fn test_breakpoint_ignore_count_set_over_the_wire_skips_early_hits() {
    let mut ops = vec![Op::Line(1)];
    for i in 0..6 {
        ops.push(Op::Assign("i", Value::Int(i)));
        ops.push(Op::Line(2));
    }
    let program = Program::new(vec![FuncDef::new("main", APP, 1, ops)]);
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", program, "main");

    client.expect_stop_at(APP, 1);
    client.set_breakpoint(APP, 2);
    client.send(IncomingMessage::RequestBreakpointState {
        filename: APP.to_string(),
        line: 2,
        enabled: None,
        ignore_count: Some(4),
    });
    client.cont();

    // the first four crossings are swallowed; once the count is spent the
    // breakpoint fires on every pass again
    for expected in ["4", "5"] {
        client.expect_stop_at(APP, 2);
        let variables = request_locals(&client);
        let i = variables.iter().find(|v| v.name == "i").unwrap();
        assert_eq!(i.value.as_deref(), Some(expected));
        client.cont();
    }

    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
    client.assert_silent();
}

#[test]
fn test_watch_disabled_over_the_wire_never_fires() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(
        debugger.clone(),
        1,
        "MainThread",
        straight_line_program(),
        "main",
    );

    client.expect_stop_at(APP, 1);
    client.send(IncomingMessage::RequestWatch {
        condition: "x".to_string(),
        temporary: false,
        mode: WatchMode::OnChange,
        set_watch: true,
    });
    client.send(IncomingMessage::RequestWatchState {
        condition: "x".to_string(),
        enabled: Some(false),
        ignore_count: None,
    });
    client.cont();

    // the change of x at line 3 passes the disabled watch silently
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
    client.assert_silent();
}

#[test]
fn test_conditional_breakpoint_fires_on_every_truthy_pass_only() {
    let mut ops = vec![Op::Line(1)];
    for i in 0..6 {
        ops.push(Op::Assign("i", Value::Int(i)));
        ops.push(Op::Line(2));
    }
    let program = Program::new(vec![FuncDef::new("main", APP, 1, ops)]);
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", program, "main");

    client.expect_stop_at(APP, 1);
    client.send(IncomingMessage::RequestBreakpoint {
        filename: APP.to_string(),
        line: 2,
        temporary: false,
        condition: Some("i > 3".to_string()),
        set_breakpoint: true,
    });
    client.cont();

    // the line is crossed six times; only the i=4 and i=5 passes stop
    for expected in ["4", "5"] {
        client.expect_stop_at(APP, 2);
        let variables = request_locals(&client);
        let i = variables.iter().find(|v| v.name == "i").unwrap();
        assert_eq!(i.value.as_deref(), Some(expected));
        client.cont();
    }

    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
    client.assert_silent();
}

fn request_locals(
    client: &crate::common::Client,
) -> Vec<linehook::debugger::variable::VariableEntry> {
    client.send(IncomingMessage::RequestVariables {
        frame_number: 0,
        scope: linehook::debugger::runtime::VarScope::Local,
        filters: Default::default(),
    });
    match client.recv() {
        OutgoingMessage::ResponseVariables { variables } => variables,
        other => panic!("expected ResponseVariables, got {other:?}"),
    }
}

fn call_program() -> std::sync::Arc<Program> {
    Program::new(vec![
        FuncDef::new(
            "main",
            APP,
            1,
            vec![Op::Line(1), Op::Line(2), Op::Call("helper"), Op::Line(3)],
        ),
        FuncDef::new("helper", APP, 10, vec![Op::Line(10), Op::Line(11)]),
    ])
}

#[test]
fn test_step_over_never_enters_callee() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", call_program(), "main");

    client.expect_stop_at(APP, 1);
    client.step_over();
    client.expect_stop_at(APP, 2);
    client.step_over();
    // the call to `helper` ran without a stop at 10 or 11
    let stack = client.expect_stop_at(APP, 3);
    assert_eq!(stack.len(), 1);

    client.cont();
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
}

#[test]
fn test_step_into_and_out_of_callee() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", call_program(), "main");

    client.expect_stop_at(APP, 1);
    client.step();
    client.expect_stop_at(APP, 2);
    client.step();

    let stack = client.expect_stop_at(APP, 10);
    assert_eq!(stack.len(), 2);
    assert_eq!(stack[1].function, "main");
    assert_eq!(stack[1].line, 2);

    client.step_out();
    client.expect_stop_at(APP, 3);

    client.cont();
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
}

#[test]
fn test_step_out_stops_when_caller_returns_immediately() {
    // `g` calls `f` in tail position: after `f` returns, `g` runs no
    // further line before returning itself.
    let program = Program::new(vec![
        FuncDef::new("main", APP, 1, vec![Op::Line(1), Op::Call("g")]),
        FuncDef::new("g", APP, 10, vec![Op::Line(10), Op::Call("f")]),
        FuncDef::new("f", APP, 20, vec![Op::Line(20), Op::Line(21)]),
    ]);
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", program, "main");

    client.expect_stop_at(APP, 1);
    client.step();
    client.expect_stop_at(APP, 10);
    client.step();
    client.expect_stop_at(APP, 20);

    // stepping out of `f` must still stop even though `g` never executes
    // another line; the stop lands on `g` as it returns
    client.step_out();
    let stack = client.expect_stop_at(APP, 10);
    assert_eq!(stack[0].function, "g");

    client.cont();
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
    client.assert_silent();
}

#[test]
fn test_continue_until_skips_intermediate_lines() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(
        debugger.clone(),
        1,
        "MainThread",
        straight_line_program(),
        "main",
    );

    client.expect_stop_at(APP, 1);
    client.send(IncomingMessage::RequestContinueUntil { new_line: 3 });
    client.expect_stop_at(APP, 3);

    client.cont();
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
}

#[test]
fn test_on_change_watch_fires_after_baseline() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(
        debugger.clone(),
        1,
        "MainThread",
        straight_line_program(),
        "main",
    );

    client.expect_stop_at(APP, 1);
    client.send(IncomingMessage::RequestWatch {
        condition: "x".to_string(),
        temporary: false,
        mode: WatchMode::OnChange,
        set_watch: true,
    });
    client.cont();

    // line 2 evaluates x=1 and only establishes the baseline; the stop comes
    // at line 3 where x changed to 2
    client.expect_stop_at(APP, 3);
    client.cont();

    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
    client.assert_silent();
}

#[test]
fn test_call_trace_reports_calls_and_returns() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", call_program(), "main");

    client.expect_stop_at(APP, 1);
    client.send(IncomingMessage::RequestCallTrace { trace: true });
    client.cont();

    match client.recv() {
        OutgoingMessage::CallTrace { event, from, to } => {
            assert_eq!(event, "call");
            assert!(from.contains("main"), "unexpected caller: {from}");
            assert!(to.contains("helper"), "unexpected callee: {to}");
        }
        other => panic!("expected CallTrace, got {other:?}"),
    }
    match client.recv() {
        OutgoingMessage::CallTrace { event, to, .. } => {
            assert_eq!(event, "return");
            assert!(to.contains("helper"));
        }
        other => panic!("expected CallTrace, got {other:?}"),
    }
    // main's own return is traced too
    match client.recv() {
        OutgoingMessage::CallTrace { event, to, .. } => {
            assert_eq!(event, "return");
            assert!(to.contains("main"));
        }
        other => panic!("expected CallTrace, got {other:?}"),
    }

    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
}
