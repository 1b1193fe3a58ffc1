//! Introspection scenarios: scope listing, drill-down, environment edits,
//! exception reporting and the recursion guard.

use crate::common::{session, spawn_debuggee, FuncDef, Op, Program};
use linehook::debugger::runtime::VarScope;
use linehook::debugger::variable::{Value, VariableFilter};
use linehook::protocol::{IncomingMessage, OutgoingMessage};
use linehook::{Config, Error};

const APP: &str = "/work/app.vx";

fn inspection_program() -> std::sync::Arc<Program> {
    Program::new(vec![FuncDef::new(
        "main",
        APP,
        1,
        vec![
            Op::Line(1),
            Op::Assign("x", Value::Int(7)),
            Op::Assign(
                "items",
                Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]),
            ),
            Op::Assign("__hidden__", Value::Int(0)),
            Op::Line(2),
            Op::Line(3),
        ],
    )])
}

fn request_variables(
    client: &crate::common::Client,
    filters: VariableFilter,
) -> Vec<linehook::debugger::variable::VariableEntry> {
    client.send(IncomingMessage::RequestVariables {
        frame_number: 0,
        scope: VarScope::Local,
        filters,
    });
    match client.recv() {
        OutgoingMessage::ResponseVariables { variables } => variables,
        other => panic!("expected ResponseVariables, got {other:?}"),
    }
}

#[test]
fn test_scope_listing_with_filters() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", inspection_program(), "main");

    client.expect_stop_at(APP, 1);
    client.step();
    client.expect_stop_at(APP, 2);

    let variables = request_variables(&client, VariableFilter::default());
    let names: Vec<&str> = variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["x", "items"], "dunder names hidden by default");

    let x = &variables[0];
    assert_eq!(x.value.as_deref(), Some("7"));
    assert!(!x.container);

    let items = &variables[1];
    assert!(items.container);
    assert!(items.has_children);
    assert_eq!(items.length, 3);
    assert_eq!(items.value, None, "containers are summarized, not rendered");

    let hidden = request_variables(
        &client,
        VariableFilter {
            show_hidden: true,
            ..Default::default()
        },
    );
    assert!(hidden.iter().any(|v| v.name == "__hidden__"));

    client.cont();
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
}

#[test]
fn test_drill_down_into_list() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", inspection_program(), "main");

    client.expect_stop_at(APP, 1);
    client.step();
    client.expect_stop_at(APP, 2);

    client.send(IncomingMessage::RequestVariable {
        frame_number: 0,
        scope: VarScope::Local,
        path: "items".to_string(),
    });
    match client.recv() {
        OutgoingMessage::ResponseVariable { path, children } => {
            assert_eq!(path, "items");
            assert_eq!(children.len(), 3);
            assert_eq!(children[0].name, "[0]");
            assert_eq!(children[0].value.as_deref(), Some("10"));
            assert_eq!(children[2].value.as_deref(), Some("30"));
        }
        other => panic!("expected ResponseVariable, got {other:?}"),
    }

    // drilling into a scalar child reports no children
    client.send(IncomingMessage::RequestVariable {
        frame_number: 0,
        scope: VarScope::Local,
        path: "items[1]".to_string(),
    });
    match client.recv() {
        OutgoingMessage::ResponseVariable { children, .. } => assert!(children.is_empty()),
        other => panic!("expected ResponseVariable, got {other:?}"),
    }

    client.cont();
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
}

#[test]
fn test_failed_host_resolver_answers_empty_and_session_survives() {
    use linehook::debugger::variable::{PathSegment, VariableResolver};

    struct BrokenResolver;
    impl VariableResolver for BrokenResolver {
        fn resolve(&self, _: &Value, _: &PathSegment) -> anyhow::Result<Option<Value>> {
            anyhow::bail!("runtime handle expired")
        }
        fn children(&self, _: &Value) -> Vec<(String, Value)> {
            vec![]
        }
    }

    let program = Program::new(vec![FuncDef::new(
        "main",
        APP,
        1,
        vec![
            Op::Line(1),
            Op::Assign(
                "conn",
                Value::Object {
                    type_name: "Connection".to_string(),
                    fields: vec![("port".to_string(), Value::Int(5432))],
                },
            ),
            Op::Line(2),
        ],
    )]);
    let (debugger, client) = session(Config::default());
    debugger.register_resolver("Connection", Box::new(BrokenResolver));
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", program, "main");

    client.expect_stop_at(APP, 1);
    client.step();
    client.expect_stop_at(APP, 2);

    client.send(IncomingMessage::RequestVariable {
        frame_number: 0,
        scope: VarScope::Local,
        path: "conn.port".to_string(),
    });
    match client.recv() {
        OutgoingMessage::ResponseVariable { children, .. } => assert!(children.is_empty()),
        other => panic!("expected ResponseVariable, got {other:?}"),
    }

    // the hook failure is contained; the session keeps serving
    let variables = request_variables(&client, VariableFilter::default());
    assert!(variables.iter().any(|v| v.name == "conn"));

    client.cont();
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
}

#[test]
fn test_environment_edit_rebinds_variable() {
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", inspection_program(), "main");

    client.expect_stop_at(APP, 1);
    client.step();
    client.expect_stop_at(APP, 2);

    client.send(IncomingMessage::RequestEnvironment {
        frame_number: 0,
        scope: VarScope::Local,
        name: "x".to_string(),
        value: serde_json::json!(42),
    });

    let variables = request_variables(&client, VariableFilter::default());
    let x = variables.iter().find(|v| v.name == "x").unwrap();
    assert_eq!(x.value.as_deref(), Some("42"));

    client.cont();
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
}

#[test]
fn test_exception_reported_while_stepping() {
    let program = Program::new(vec![FuncDef::new(
        "main",
        APP,
        1,
        vec![
            Op::Line(1),
            Op::Line(2),
            Op::Raise {
                type_name: "ValueError",
                message: "boom",
                exhaustion: false,
                has_traceback: true,
            },
            Op::Line(3),
        ],
    )]);
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", program, "main");

    client.expect_stop_at(APP, 1);
    client.step();
    client.expect_stop_at(APP, 2);
    client.step();

    let (exception_type, message, stack) = client.expect_exception();
    assert_eq!(exception_type, "ValueError");
    assert_eq!(message, "boom");
    assert_eq!(stack[0].function, "main");

    client.cont();
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
    client.assert_silent();
}

#[test]
fn test_generator_exhaustion_suppressed_while_stepping_inside() {
    let mut generator = FuncDef::new(
        "gen",
        APP,
        10,
        vec![
            Op::Line(10),
            Op::Raise {
                type_name: "StopIteration",
                message: "",
                exhaustion: true,
                has_traceback: false,
            },
        ],
    );
    generator.generator = true;
    let program = Program::new(vec![
        FuncDef::new("main", APP, 1, vec![Op::Line(1), Op::Call("gen")]),
        generator,
    ]);
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", program, "main");

    client.expect_stop_at(APP, 1);
    client.step();
    client.expect_stop_at(APP, 10);
    client.step();

    // the exhaustion signal is control flow, not an error: no exception
    // report, the program just finishes
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    let (status, _) = client.expect_exit();
    assert_eq!(status, 0);
    client.assert_silent();
}

#[test]
fn test_delegated_exhaustion_reported_when_stepping_over_generator() {
    let mut outer = FuncDef::new(
        "outer_gen",
        APP,
        10,
        vec![Op::Line(10), Op::Call("inner_gen"), Op::Line(11)],
    );
    outer.generator = true;
    let mut inner = FuncDef::new(
        "inner_gen",
        APP,
        20,
        vec![
            Op::Line(20),
            Op::Raise {
                type_name: "StopIteration",
                message: "",
                exhaustion: true,
                has_traceback: true,
            },
        ],
    );
    inner.generator = true;
    let program = Program::new(vec![
        FuncDef::new("main", APP, 1, vec![Op::Line(1), Op::Call("outer_gen")]),
        outer,
        inner,
    ]);
    let (debugger, client) = session(Config::default());
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", program, "main");

    client.expect_stop_at(APP, 1);
    client.step();
    client.expect_stop_at(APP, 10);
    // step over inside the generator: its delegate's exhaustion terminates
    // the iteration the controller is stepping through, so it is reported
    client.step_over();

    let (exception_type, _, _) = client.expect_exception();
    assert_eq!(exception_type, "StopIteration");

    client.cont();
    worker.join().unwrap().unwrap();
    debugger.program_exited(0, "program finished");
    client.expect_exit();
}

#[test]
fn test_recursion_guard_terminates_runaway_session() {
    let program = Program::new(vec![
        FuncDef::new("main", APP, 1, vec![Op::Line(1), Op::Call("rec")]),
        FuncDef::new("rec", APP, 10, vec![Op::Line(10), Op::Call("rec")]),
    ]);
    let config = Config {
        recursion_limit: 5,
        ..Config::default()
    };
    let (debugger, client) = session(config);
    let worker = spawn_debuggee(debugger.clone(), 1, "MainThread", program, "main");

    client.expect_stop_at(APP, 1);
    client.cont();

    let (exception_type, message, _) = client.expect_exception();
    assert_eq!(exception_type, "RecursionError");
    assert!(message.contains("recursion"), "unexpected message: {message}");

    let verdict = worker.join().unwrap();
    assert!(matches!(
        verdict,
        Err(Error::RecursionOverflow { limit: 5, .. })
    ));

    debugger.program_exited(1, "aborted");
    let (status, _) = client.expect_exit();
    assert_eq!(status, 1);
}
