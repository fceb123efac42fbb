use std::thread;
use std::time::{Duration, Instant};

use molscript_scene::{MemoryScene, Scene};
use molscript_script::{
    BufferedOutput, ErrorKind, ExecutionFlags, OutputKind, RunOutcome, ScriptEngine, Value,
};
use molscript_select::Selection;

fn engine_with_output() -> (ScriptEngine, BufferedOutput) {
    let output = BufferedOutput::new();
    let engine = ScriptEngine::new().with_output(output.clone());
    (engine, output)
}

fn run(engine: &mut ScriptEngine, scene: &mut MemoryScene, source: &str) -> RunOutcome {
    engine
        .run_script(scene, source, ExecutionFlags::default())
        .unwrap()
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn select_then_count() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(5);
    run(
        &mut engine,
        &mut scene,
        "select atomno=1 or atomno=3; print {selected}.size",
    );
    assert_eq!(output.printed(), "2");
    assert_eq!(scene.selected_atoms(), Selection::from_indices(5, [0, 2]));
}

#[test]
fn if_else_block() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(1);
    run(
        &mut engine,
        &mut scene,
        "x = 1; if (x == 1) { x = 2 } else { x = 3 }; print x",
    );
    assert_eq!(output.printed(), "2");
}

#[test]
fn elseif_chain_takes_first_true_branch() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(1);
    let source = "
        for (var i = 1; i <= 3; i = i + 1) {
            if (i == 1) {
                print \"one\"
            } elseif (i == 2) {
                print \"two\"
            } else {
                print \"many\"
            }
        }";
    run(&mut engine, &mut scene, source);
    assert_eq!(output.printed(), "one\ntwo\nmany");
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn for_loop_leaves_last_value() {
    let mut engine = ScriptEngine::new();
    let mut scene = MemoryScene::with_atoms(1);
    run(
        &mut engine,
        &mut scene,
        "for (var i = 0; i < 3; i = i + 1) { x = i }",
    );
    assert_eq!(engine.variable("x"), Some(&Value::Integer(2)));
}

#[test]
fn while_false_never_runs() {
    let mut engine = ScriptEngine::new();
    let mut scene = MemoryScene::with_atoms(1);
    run(&mut engine, &mut scene, "while (false) { x = 1 }");
    assert_eq!(engine.variable("x"), None);
}

#[test]
fn break_and_continue() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(1);
    let source = "
        for (var i = 0; i < 10; i = i + 1) {
            if (i == 1) { continue }
            if (i == 4) { break }
            print i
        }
        n = 0
        while (true) {
            n = n + 1
            if (n >= 3) { break }
        }
        print n";
    run(&mut engine, &mut scene, source);
    assert_eq!(output.printed(), "0\n2\n3\n3");
}

#[test]
fn goto_jumps_to_message() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(1);
    run(
        &mut engine,
        &mut scene,
        "goto skip\nprint \"skipped\"\nmessage skip\nprint \"done\"",
    );
    assert_eq!(output.printed(), "done");
}

#[test]
fn recursion_stops_at_depth_limit() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(1);
    let source = "function dive(n) {\n  _depth = n\n  dive(n + 1)\n}\ndive(1)";
    let err = engine
        .run_script(&mut scene, source, ExecutionFlags::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooManyScriptLevels);
    assert_eq!(engine.variable("_depth"), Some(&Value::Integer(10)));
    assert!(!err.trace().is_empty());
    assert!(output.lines(OutputKind::Error)[0].contains("called from"));
}

#[test]
fn nested_script_returns_to_caller() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(1);
    scene.add_file("inner.spt", "x = 5\nreturn\nx = 6");
    run(&mut engine, &mut scene, "script inner.spt\nprint x");
    assert_eq!(output.printed(), "5");
}

#[test]
fn exit_in_nested_script_stops_everything() {
    let mut engine = ScriptEngine::new();
    let mut scene = MemoryScene::with_atoms(1);
    scene.add_file("stop.spt", "exit");
    let outcome = run(&mut engine, &mut scene, "x = 1\nscript stop.spt\nx = 2");
    assert_eq!(outcome, RunOutcome::Exited);
    assert_eq!(engine.variable("x"), Some(&Value::Integer(1)));
}

// ============================================================================
// Expressions
// ============================================================================

#[test]
fn stddev_of_too_few_values_is_nan() {
    let mut engine = ScriptEngine::new();
    let mut scene = MemoryScene::with_atoms(3);
    for expression in ["{}.temperature.stddev", "{atomno=2}.temperature.stddev"] {
        match engine.evaluate(&mut scene, expression).unwrap() {
            Value::Float(v) => assert!(v.is_nan(), "{} gave {}", expression, v),
            other => panic!("{} gave {:?}", expression, other),
        }
    }
}

#[test]
fn de_morgan_holds() {
    let mut engine = ScriptEngine::new();
    let mut scene = MemoryScene::with_atoms(6);
    let lhs = engine
        .evaluate(&mut scene, "{not (atomno < 4 and temperature > 10)}")
        .unwrap();
    let rhs = engine
        .evaluate(&mut scene, "{not atomno < 4 or not temperature > 10}")
        .unwrap();
    assert_eq!(lhs, rhs);

    let empty = engine
        .evaluate(&mut scene, "{atomno < 4 and not atomno < 4}")
        .unwrap();
    assert_eq!(empty, Value::Selection(Selection::new(6)));
}

#[test]
fn selection_text_round_trip() {
    let mut engine = ScriptEngine::new();
    let mut scene = MemoryScene::with_atoms(6);
    let first = engine
        .evaluate(&mut scene, "{atomno = 1 or atomno > 3}")
        .unwrap();
    let text = first.to_string();
    assert_eq!(text, "({0 3:5})");
    let again = engine.evaluate(&mut scene, &text).unwrap();
    assert_eq!(first, again);
}

#[test]
fn dynamic_definitions_follow_the_scene() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(4);
    let source = "
        define fixed temperature > 15
        define dynamic live temperature > 15
        {atomno = 1}.temperature = 100
        print {fixed}.size
        print {live}.size";
    run(&mut engine, &mut scene, source);
    assert_eq!(output.printed(), "2\n3");
}

#[test]
fn subset_restricts_selection() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(5);
    run(
        &mut engine,
        &mut scene,
        "subset atomno <= 2\nselect all\nprint {selected}.size\nsubset\nselect all",
    );
    assert_eq!(output.printed(), "2");
    assert_eq!(scene.selected_atoms().count(), 5);
}

// ============================================================================
// Syntax check
// ============================================================================

#[test]
fn syntax_check_changes_nothing() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(4);
    engine.set_variable("kept", 1);
    let colors = |scene: &MemoryScene| -> Vec<String> {
        scene.atoms().iter().map(|atom| atom.color.clone()).collect()
    };
    let before_colors = colors(&scene);
    let before_view = *scene.view();
    let source = "
        kept = 2
        define pair atomno < 3
        select pair
        color red
        hide atomno = 4
        delete atomno = 1
        set bondTolerance 0.9
        zoom 200
        print \"hidden\"
        zap";
    let outcome = engine
        .run_script(&mut scene, source, ExecutionFlags::syntax_check())
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(scene.atom_count(), 4);
    assert_eq!(scene.selected_atoms().count(), 0);
    assert_eq!(scene.hidden_atoms().count(), 0);
    assert_eq!(scene.deleted_atoms().count(), 0);
    assert!(scene.changed_parameters().is_empty());
    assert_eq!(colors(&scene), before_colors);
    assert_eq!(*scene.view(), before_view);
    assert_eq!(engine.variable("kept"), Some(&Value::Integer(1)));
    assert!(engine.definitions().get("pair").is_none());
    assert_eq!(output.printed(), "");
}

#[test]
fn syntax_check_still_reports_errors() {
    let mut engine = ScriptEngine::new();
    let mut scene = MemoryScene::with_atoms(2);
    let err = engine
        .run_script(&mut scene, "zoom 1", ExecutionFlags::syntax_check())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NumberOutOfRange);
}

// ============================================================================
// Pause, resume and interrupt
// ============================================================================

#[test]
fn pause_then_resume_continues_at_next_statement() {
    let (mut engine, output) = engine_with_output();
    let controller = engine.controller();
    let worker = thread::spawn(move || {
        let mut scene = MemoryScene::with_atoms(1);
        engine
            .run_script(
                &mut scene,
                "x = 1\npause\nx = x + 1\nprint x",
                ExecutionFlags::default(),
            )
            .unwrap()
    });

    wait_until("pause", || controller.is_paused());
    thread::sleep(Duration::from_millis(20));
    assert_eq!(output.printed(), "");

    controller.resume();
    assert_eq!(worker.join().unwrap(), RunOutcome::Completed);
    assert_eq!(output.printed(), "2");
}

#[test]
fn queued_script_runs_while_paused() {
    let (mut engine, output) = engine_with_output();
    let controller = engine.controller();
    let worker = thread::spawn(move || {
        let mut scene = MemoryScene::with_atoms(1);
        engine
            .run_script(&mut scene, "pause\nprint \"after\"", ExecutionFlags::default())
            .unwrap()
    });

    wait_until("pause", || controller.is_paused());
    controller.queue_script("frobnicate");
    controller.queue_script("print \"during\"");
    wait_until("queued script", || output.printed() == "during");
    assert_eq!(output.lines(OutputKind::Error).len(), 1);
    assert!(controller.is_paused());

    controller.resume();
    assert_eq!(worker.join().unwrap(), RunOutcome::Completed);
    assert_eq!(output.printed(), "during\nafter");
}

#[test]
fn interrupt_stops_a_delay() {
    let (mut engine, output) = engine_with_output();
    let controller = engine.controller();
    let worker = thread::spawn(move || {
        let mut scene = MemoryScene::with_atoms(1);
        engine
            .run_script(
                &mut scene,
                "print \"start\"\ndelay 30\nprint \"end\"",
                ExecutionFlags::default(),
            )
            .unwrap()
    });

    wait_until("start", || output.printed() == "start");
    controller.interrupt();
    assert_eq!(worker.join().unwrap(), RunOutcome::Interrupted);
    assert_eq!(output.printed(), "start");
}

// ============================================================================
// State
// ============================================================================

#[test]
fn unknown_parameter_in_state_script_warns() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(1);
    engine
        .run_script(
            &mut scene,
            "set frobnication 3\nprint frobnication",
            ExecutionFlags::state_script(),
        )
        .unwrap();
    assert_eq!(output.lines(OutputKind::Warning).len(), 1);
    assert_eq!(output.printed(), "3");
}

#[test]
fn history_records_top_level_commands() {
    let (mut engine, output) = engine_with_output();
    let mut scene = MemoryScene::with_atoms(1);
    scene.add_file("inner.spt", "y = 2");
    run(
        &mut engine,
        &mut scene,
        "x = 1\nscript inner.spt\nif (x) {\n  z = 3\n}",
    );
    let recorded: Vec<&str> = engine.history().iter().collect();
    assert_eq!(recorded, vec!["x = 1", "script inner.spt", "z = 3"]);

    run(&mut engine, &mut scene, "history 2");
    assert_eq!(output.printed(), "script inner.spt\nz = 3");
}
