//! State scripts
//!
//! [`dump_state`] writes the interpreter-visible state as a script that,
//! run with the state-script flag, rebuilds it: changed scene parameters,
//! defined sets, the subset, the selection and the global variables.

use std::fmt::Write;

use molscript_scene::Scene;

use crate::engine::ScriptEngine;
use crate::value::Value;
use crate::variables::Definition;

/// Render the current state as a re-executable script
pub(crate) fn dump_state(engine: &ScriptEngine, scene: &dyn Scene) -> String {
    let mut out = String::from("# state\n");

    for (name, value) in scene.changed_parameters() {
        if let Some(value) = Value::from_property(value) {
            let _ = writeln!(out, "set {} {}", name, value.to_literal());
        }
    }

    for set in engine.definitions.sorted() {
        let _ = match &set.definition {
            Definition::Static(selection) => writeln!(out, "define {} {}", set.name, selection),
            Definition::Dynamic(_) => writeln!(out, "define dynamic {} {}", set.name, set.source),
        };
    }

    if let Some(subset) = &engine.subset {
        let _ = writeln!(out, "subset {}", subset);
    }
    let _ = writeln!(out, "select {}", scene.selected_atoms());

    for (name, value) in engine.globals.sorted() {
        if !matches!(value, Value::FunctionRef(_)) {
            let _ = writeln!(out, "{} = {}", name, value.to_literal());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionFlags;
    use molscript_scene::MemoryScene;

    #[test]
    fn test_state_lists_changes() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(4);
        engine
            .run_script(
                &mut scene,
                "set bondTolerance 0.5\ndefine pair atomno < 3\nselect atomno = 4\ntitle = \"a \\\"b\\\"\"",
                ExecutionFlags::default(),
            )
            .unwrap();
        let state = dump_state(&engine, &scene);
        assert!(state.contains("set bondTolerance 0.5"));
        assert!(state.contains("define pair ({0:1})"));
        assert!(state.contains("select ({3})"));
        assert!(state.contains(r#"title = "a \"b\"""#));
    }

    #[test]
    fn test_state_round_trip() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(4);
        engine
            .run_script(
                &mut scene,
                "define pair atomno < 3\nselect pair\ncount = 7\nsave state",
                ExecutionFlags::default(),
            )
            .unwrap();
        engine
            .run_script(
                &mut scene,
                "count = 0\nselect none\nrestore state",
                ExecutionFlags::default(),
            )
            .unwrap();
        assert_eq!(engine.variable("count"), Some(&Value::Integer(7)));
        assert_eq!(scene.selected_atoms().count(), 2);
    }

    #[test]
    fn test_state_keeps_non_finite_globals() {
        let mut engine = ScriptEngine::new();
        let mut scene = MemoryScene::with_atoms(2);
        engine
            .run_script(
                &mut scene,
                "empty = {none}.temperature.avg
far = -1.0/0
save state",
                ExecutionFlags::default(),
            )
            .unwrap();
        let state = dump_state(&engine, &scene);
        assert!(state.contains("empty = 0/0"));
        assert!(state.contains("far = -1/0"));
        engine
            .run_script(
                &mut scene,
                "empty = 1\nfar = 1\nrestore state",
                ExecutionFlags::default(),
            )
            .unwrap();
        assert!(matches!(engine.variable("empty"), Some(Value::Float(f)) if f.is_nan()));
        assert_eq!(engine.variable("far"), Some(&Value::Float(f64::NEG_INFINITY)));
    }
}
