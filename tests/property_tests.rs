//! Property tests for task construction and command execution.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;

use workcell::{
    ArgKey, Argument, Arguments, ClusterInfo, CommandLine, Error, Execute, INSTANCE_NAME,
    LocalExecutor, RunMode, WORKFLOW_TASK, Workflow, create_task,
};

// ─── Strategies ─────────────────────────────────────────────────────────────

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _'\"-]{0,16}".prop_map(Value::String),
    ];

    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn arb_float() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => any::<f64>(),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
        1 => Just(f64::NAN),
    ]
}

fn arb_string_key() -> impl Strategy<Value = String> {
    "[a-z_]{1,10}"
}

fn arb_bad_key() -> impl Strategy<Value = ArgKey> {
    prop_oneof![
        any::<i64>().prop_map(ArgKey::Int),
        any::<bool>().prop_map(ArgKey::Bool),
        "[a-z]{1,8}".prop_map(|key| ArgKey::Other(format!("<object {key}>"))),
    ]
}

// ─── Task construction ──────────────────────────────────────────────────────

proptest! {
    /// Any non-string key fails the call with InvalidKey and registers nothing.
    #[test]
    fn non_string_key_is_rejected(
        good in prop::collection::btree_map(arb_string_key(), arb_json(), 0..5),
        bad in arb_bad_key(),
        position in 0usize..6,
    ) {
        let workflow = Workflow::config().finish();

        let mut entries: Vec<(ArgKey, Argument)> = good
            .into_iter()
            .map(|(k, v)| (ArgKey::Str(k), Argument::value(v)))
            .collect();
        let position = position.min(entries.len());
        entries.insert(position, (bad, Argument::text("x")));

        let result = workflow.new_task::<()>("t", entries.into_iter().collect());

        prop_assert!(matches!(result, Err(Error::InvalidKey(_))));
        prop_assert!(workflow.task_names().is_empty());
    }

    /// Reserved keys always hold the factory's values.
    #[test]
    fn reserved_keys_always_win(
        name in "[a-z][a-z0-9_]{0,12}",
        spoof_name in arb_json(),
        spoof_workflow in arb_json(),
        rest in prop::collection::btree_map(arb_string_key(), arb_json(), 0..5),
    ) {
        let workflow = Workflow::config().name("wf").finish();

        let mut arguments: Arguments = rest
            .into_iter()
            .map(|(k, v)| (k, Argument::value(v)))
            .collect();
        arguments.set(INSTANCE_NAME, Argument::value(spoof_name));
        arguments.set(WORKFLOW_TASK, Argument::value(spoof_workflow));

        let task = create_task::<()>(&name, &workflow.reference(), arguments).unwrap();

        prop_assert_eq!(task.params().get(INSTANCE_NAME), Some(name.as_str()));
        prop_assert_eq!(task.params().get(WORKFLOW_TASK), Some(r#"{"workflow":"wf"}"#));
    }

    /// JSON-encodable values round-trip through the parameter store.
    #[test]
    fn structured_values_round_trip(
        values in prop::collection::btree_map(arb_string_key(), arb_json(), 1..6),
    ) {
        let workflow = Workflow::config().finish();

        let arguments: Arguments = values
            .iter()
            .map(|(k, v)| (k.clone(), Argument::value(v.clone())))
            .collect();
        let task = create_task::<()>("t", &workflow.reference(), arguments).unwrap();

        for (key, value) in &values {
            if key == INSTANCE_NAME || key == WORKFLOW_TASK {
                continue;
            }
            let stored = task.params().get(key).unwrap();
            match value {
                Value::String(text) => prop_assert_eq!(stored, text.as_str()),
                _ => {
                    let decoded: Value = serde_json::from_str(stored).unwrap();
                    prop_assert_eq!(&decoded, value);
                }
            }
        }
    }

    /// Floats either round-trip exactly or fall back to a readable form.
    #[test]
    fn floats_round_trip_or_fall_back(value in arb_float()) {
        let workflow = Workflow::config().finish();
        let arguments = Arguments::new().with("x", value);

        let task = create_task::<()>("t", &workflow.reference(), arguments).unwrap();
        let stored = task.params().get("x").unwrap();
        let parsed = task.params().parse::<f64>("x").unwrap();

        prop_assert_ne!(stored, "null");
        if value.is_nan() {
            prop_assert!(parsed.is_nan());
        } else {
            prop_assert_eq!(parsed.to_bits(), value.to_bits());
        }
        if value.is_finite() {
            prop_assert!(task.params().decode::<f64>("x").is_ok());
        }
    }

    /// Values that can't be encoded still produce a non-empty parameter.
    #[test]
    fn unencodable_values_fall_back(
        grid in prop::collection::btree_map((any::<i16>(), any::<i16>()), any::<u8>(), 1..4),
    ) {
        let workflow = Workflow::config().finish();
        let arguments = Arguments::new().with("grid", Argument::value(grid));

        let task = create_task::<()>("t", &workflow.reference(), arguments).unwrap();
        let stored = task.params().get("grid").unwrap();

        prop_assert!(!stored.is_empty());
        prop_assert!(serde_json::from_str::<Value>(stored).is_err());
    }

    /// Cluster info is exposed by identity, whatever else is passed.
    #[test]
    fn cluster_info_is_identity_equal(
        rest in prop::collection::btree_map(arb_string_key(), arb_json(), 0..4),
        cores in 1u32..128,
    ) {
        let workflow = Workflow::config().finish();
        let info = Arc::new(ClusterInfo::new(RunMode::Local, "proj", "job").cores(cores));

        let mut arguments: Arguments = rest
            .into_iter()
            .map(|(k, v)| (k, Argument::value(v)))
            .collect();
        arguments.set("cluster_info", info.clone());

        let task = create_task::<()>("t", &workflow.reference(), arguments).unwrap();

        prop_assert!(Arc::ptr_eq(task.cluster().unwrap(), &info));
    }
}

// ─── Command execution ──────────────────────────────────────────────────────

#[cfg(unix)]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every token comes back as exactly one argument.
    #[test]
    fn quoted_tokens_survive_the_shell(
        tokens in prop::collection::vec("[ -~]{0,12}", 1..5),
    ) {
        let mut args = vec!["printf".to_string(), "%s\\n".to_string()];
        args.extend(tokens.iter().cloned());

        let result = LocalExecutor::default()
            .execute(&CommandLine::from(args))
            .unwrap();

        let expected: String = tokens.iter().map(|t| format!("{t}\n")).collect();
        prop_assert_eq!(result.stdout_lossy(), expected);
    }
}

#[cfg(unix)]
#[test]
fn concurrent_executions_do_not_interfere() {
    let executor = Arc::new(LocalExecutor::default());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let executor = executor.clone();
            std::thread::spawn(move || {
                let command = CommandLine::from(format!("echo out-{i}; echo err-{i} >&2"));
                (i, executor.execute(&command).unwrap())
            })
        })
        .collect();

    let mut seen = BTreeMap::new();
    for handle in handles {
        let (i, result) = handle.join().unwrap();
        assert_eq!(result.stdout_lossy(), format!("out-{i}\n"));
        assert_eq!(result.stderr_lossy(), format!("err-{i}\n"));
        seen.insert(i, result.exit_code);
    }

    assert_eq!(seen.len(), 16);
    assert!(seen.values().all(|code| *code == 0));
}

#[cfg(unix)]
#[test]
fn failing_command_reports_literal_input() {
    let err = LocalExecutor::default()
        .execute(&CommandLine::from("false"))
        .unwrap_err();

    let err = err.as_command_error().unwrap();
    assert_ne!(err.exit_code, 0);
    assert_eq!(err.command, "false");
}
