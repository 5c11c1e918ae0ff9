//! Property-based tests for condition evaluation.
//!
//! These tests use proptest to generate random flag assignments and verify
//! that the evaluator obeys boolean algebra for every combination.

#[cfg(test)]
mod proptest_tests {
    use crate::condition::{ConditionEvaluator, GclientConditions};
    use crate::context::{TargetSelection, VarValue, VariableContext};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn context(a: bool, b: bool) -> VariableContext {
        let mut vars = BTreeMap::new();
        vars.insert("flag_a".to_string(), VarValue::Bool(a));
        vars.insert("flag_b".to_string(), VarValue::Bool(b));
        VariableContext::new(vars)
    }

    fn eval(expr: &str, ctx: &VariableContext) -> bool {
        GclientConditions.evaluate(expr, ctx).unwrap()
    }

    const OS_NAMES: &[&str] = &["android", "chromeos", "fuchsia", "ios", "unix", "mac", "win"];

    proptest! {
        /// Property: and/or/not agree with Rust's boolean operators
        #[test]
        fn operators_match_boolean_algebra(a in any::<bool>(), b in any::<bool>()) {
            let ctx = context(a, b);
            prop_assert_eq!(eval("flag_a and flag_b", &ctx), a && b);
            prop_assert_eq!(eval("flag_a or flag_b", &ctx), a || b);
            prop_assert_eq!(eval("not flag_a", &ctx), !a);
            prop_assert_eq!(eval("not not flag_a", &ctx), a);
        }

        /// Property: De Morgan's laws hold
        #[test]
        fn de_morgan_holds(a in any::<bool>(), b in any::<bool>()) {
            let ctx = context(a, b);
            prop_assert_eq!(
                eval("not (flag_a and flag_b)", &ctx),
                eval("not flag_a or not flag_b", &ctx)
            );
            prop_assert_eq!(
                eval("not (flag_a or flag_b)", &ctx),
                eval("not flag_a and not flag_b", &ctx)
            );
        }

        /// Property: a checkout_<os> flag is true exactly when the OS was selected
        #[test]
        fn os_flags_follow_selection(mask in 0u8..128) {
            let selected: Vec<String> = OS_NAMES
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, os)| os.to_string())
                .collect();
            let targets = TargetSelection {
                target_os: selected.clone(),
                ..TargetSelection::default()
            };
            let ctx = VariableContext::from_targets(&targets);
            prop_assert_eq!(eval("checkout_linux", &ctx), selected.iter().any(|s| s == "unix"));
            prop_assert_eq!(eval("checkout_mac", &ctx), selected.iter().any(|s| s == "mac"));
            prop_assert_eq!(eval("checkout_win", &ctx), selected.iter().any(|s| s == "win"));
        }

        /// Property: evaluation never panics on arbitrary input
        #[test]
        fn arbitrary_input_never_panics(input in ".{0,40}") {
            let ctx = context(true, false);
            let _ = GclientConditions.evaluate(&input, &ctx);
        }
    }
}
