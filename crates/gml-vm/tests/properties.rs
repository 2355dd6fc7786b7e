//! Property-based tests for arithmetic, comparison and stack discipline.

use gml_vm::{assemble, Frame, NoPrint, Value, Vm, World};
use proptest::prelude::*;

fn eval(body: &str) -> Value {
    let source = format!(".code gml_Script_main\n{body}");
    let mut world = World::default();
    assemble(&source).unwrap().install(&mut world).unwrap();
    Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap()
}

const COMPARISONS: [(&str, fn(i32, i32) -> bool); 6] = [
    ("lt", |a, b| a < b),
    ("lte", |a, b| a <= b),
    ("eq", |a, b| a == b),
    ("neq", |a, b| a != b),
    ("gte", |a, b| a >= b),
    ("gt", |a, b| a > b),
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Int32 arithmetic wraps instead of failing.
    #[test]
    fn int_add_sub_mul_wrap(a in any::<i32>(), b in any::<i32>()) {
        let add = eval(&format!("push.i {a}\npush.i {b}\nadd.i.i\nret.i"));
        let sub = eval(&format!("push.i {a}\npush.i {b}\nsub.i.i\nret.i"));
        let mul = eval(&format!("push.i {a}\npush.i {b}\nmul.i.i\nret.i"));
        prop_assert_eq!(add, Value::Int32(a.wrapping_add(b)));
        prop_assert_eq!(sub, Value::Int32(a.wrapping_sub(b)));
        prop_assert_eq!(mul, Value::Int32(a.wrapping_mul(b)));
    }

    #[test]
    fn int_comparisons_match_rust(a in -1000i32..1000, b in -1000i32..1000, which in 0..COMPARISONS.len()) {
        let (kind, expected) = COMPARISONS[which];
        let result = eval(&format!("push.i {a}\npush.i {b}\ncmp.i.i {kind}\nret.b"));
        prop_assert_eq!(result, Value::Bool(expected(a, b)));
    }

    /// A boolean compares like its 0/1 value regardless of operand position.
    #[test]
    fn bool_number_comparison_is_symmetric(flag in any::<bool>(), n in -3i32..4) {
        let left = eval(&format!("push.b {flag}\npush.i {n}\ncmp.b.i eq\nret.b"));
        let right = eval(&format!("push.i {n}\npush.b {flag}\ncmp.i.b eq\nret.b"));
        prop_assert_eq!(left.clone(), right);
        prop_assert_eq!(left, Value::Bool(i32::from(flag) == n));
    }

    /// Converting a value to its own type leaves it unchanged.
    #[test]
    fn conv_to_same_type_is_identity(v in -1.0e6f64..1.0e6) {
        let result = eval(&format!("push.d {v:?}\nconv.d.d\nret.d"));
        prop_assert_eq!(result, Value::Double(v));
    }

    /// Balanced pushes and pops leave the operand stack empty.
    #[test]
    fn balanced_code_leaves_empty_stack(values in prop::collection::vec(any::<i16>(), 0..16)) {
        let mut body = String::new();
        for v in &values {
            body.push_str(&format!("pushi.e {v}\n"));
        }
        for _ in &values {
            body.push_str("popz.e\n");
        }
        body.push_str("exit.i\n");
        let source = format!(".code gml_Script_main\n{body}");
        let mut world = World::default();
        assemble(&source).unwrap().install(&mut world).unwrap();
        let mut frame = Frame::new();
        let result = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", Some(&mut frame)).unwrap();
        prop_assert_eq!(result, Value::Undefined);
        prop_assert!(frame.stack().is_empty());
    }
}
