use gml_vm::{assemble, ErrorKind, Frame, NoPrint, Severity, Value, Vm, VmConfig, World};

const RECURSIVE: &str = "
.code gml_Script_countdown args=1
    pushbltn.v builtin.argument0
    pushi.e 0
    cmp.v.e lte
    bf recurse
    pushi.e 0
    ret.i
  recurse:
    pushbltn.v builtin.argument0
    pushi.e 1
    sub.v.e
    call.i gml_Script_countdown(argc=1)
    pushi.e 1
    add.v.e
    ret.v
.script gml_Script_countdown

.code gml_Script_main
    pushglb.v global.n
    call.i gml_Script_countdown(argc=1)
    ret.v";

fn world_with_depth(max_call_depth: usize, n: i32) -> World {
    let mut world = World::new(VmConfig {
        max_call_depth,
        ..VmConfig::default()
    });
    assemble(RECURSIVE).unwrap().install(&mut world).unwrap();
    world.set_global("n", Value::Int32(n));
    world
}

#[test]
fn recursion_within_limit_completes() {
    let mut world = world_with_depth(64, 20);
    let result = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap();
    assert_eq!(result, Value::Int32(20));
}

#[test]
fn recursion_past_limit_fails() {
    let mut world = world_with_depth(8, 20);
    let mut frame = Frame::new();
    let err = Vm::new(&mut world, &mut NoPrint)
        .run("gml_Script_main", Some(&mut frame))
        .unwrap_err();
    assert_eq!(err.severity(), Severity::Runtime);
    assert_eq!(err.kind(), ErrorKind::CallDepthExceeded);
    assert_eq!(
        err.message(),
        "maximum call depth of 8 exceeded calling gml_Script_countdown"
    );
    // every activation unwound
    assert!(frame.backtrace().is_empty());
    assert!(frame.locals().is_empty());
}

#[test]
fn error_snapshot_is_taken_at_failure() {
    let mut world = world_with_depth(4, 10);
    let err = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap_err();
    assert!(err.to_string().contains("gml_Script_countdown"));
}
