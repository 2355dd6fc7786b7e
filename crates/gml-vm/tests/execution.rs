use gml_vm::{
    assemble, CollectStringPrint, ErrorKind, Frame, NoPrint, Program, ScopeEntry, Severity, Value, Vm, VmConfig,
    VmError, World,
};

fn load(source: &str, config: VmConfig) -> (Program, World) {
    let program = assemble(source).unwrap();
    let mut world = World::new(config);
    program.install(&mut world).unwrap();
    (program, world)
}

fn run(source: &str) -> Result<Value, VmError> {
    let (_, mut world) = load(source, VmConfig::default());
    Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None)
}

#[test]
fn integer_addition_returns_value() {
    let result = run(
        "
.code gml_Script_main
    push.i 2
    push.i 3
    add.i.i
    ret.i",
    )
    .unwrap();
    assert_eq!(result, Value::Int32(5));
}

#[test]
fn exit_returns_undefined() {
    let result = run(
        "
.code gml_Script_main
    push.i 1
    popz.i
    exit.i
    push.i 2
    ret.i",
    )
    .unwrap();
    assert_eq!(result, Value::Undefined);
}

#[test]
fn counting_loop_runs_to_completion() {
    let result = run(
        "
.code gml_Script_main
    pushi.e 0
    pop.v.e local.i
  loop:
    pushloc.v local.i
    pushi.e 10
    cmp.v.e lt
    bf done
    pushloc.v local.i
    pushi.e 1
    add.v.e
    pop.v.v local.i
    b loop
  done:
    pushloc.v local.i
    ret.v",
    )
    .unwrap();
    assert_eq!(result, Value::Int32(10));
}

#[test]
fn forward_branch_skips_instructions() {
    let result = run(
        "
.code gml_Script_main
    push.i 1
    bt yes
    push.i 10
    ret.i
  yes:
    push.i 20
    ret.i",
    )
    .unwrap();
    assert_eq!(result, Value::Int32(20));
}

#[test]
fn dup_copies_top_slot() {
    let result = run(
        "
.code gml_Script_main
    push.i 4
    dup.i 0
    add.i.i
    ret.i",
    )
    .unwrap();
    assert_eq!(result, Value::Int32(8));
}

#[test]
fn string_concatenation() {
    let result = run(
        r#"
.code gml_Script_main
    push.s "hp: "
    push.i 7
    add.s.i
    ret.s"#,
    )
    .unwrap();
    assert_eq!(result, Value::string("hp: 7"));
}

#[test]
fn script_call_binds_arguments_in_pop_order() {
    let result = run(
        "
.code gml_Script_sub args=2
    pushbltn.v builtin.argument0
    pushbltn.v builtin.argument1
    sub.v.v
    ret.v
.script gml_Script_sub

.code gml_Script_main
    push.i 3
    push.i 2
    call.i gml_Script_sub(argc=2)
    ret.v",
    )
    .unwrap();
    assert_eq!(result, Value::Int32(-1));
}

#[test]
fn missing_arguments_are_padded_with_undefined() {
    let result = run(
        "
.code gml_Script_second args=2
    pushbltn.v builtin.argument1
    ret.v
.script gml_Script_second

.code gml_Script_main
    push.i 1
    call.i gml_Script_second(argc=1)
    ret.v",
    )
    .unwrap();
    assert_eq!(result, Value::Undefined);
}

#[test]
fn child_entry_starts_at_its_offset() {
    let source = "
.code gml_Script_parent
    push.i 1
    ret.i
  inner:
    push.i 2
    ret.i
.code gml_Script_inner parent=gml_Script_parent offset=inner";
    let (_, mut world) = load(source, VmConfig::default());
    let mut print = NoPrint;
    let mut vm = Vm::new(&mut world, &mut print);
    assert_eq!(vm.run("gml_Script_parent", None).unwrap(), Value::Int32(1));
    assert_eq!(vm.run("gml_Script_inner", None).unwrap(), Value::Int32(2));
}

#[test]
fn undefined_instance_variable_names_the_object() {
    let source = "
.object obj_player
.code gml_Script_main
    push.v self.hp
    pushi.e 1
    add.v.e
    ret.v";
    let (_, mut world) = load(source, VmConfig::default());
    let id = world.create_instance(0);
    let err = Vm::new(&mut world, &mut NoPrint)
        .run_with_receiver("gml_Script_main", ScopeEntry::Instance(id), None)
        .unwrap_err();
    assert_eq!(err.severity(), Severity::Runtime);
    assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
    assert_eq!(err.message(), "obj_player variable is not defined (hp)");
    assert!(err.to_string().starts_with("Runtime Error: obj_player variable is not defined (hp)"));
}

#[test]
fn instance_variables_are_read_and_written_through_self() {
    let source = "
.object obj_player
.code gml_Script_main
    pushi.e 40
    pop.v.i self.hp
    push.v self.hp
    pushi.e 2
    add.v.e
    ret.v";
    let (_, mut world) = load(source, VmConfig::default());
    let id = world.create_instance(0);
    let result = Vm::new(&mut world, &mut NoPrint)
        .run_with_receiver("gml_Script_main", ScopeEntry::Instance(id), None)
        .unwrap();
    assert_eq!(result, Value::Int32(42));
    assert_eq!(world.instance(id).unwrap().variables["hp"], Value::Int16(40));
}

#[test]
fn with_block_targets_an_object_instance() {
    let source = "
.object obj_player
.code gml_Script_main
    pushi.e 0
    pushenv end
    pushi.e 42
    pop.v.i self.hp
  end:
    popenv
    exit.i";
    let (_, mut world) = load(source, VmConfig::default());
    let id = world.create_instance(0);
    Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap();
    assert_eq!(world.instance(id).unwrap().variables["hp"], Value::Int16(42));
}

#[test]
fn with_block_without_match_is_skipped() {
    let source = "
.object obj_player
.code gml_Script_main
    pushi.e 0
    pushenv end
    pushi.e 42
    pop.v.i global.touched
  end:
    popenv
    exit.i";
    let (_, mut world) = load(source, VmConfig::default());
    let mut frame = Frame::new();
    Vm::new(&mut world, &mut NoPrint)
        .run("gml_Script_main", Some(&mut frame))
        .unwrap();
    assert!(world.global("touched").is_none());
    assert!(frame.instance_scope().is_empty());
}

#[test]
fn array_store_aliases_without_copy_on_write() {
    let source = "
.code gml_Script_main
    pushi.e 9
    pushi.e -5
    pushi.e 0
    pop.v.i [array]global.b
    pushi.e -5
    pushi.e 0
    push.v [array]global.a
    ret.v";
    for (copy_on_write, expected) in [(false, Value::Int16(9)), (true, Value::Int32(0))] {
        let config = VmConfig {
            array_copy_on_write: copy_on_write,
            ..VmConfig::default()
        };
        let (_, mut world) = load(source, config);
        let shared = Value::list(vec![Value::Int32(0)]);
        world.set_global("a", shared.clone());
        world.set_global("b", shared);
        let result = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap();
        assert_eq!(result, expected, "copy_on_write = {copy_on_write}");
    }
}

#[test]
fn fixed_array_rejects_out_of_range_store() {
    let source = "
.code gml_Script_main
    pushi.e 1
    pushi.e -5
    pushi.e 3
    pop.v.i [array]global.a
    exit.i";
    let (_, mut world) = load(source, VmConfig::default());
    world.set_global("a", Value::fixed_array(vec![Value::Int32(0)]));
    let err = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    assert_eq!(err.message(), "invalid index 3 with fixed size array (with length 1)");
}

#[test]
fn constructor_builds_struct() {
    let source = "
.code gml_Script_Point args=2
    pushbltn.v builtin.argument0
    pop.v.v self.x
    pushbltn.v builtin.argument1
    pop.v.v self.y
    exit.i
.script gml_Script_Point

.code gml_Script_main
    push.i 4
    push.i 3
    push.i gml_Script_Point
    call.i @@NewGMLObject@@(argc=3)
    pop.v.v local.p
    pushloc.v local.p
    pushi.e -9
    push.v [stacktop]self.y
    ret.v";
    assert_eq!(run(source).unwrap(), Value::Int32(4));
}

#[test]
fn method_in_global_init_declares_function() {
    let source = "
.code gml_Script_helper
    push.i 11
    ret.i

.code gml_GlobalScript_init
    push.i gml_Script_helper
    pushi.e -1
    call.i method(argc=2)
    popz.v
    exit.i
.init gml_GlobalScript_init

.code gml_Script_main
    call.i gml_Script_helper(argc=0)
    ret.v";
    let (program, mut world) = load(source, VmConfig::default());
    let mut print = NoPrint;
    let mut vm = Vm::new(&mut world, &mut print);
    let mut root = Frame::new();
    vm.run_global_init(&mut root, &program.global_init).unwrap();
    assert_eq!(vm.run("gml_Script_main", Some(&mut root)).unwrap(), Value::Int32(11));
}

#[test]
fn show_debug_message_formats_arguments() {
    let source = r#"
.code gml_Script_main
    push.i 7
    push.s "hp={0}"
    call.i show_debug_message(argc=2)
    popz.v
    exit.i"#;
    let (_, mut world) = load(source, VmConfig::default());
    let mut out = CollectStringPrint::new();
    let result = Vm::new(&mut world, &mut out).run("gml_Script_main", None).unwrap();
    assert_eq!(result, Value::Undefined);
    assert_eq!(out.output(), "hp=7\n");
}

#[test]
fn program_survives_dump_and_load() {
    let program = assemble(
        "
.code gml_Script_main
    push.d 1.5
    push.d 2.25
    mul.d.d
    ret.d",
    )
    .unwrap();
    let program = Program::load(&program.dump().unwrap()).unwrap();
    let mut world = World::default();
    program.install(&mut world).unwrap();
    let result = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap();
    assert_eq!(result, Value::Double(3.375));
}

#[test]
fn forward_branch_into_an_instruction_is_unbalanced() {
    let err = run(
        "
.code gml_Script_main
    b [2]
    push.i 10
    push.i 20
    ret.i",
    )
    .unwrap_err();
    assert_eq!(err.severity(), Severity::Runner);
    assert_eq!(err.kind(), ErrorKind::UnbalancedAddress);
    assert_eq!(err.message(), "unbalanced address in gml_Script_main at instruction 1");
}

#[test]
fn forward_branch_to_a_boundary_resumes_there() {
    let result = run(
        "
.code gml_Script_main
    b [3]
    push.i 10
    push.i 20
    ret.i",
    )
    .unwrap();
    assert_eq!(result, Value::Int32(20));
}

#[test]
fn backward_branch_overshoot_resumes_at_clamped_instruction() {
    // -10 overshoots by one word inside `pushglb.v global.n`, which then runs;
    // landing one instruction earlier would pop an empty stack
    let result = run(
        "
.code gml_Script_main
    pushi.e 0
    pop.v.e global.n
    pushglb.v global.n
    pushi.e 1
    add.v.e
    pop.v.v global.n
    pushglb.v global.n
    pushi.e 3
    cmp.v.e lt
    bt [-10]
    pushglb.v global.n
    ret.v",
    )
    .unwrap();
    assert_eq!(result, Value::Int32(3));
}

#[test]
fn storing_an_undefined_instance_variable_names_it() {
    let source = "
.object obj_player
.code gml_Script_main
    push.v self.x
    pop.v.v self.x
    exit.i";
    let (_, mut world) = load(source, VmConfig::default());
    let id = world.create_instance(0);
    let err = Vm::new(&mut world, &mut NoPrint)
        .run_with_receiver("gml_Script_main", ScopeEntry::Instance(id), None)
        .unwrap_err();
    assert_eq!(err.severity(), Severity::Runtime);
    assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
    assert_eq!(err.message(), "obj_player variable is not defined (x)");
    assert!(!world.instance(id).unwrap().variables.contains_key("x"));
}

#[test]
fn other_reads_the_instance_below_self() {
    let source = "
.object obj_player
.object obj_enemy
.code gml_Script_main
    pushi.e 5
    pop.v.i self.hp
    pushi.e 1
    pushenv end
    push.v other.hp
    pop.v.v self.copied
  end:
    popenv
    exit.i";
    let (_, mut world) = load(source, VmConfig::default());
    let player = world.create_instance(0);
    let enemy = world.create_instance(1);
    Vm::new(&mut world, &mut NoPrint)
        .run_with_receiver("gml_Script_main", ScopeEntry::Instance(player), None)
        .unwrap();
    assert_eq!(world.instance(enemy).unwrap().variables["copied"], Value::Int16(5));
    assert!(!world.instance(player).unwrap().variables.contains_key("copied"));
}

#[test]
fn other_without_a_second_scope_entry_is_internal() {
    let source = "
.object obj_player
.code gml_Script_main
    push.v other.hp
    ret.v";
    let (_, mut world) = load(source, VmConfig::default());
    let id = world.create_instance(0);
    let err = Vm::new(&mut world, &mut NoPrint)
        .run_with_receiver("gml_Script_main", ScopeEntry::Instance(id), None)
        .unwrap_err();
    assert_eq!(err.severity(), Severity::RunnerInternal);
    assert_eq!(err.kind(), ErrorKind::ScopeTooSmall);
    assert_eq!(err.message(), "[Scope::Other] instance scope is too small");
}

#[test]
fn static_variables_persist_across_calls() {
    let source = "
.code gml_Script_tick args=1
    pushbltn.v builtin.argument0
    pushi.e 0
    cmp.v.e eq
    bf bump
    pushi.e 0
    pop.v.e static.count
    exit.i
  bump:
    push.v static.count
    pushi.e 1
    add.v.e
    pop.v.v static.count
    push.v static.count
    ret.v
.script gml_Script_tick

.code gml_Script_main
    pushi.e 0
    call.i gml_Script_tick(argc=1)
    popz.v
    pushi.e 1
    call.i gml_Script_tick(argc=1)
    popz.v
    pushi.e 1
    call.i gml_Script_tick(argc=1)
    ret.v";
    let (_, mut world) = load(source, VmConfig::default());
    let result = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap();
    assert_eq!(result, Value::Int32(2));
    let statics = world.statics("gml_Script_tick").unwrap();
    assert_eq!(statics["count"], Value::Int32(2));
    assert!(world.statics("gml_Script_main").is_none());
}

#[test]
fn copy_on_write_separates_scopes_sharing_an_array() {
    let source = "
.object obj_player
.code gml_Script_main
    pushi.e 9
    pushi.e -1
    pushi.e 0
    pop.v.i [array]self.arr
    pushi.e -5
    pushi.e 0
    push.v [array]global.arr
    ret.v";
    for (copy_on_write, expected) in [(false, Value::Int16(9)), (true, Value::Int32(0))] {
        let config = VmConfig {
            array_copy_on_write: copy_on_write,
            ..VmConfig::default()
        };
        let (_, mut world) = load(source, config);
        let shared = Value::list(vec![Value::Int32(0)]);
        let id = world.create_instance(0);
        world.instance_mut(id).unwrap().variables.insert("arr".into(), shared.clone());
        world.set_global("arr", shared);
        let result = Vm::new(&mut world, &mut NoPrint)
            .run_with_receiver("gml_Script_main", ScopeEntry::Instance(id), None)
            .unwrap();
        assert_eq!(result, expected, "copy_on_write = {copy_on_write}");
        let Value::Array(own) = &world.instance(id).unwrap().variables["arr"] else {
            panic!("expected an array");
        };
        assert_eq!(own.borrow().items, vec![Value::Int16(9)]);
    }
}

#[test]
fn copy_on_write_copies_once_per_owner() {
    let source = "
.code gml_Script_main
    pushi.e 1
    setowner
    pushi.e 5
    pushi.e -5
    pushi.e 0
    pop.v.i [array]global.a
    pushglb.v global.a
    pop.v.v global.alias
    pushi.e 6
    pushi.e -5
    pushi.e 1
    pop.v.i [array]global.a
    pushi.e 2
    setowner
    pushi.e 7
    pushi.e -5
    pushi.e 2
    pop.v.i [array]global.a
    exit.i";
    let config = VmConfig {
        array_copy_on_write: true,
        ..VmConfig::default()
    };
    let (_, mut world) = load(source, config);
    let original = Value::list(vec![Value::Int32(0)]);
    world.set_global("a", original.clone());
    Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap();

    let items = |value: &Value| match value {
        Value::Array(array) => array.borrow().items.clone(),
        other => panic!("expected an array, got {other}"),
    };
    assert_eq!(items(&original), vec![Value::Int32(0)]);
    // the second store shares owner 1 and writes in place
    assert_eq!(items(&world.global("alias").unwrap().clone()), vec![Value::Int16(5), Value::Int16(6)]);
    assert_eq!(
        items(&world.global("a").unwrap().clone()),
        vec![Value::Int16(5), Value::Int16(6), Value::Int16(7)]
    );
    assert_eq!(world.array_owner_id(), 2);
}

#[test]
fn array_store_through_unreadable_scope_keeps_the_read_error() {
    let err = run(
        "
.code gml_Script_main
    pushi.e 1
    pushi.e -4
    pushi.e 0
    pop.v.i [array]noone.arr
    exit.i",
    )
    .unwrap_err();
    assert_eq!(err.severity(), Severity::Runtime);
    assert_eq!(err.kind(), ErrorKind::InvalidScope);
    assert_eq!(err.message(), "cannot read arr from scope noone");
}

#[test]
fn script_bodies_see_async_load() {
    let result = run(
        "
.code gml_Script_read_async
    pushbltn.v builtin.async_load
    ret.v
.script gml_Script_read_async

.code gml_Script_main
    call.i gml_Script_read_async(argc=0)
    ret.v",
    )
    .unwrap();
    assert_eq!(result, Value::Undefined);
}

#[test]
fn self_referencing_struct_prints() {
    let source = "
.code gml_Script_Node
    call.i @@This@@(argc=0)
    pop.v.v self.me
    exit.i
.script gml_Script_Node

.code gml_Script_main
    push.i gml_Script_Node
    call.i @@NewGMLObject@@(argc=1)
    call.i show_debug_message(argc=1)
    popz.v
    exit.i";
    let (_, mut world) = load(source, VmConfig::default());
    let mut out = CollectStringPrint::new();
    Vm::new(&mut world, &mut out).run("gml_Script_main", None).unwrap();
    assert_eq!(out.output(), "{ me : { ... } }\n");
}

#[test]
fn self_containing_array_prints() {
    let source = "
.code gml_Script_main
    call.i @@NewGMLArray@@(argc=0)
    pop.v.v global.a
    pushglb.v global.a
    pushi.e -5
    pushi.e 0
    pop.v.v [array]global.a
    pushglb.v global.a
    call.i string(argc=1)
    ret.v";
    assert_eq!(run(source).unwrap(), Value::string("[[...]]"));
}
