use gml_vm::{assemble, ArgValues, CollectStringPrint, ErrorKind, NoPrint, RunResult, Severity, Value, Vm, World};

fn world_for(source: &str) -> World {
    let mut world = World::default();
    assemble(source).unwrap().install(&mut world).unwrap();
    world
}

#[test]
fn registered_native_is_callable() {
    let mut world = world_for(
        "
.code gml_Script_main
    push.d 2.5
    call.i double_it(argc=1)
    ret.v",
    );
    world.register_native("double_it", |_vm, frame, args: ArgValues, _receiver| {
        let value = args.get_one_arg(frame, "double_it")?;
        Ok(Value::Double(value.as_f64().unwrap_or_default() * 2.0))
    });
    let result = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap();
    assert_eq!(result, Value::Double(5.0));
}

#[test]
fn native_panic_becomes_host_failure() {
    let mut world = world_for(
        "
.code gml_Script_main
    call.i explode(argc=0)
    ret.v",
    );
    world.register_native("explode", |_, _, _, _| -> RunResult<Value> { panic!("boom") });
    let err = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap_err();
    assert_eq!(err.severity(), Severity::RunnerInternal);
    assert_eq!(err.kind(), ErrorKind::HostFailure);
    assert_eq!(err.host_error().map(|failure| failure.message()), Some("boom"));
}

#[test]
fn native_argument_count_is_checked() {
    let mut world = world_for(
        "
.code gml_Script_main
    push.i 1
    push.i 2
    call.i lerp(argc=2)
    ret.v",
    );
    let err = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.message(), "[lerp] unexpected argument count");
}

#[test]
fn unknown_function_is_a_runtime_error() {
    let mut world = world_for(
        "
.code gml_Script_main
    call.i nothing_here(argc=0)
    ret.v",
    );
    let err = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap_err();
    assert_eq!(err.severity(), Severity::Runtime);
    assert_eq!(err.kind(), ErrorKind::UndefinedFunction);
    assert_eq!(err.message(), "invalid function with name nothing_here");
}

#[test]
fn callv_with_unknown_receiver_id() {
    let mut world = world_for(
        "
.code gml_Script_main
    pushi.e 5
    push.v self.f
    callv.v 0
    ret.v",
    );
    let err = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap_err();
    assert_eq!(err.severity(), Severity::RunnerInternal);
    assert_eq!(err.kind(), ErrorKind::UnknownScope);
    assert_eq!(err.message(), "unknown scope 5");
}

#[test]
fn popz_on_empty_stack_is_unbalanced() {
    let mut world = world_for(
        "
.code gml_Script_main
    popz.v
    exit.i",
    );
    let err = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap_err();
    assert_eq!(err.severity(), Severity::Runner);
    assert_eq!(err.kind(), ErrorKind::UnbalancedStack);
}

#[test]
fn global_variable_builtins() {
    let mut world = world_for(
        r#"
.code gml_Script_main
    push.i 12
    push.s "score"
    call.i variable_global_set(argc=2)
    popz.v
    push.s "score"
    call.i variable_global_get(argc=1)
    ret.v"#,
    );
    let result = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap();
    assert_eq!(result, Value::Int32(12));
    assert_eq!(world.global("score"), Some(&Value::Int32(12)));
}

#[test]
fn missing_global_is_reported() {
    let mut world = world_for(
        r#"
.code gml_Script_main
    push.s "lives"
    call.i variable_global_get(argc=1)
    ret.v"#,
    );
    let err = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
    assert_eq!(err.message(), "global variable lives doesn't exist");
}

#[test]
fn array_length_of_new_array() {
    let mut world = world_for(
        "
.code gml_Script_main
    push.i 3
    push.i 2
    push.i 1
    call.i @@NewGMLArray@@(argc=3)
    call.i array_length(argc=1)
    ret.v",
    );
    let result = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap();
    assert_eq!(result, Value::Int32(3));
}

#[test]
fn string_builtins_chain() {
    let mut world = world_for(
        r#"
.code gml_Script_main
    push.i 3
    push.i 2
    push.s "undertale"
    call.i string_copy(argc=3)
    call.i show_debug_message(argc=1)
    popz.v
    push.s "undertale"
    push.s "tale"
    call.i string_pos(argc=2)
    ret.v"#,
    );
    let mut out = CollectStringPrint::new();
    let result = Vm::new(&mut world, &mut out).run("gml_Script_main", None).unwrap();
    assert_eq!(out.output(), "nde\n");
    assert_eq!(result, Value::Int32(6));
}

#[test]
fn instance_builtins_through_bytecode() {
    let mut world = world_for(
        "
.object obj_player
.object obj_enemy
.code gml_Script_main
    pushi.e 1
    pushi.e 0
    push.i 20
    push.i 10
    call.i instance_create_depth(argc=4)
    popz.v
    pushi.e 1
    call.i instance_number(argc=1)
    ret.v",
    );
    let result = Vm::new(&mut world, &mut NoPrint).run("gml_Script_main", None).unwrap();
    assert_eq!(result, Value::Int32(1));
    let id = world.first_instance_of(1).unwrap();
    let instance = world.instance(id).unwrap();
    assert_eq!(instance.variables["x"], Value::Double(10.0));
    assert_eq!(instance.variables["y"], Value::Double(20.0));
}
