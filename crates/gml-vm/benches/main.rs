use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};
use gml_vm::{assemble, NoPrint, Value, Vm, World};

const COUNTING_LOOP: &str = "
.code gml_Script_main
    pushi.e 0
    pop.v.e local.i
  loop:
    pushloc.v local.i
    push.i 10000
    cmp.v.i lt
    bf done
    pushloc.v local.i
    push.i 1
    add.v.i
    pop.v.v local.i
    b loop
  done:
    pushloc.v local.i
    ret.v";

const RECURSIVE_FIB: &str = "
.code gml_Script_fib args=1
    pushbltn.v builtin.argument0
    pushi.e 2
    cmp.v.e lt
    bf recurse
    pushbltn.v builtin.argument0
    ret.v
  recurse:
    pushbltn.v builtin.argument0
    pushi.e 1
    sub.v.e
    call.i gml_Script_fib(argc=1)
    pushbltn.v builtin.argument0
    pushi.e 2
    sub.v.e
    call.i gml_Script_fib(argc=1)
    add.v.v
    ret.v
.script gml_Script_fib

.code gml_Script_main
    push.i 18
    call.i gml_Script_fib(argc=1)
    ret.v";

/// Assembles once, then benchmarks repeated runs of `gml_Script_main`.
fn run_listing(bench: &mut Bencher, source: &str, expected: i32) {
    let program = assemble(source).unwrap();
    let mut world = World::default();
    program.install(&mut world).unwrap();
    let mut print = NoPrint;
    let mut vm = Vm::new(&mut world, &mut print);
    assert_eq!(vm.run("gml_Script_main", None).unwrap(), Value::Int32(expected));

    bench.iter(|| {
        let value = vm.run("gml_Script_main", None).unwrap();
        black_box(value);
    });
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("counting_loop", |b| run_listing(b, COUNTING_LOOP, 10_000));
    c.bench_function("recursive_fib", |b| run_listing(b, RECURSIVE_FIB, 2584));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
